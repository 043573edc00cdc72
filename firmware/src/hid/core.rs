//! Keyboard report type and the input channel the emulator writes through.

use core::fmt;
use core::sync::atomic::{AtomicBool, Ordering};

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};

pub const KEYBOARD_ROLLOVER: usize = 6;
pub const HID_REPORT_SIZE: usize = KEYBOARD_ROLLOVER + 2;

/// Boot-keyboard input report: modifier byte, reserved byte, six key codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyboardReport {
    pub modifiers: u8,
    pub keys: [u8; KEYBOARD_ROLLOVER],
}

impl KeyboardReport {
    pub const fn empty() -> Self {
        Self {
            modifiers: 0,
            keys: [0; KEYBOARD_ROLLOVER],
        }
    }

    /// Report with a single key held down.
    pub const fn key_down(modifiers: u8, usage: u8) -> Self {
        let mut keys = [0; KEYBOARD_ROLLOVER];
        keys[0] = usage;
        Self { modifiers, keys }
    }

    pub fn is_release(&self) -> bool {
        *self == Self::empty()
    }

    pub fn to_bytes(&self) -> [u8; HID_REPORT_SIZE] {
        let mut data = [0u8; HID_REPORT_SIZE];
        data[0] = self.modifiers;
        data[2..].copy_from_slice(&self.keys);
        data
    }
}

/// "Ready to notify" flag of the input characteristic.
///
/// Only the session task may flip it: [`NotifyGate::writer`] hands out a
/// single [`GateWriter`], while any number of [`GateReader`]s observe it.
pub struct NotifyGate {
    open: AtomicBool,
    writer_claimed: AtomicBool,
}

impl NotifyGate {
    pub const fn new() -> Self {
        Self {
            open: AtomicBool::new(false),
            writer_claimed: AtomicBool::new(false),
        }
    }

    /// Claim the writer half; `None` once it has been claimed.
    pub fn writer(&'static self) -> Option<GateWriter> {
        self.writer_claimed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| GateWriter { gate: self })
    }

    pub fn reader(&'static self) -> GateReader {
        GateReader { gate: self }
    }
}

impl Default for NotifyGate {
    fn default() -> Self {
        Self::new()
    }
}

pub struct GateWriter {
    gate: &'static NotifyGate,
}

impl GateWriter {
    pub fn set_open(&mut self, open: bool) {
        self.gate.open.store(open, Ordering::Release);
    }

    pub fn is_open(&self) -> bool {
        self.gate.open.load(Ordering::Acquire)
    }
}

impl fmt::Debug for GateWriter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateWriter")
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Clone, Copy)]
pub struct GateReader {
    gate: &'static NotifyGate,
}

impl GateReader {
    pub fn is_open(&self) -> bool {
        self.gate.open.load(Ordering::Acquire)
    }
}

impl fmt::Debug for GateReader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GateReader")
            .field("open", &self.is_open())
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelError {
    /// Notifications are disabled because no host is connected.
    NotReady,
    /// The transport refused the report.
    Rejected,
}

impl fmt::Display for ChannelError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChannelError::NotReady => write!(f, "input channel not ready"),
            ChannelError::Rejected => write!(f, "input report rejected"),
        }
    }
}

/// Characteristic over which keyboard reports reach the host.
#[allow(async_fn_in_trait)]
pub trait InputChannel {
    fn is_ready(&self) -> bool;

    /// Set the characteristic value to `report` and notify the host.
    async fn notify(&mut self, report: KeyboardReport) -> Result<(), ChannelError>;
}

type QueueMutex = CriticalSectionRawMutex;

const REPORT_QUEUE_DEPTH: usize = 8;

static REPORT_CHANNEL: Channel<QueueMutex, KeyboardReport, REPORT_QUEUE_DEPTH> = Channel::new();

pub type ReportSender = Sender<'static, QueueMutex, KeyboardReport, REPORT_QUEUE_DEPTH>;
pub type ReportReceiver = Receiver<'static, QueueMutex, KeyboardReport, REPORT_QUEUE_DEPTH>;

pub fn report_sender() -> ReportSender {
    REPORT_CHANNEL.sender()
}

pub fn report_receiver() -> ReportReceiver {
    REPORT_CHANNEL.receiver()
}

/// Drop reports queued for a host that has gone away.
pub fn discard_pending_reports() -> usize {
    let receiver = report_receiver();
    let mut dropped = 0;
    while receiver.try_receive().is_ok() {
        dropped += 1;
    }
    dropped
}

/// Input channel used by the main loop: reports are queued for the BLE task,
/// which owns the connection and performs the actual GATT notify.
#[derive(Clone)]
pub struct QueuedInputChannel {
    gate: GateReader,
    sender: ReportSender,
}

impl QueuedInputChannel {
    pub fn new(gate: GateReader) -> Self {
        Self {
            gate,
            sender: report_sender(),
        }
    }
}

impl InputChannel for QueuedInputChannel {
    fn is_ready(&self) -> bool {
        self.gate.is_open()
    }

    async fn notify(&mut self, report: KeyboardReport) -> Result<(), ChannelError> {
        if !self.gate.is_open() {
            return Err(ChannelError::NotReady);
        }
        self.sender.send(report).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static TEST_GATE: NotifyGate = NotifyGate::new();

    #[test]
    fn report_layout_matches_boot_keyboard() {
        let report = KeyboardReport::key_down(0x02, 0x04);
        assert_eq!(report.to_bytes(), [0x02, 0, 0x04, 0, 0, 0, 0, 0]);
        assert!(KeyboardReport::empty().is_release());
        assert!(!report.is_release());
    }

    #[test]
    fn gate_has_a_single_writer() {
        let mut writer = TEST_GATE.writer().expect("first writer");
        assert!(TEST_GATE.writer().is_none());

        let reader = TEST_GATE.reader();
        assert!(!reader.is_open());
        writer.set_open(true);
        assert!(reader.is_open());
        writer.set_open(false);
        assert!(!reader.is_open());
    }

    #[test]
    fn queued_channel_refuses_when_gate_closed_and_queues_when_open() {
        static GATE: NotifyGate = NotifyGate::new();
        let mut writer = GATE.writer().expect("writer");
        let mut channel = QueuedInputChannel::new(GATE.reader());
        discard_pending_reports();

        let refused =
            futures::executor::block_on(channel.notify(KeyboardReport::key_down(0, 0x04)));
        assert_eq!(refused, Err(ChannelError::NotReady));

        writer.set_open(true);
        futures::executor::block_on(channel.notify(KeyboardReport::key_down(0, 0x05)))
            .expect("queued");
        assert_eq!(
            report_receiver().try_receive().ok(),
            Some(KeyboardReport::key_down(0, 0x05))
        );
    }
}
