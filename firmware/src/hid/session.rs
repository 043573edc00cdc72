//! Pairing and connection lifecycle of the BLE keyboard session.
//!
//! The radio stack's security and connection callbacks are translated into
//! [`SessionEvent`]s by the BLE task. [`SessionMachine::handle`] is a pure
//! transition function; [`SessionDriver`] applies its effects by flipping the
//! notify gate and forwarding [`SessionNotice`]s to the main loop.

use core::fmt;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver, Sender};
use heapless::Vec;
use log::{debug, info, warn};

use super::core::GateWriter;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PairingState {
    #[default]
    Idle,
    AwaitingPinEntryConfirmation,
    /// Pass-key request received and not answered yet. With a fixed key the
    /// answer is immediate, so the machine never rests here.
    AwaitingPassKeyRequest,
    NotifyingPassKey,
    Authenticated,
    Failed,
}

impl PairingState {
    pub fn is_in_progress(self) -> bool {
        matches!(
            self,
            PairingState::AwaitingPinEntryConfirmation
                | PairingState::AwaitingPassKeyRequest
                | PairingState::NotifyingPassKey
        )
    }

    /// Pass-key steps start a pairing from `Idle` or continue one in progress.
    fn accepts_pass_key(self) -> bool {
        self == PairingState::Idle || self.is_in_progress()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connected,
}

/// Callback from the radio stack, already stripped of stack types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    SecurityRequested,
    ConfirmPin(u32),
    PassKeyRequested,
    PassKeyNotify(u32),
    AuthComplete { success: bool },
    Connected,
    Disconnected,
}

/// Answer handed back to the radio stack for the event just processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackReply {
    Accept,
    Reject,
    PassKey(u32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PairingError {
    /// Numeric comparison was requested and declined.
    Rejected,
    /// The stack reported a failed authentication.
    AuthFailed,
}

impl fmt::Display for PairingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PairingError::Rejected => write!(f, "pin confirmation rejected"),
            PairingError::AuthFailed => write!(f, "authentication failed"),
        }
    }
}

impl core::error::Error for PairingError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEffect {
    EnableNotify,
    DisableNotify,
    ShowPassKey(u32),
    RefreshDisplay,
    PairingFailed(PairingError),
}

pub const MAX_EFFECTS: usize = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOutcome {
    pub reply: StackReply,
    pub effects: Vec<SessionEffect, MAX_EFFECTS>,
}

impl SessionOutcome {
    fn reply(reply: StackReply) -> Self {
        Self {
            reply,
            effects: Vec::new(),
        }
    }

    fn with(mut self, effect: SessionEffect) -> Self {
        // Every transition emits at most one effect.
        let _ = self.effects.push(effect);
        self
    }
}

/// Pairing and connection state, advanced only by [`SessionMachine::handle`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionMachine {
    pairing: PairingState,
    connection: ConnectionState,
    pass_key: u32,
}

impl SessionMachine {
    /// `pass_key` is the fixed key answered to every pass-key request.
    pub const fn new(pass_key: u32) -> Self {
        Self {
            pairing: PairingState::Idle,
            connection: ConnectionState::Disconnected,
            pass_key,
        }
    }

    pub fn pairing(&self) -> PairingState {
        self.pairing
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn pass_key(&self) -> u32 {
        self.pass_key
    }

    pub fn handle(&mut self, event: SessionEvent) -> SessionOutcome {
        let previous = self.pairing;
        let outcome = match event {
            SessionEvent::SecurityRequested => {
                self.pairing = PairingState::AwaitingPinEntryConfirmation;
                SessionOutcome::reply(StackReply::Accept)
            }
            SessionEvent::ConfirmPin(_) => {
                if self.pairing.is_in_progress() || self.pairing == PairingState::Idle {
                    self.pairing = PairingState::Failed;
                    SessionOutcome::reply(StackReply::Reject)
                        .with(SessionEffect::PairingFailed(PairingError::Rejected))
                } else {
                    SessionOutcome::reply(StackReply::Reject)
                }
            }
            SessionEvent::PassKeyRequested if self.pairing.accepts_pass_key() => {
                // The key is fixed, so the request is answered in the same step.
                let key = self.pass_key;
                self.pairing = PairingState::NotifyingPassKey;
                SessionOutcome::reply(StackReply::PassKey(key)).with(SessionEffect::ShowPassKey(key))
            }
            SessionEvent::PassKeyNotify(key) if self.pairing.accepts_pass_key() => {
                self.pairing = PairingState::NotifyingPassKey;
                SessionOutcome::reply(StackReply::Accept).with(SessionEffect::ShowPassKey(key))
            }
            SessionEvent::AuthComplete { success: true } if self.pairing.is_in_progress() => {
                self.pairing = PairingState::Authenticated;
                SessionOutcome::reply(StackReply::Accept).with(SessionEffect::RefreshDisplay)
            }
            SessionEvent::AuthComplete { success: false } if self.pairing.is_in_progress() => {
                self.pairing = PairingState::Failed;
                SessionOutcome::reply(StackReply::Accept)
                    .with(SessionEffect::PairingFailed(PairingError::AuthFailed))
            }
            SessionEvent::PassKeyRequested
            | SessionEvent::PassKeyNotify(_)
            | SessionEvent::AuthComplete { .. } => {
                debug!("ignoring {:?} while {:?}", event, self.pairing);
                SessionOutcome::reply(StackReply::Reject)
            }
            SessionEvent::Connected => {
                let outcome = SessionOutcome::reply(StackReply::Accept);
                if self.connection == ConnectionState::Connected {
                    outcome
                } else {
                    self.connection = ConnectionState::Connected;
                    outcome.with(SessionEffect::EnableNotify)
                }
            }
            SessionEvent::Disconnected => {
                let outcome = SessionOutcome::reply(StackReply::Accept);
                if self.connection == ConnectionState::Disconnected {
                    outcome
                } else {
                    self.connection = ConnectionState::Disconnected;
                    outcome.with(SessionEffect::DisableNotify)
                }
            }
        };

        if previous != self.pairing {
            debug!("pairing {:?} -> {:?}", previous, self.pairing);
        }
        outcome
    }
}

/// What the main loop needs to learn about the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionNotice {
    ShowPassKey(u32),
    Authenticated,
    PairingFailed(PairingError),
    Connected,
    Disconnected,
}

type NoticeMutex = CriticalSectionRawMutex;

pub const NOTICE_QUEUE_DEPTH: usize = 8;

static NOTICE_CHANNEL: Channel<NoticeMutex, SessionNotice, NOTICE_QUEUE_DEPTH> = Channel::new();

pub type NoticeSender = Sender<'static, NoticeMutex, SessionNotice, NOTICE_QUEUE_DEPTH>;
pub type NoticeReceiver = Receiver<'static, NoticeMutex, SessionNotice, NOTICE_QUEUE_DEPTH>;

pub fn notice_sender() -> NoticeSender {
    NOTICE_CHANNEL.sender()
}

pub fn notice_receiver() -> NoticeReceiver {
    NOTICE_CHANNEL.receiver()
}

/// Owns the machine inside the BLE task and is the only writer of the
/// notify gate.
pub struct SessionDriver {
    machine: SessionMachine,
    gate: GateWriter,
    notices: NoticeSender,
}

impl SessionDriver {
    pub fn new(machine: SessionMachine, gate: GateWriter, notices: NoticeSender) -> Self {
        Self {
            machine,
            gate,
            notices,
        }
    }

    pub fn machine(&self) -> &SessionMachine {
        &self.machine
    }

    pub fn handle(&mut self, event: SessionEvent) -> StackReply {
        let outcome = self.machine.handle(event);
        for effect in outcome.effects.iter().copied() {
            self.apply(effect);
        }
        outcome.reply
    }

    fn apply(&mut self, effect: SessionEffect) {
        let notice = match effect {
            SessionEffect::EnableNotify => {
                self.gate.set_open(true);
                info!("host connected");
                SessionNotice::Connected
            }
            SessionEffect::DisableNotify => {
                self.gate.set_open(false);
                info!("host disconnected");
                SessionNotice::Disconnected
            }
            SessionEffect::ShowPassKey(key) => SessionNotice::ShowPassKey(key),
            SessionEffect::RefreshDisplay => {
                info!("pairing complete");
                SessionNotice::Authenticated
            }
            SessionEffect::PairingFailed(error) => {
                warn!("pairing failed: {error}");
                SessionNotice::PairingFailed(error)
            }
        };

        if self.notices.try_send(notice).is_err() {
            warn!("session notice queue full, dropping {:?}", notice);
        }
    }
}

impl fmt::Debug for SessionDriver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDriver")
            .field("machine", &self.machine)
            .field("gate", &self.gate)
            .finish()
    }
}
