//! BLE keyboard emulation: report types, keymap, typing engine, pairing
//! session and the GATT profile.

pub mod ble;
pub mod core;
pub mod emitter;
pub mod keymap;
pub mod session;

pub use self::core::{
    ChannelError, GateReader, GateWriter, InputChannel, KeyboardReport, NotifyGate,
    QueuedInputChannel,
};
pub use emitter::{DEFAULT_KEYSTROKE_DELAY, EmitError, EmitSummary, type_text};
pub use session::{
    ConnectionState, PairingError, PairingState, SessionDriver, SessionEvent, SessionMachine,
    SessionNotice, StackReply,
};

/// Gate shared by the BLE task (writer) and the main loop (reader).
pub static NOTIFY_GATE: NotifyGate = NotifyGate::new();
