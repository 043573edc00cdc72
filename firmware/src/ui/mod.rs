//! Device-facing user interface: button bindings, the credential selection
//! and the status frames shown on the display.

pub mod input;
pub mod navigation;
pub mod render;

pub use input::{Button, ButtonEvent, ButtonMap, UiCommand};
pub use navigation::{Navigation, Selection};
pub use render::{StatusDisplay, StatusFrame};
