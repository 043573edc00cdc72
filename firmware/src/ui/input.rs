use alloc::vec::Vec;

use embassy_time::Duration;

/// Hold time after which releasing the front button means refresh.
pub const LONG_PRESS: Duration = Duration::from_millis(1_500);

/// Physical controls on the device.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Button {
    /// Front button: cycles through credentials.
    Next,
    /// Side button: types the selected password.
    Type,
    /// Front button held for a long press: refreshes the cache from the server.
    Refresh,
}

/// Raw edge reported by the button poller.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub pressed: bool,
}

impl ButtonEvent {
    /// Release of the front button after it was held for `held`.
    pub fn front_released(held: Duration) -> Self {
        let button = if held >= LONG_PRESS {
            Button::Refresh
        } else {
            Button::Next
        };
        Self::released(button)
    }

    pub fn pressed(button: Button) -> Self {
        Self {
            button,
            pressed: true,
        }
    }

    pub fn released(button: Button) -> Self {
        Self {
            button,
            pressed: false,
        }
    }
}

/// User intention handed to the main loop.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UiCommand {
    NextEntry,
    TypePassword,
    RefreshCache,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct Binding {
    button: Button,
    command: UiCommand,
}

/// Button to command bindings. Commands fire on release.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ButtonMap {
    bindings: Vec<Binding>,
}

impl Default for ButtonMap {
    fn default() -> Self {
        let mut map = Self {
            bindings: Vec::new(),
        };
        map.add_binding(Button::Next, UiCommand::NextEntry);
        map.add_binding(Button::Type, UiCommand::TypePassword);
        map.add_binding(Button::Refresh, UiCommand::RefreshCache);
        map
    }
}

impl ButtonMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or override a binding.
    pub fn add_binding(&mut self, button: Button, command: UiCommand) {
        if let Some(existing) = self
            .bindings
            .iter_mut()
            .find(|binding| binding.button == button)
        {
            existing.command = command;
        } else {
            self.bindings.push(Binding { button, command });
        }
    }

    pub fn resolve(&self, event: &ButtonEvent) -> Option<UiCommand> {
        if event.pressed {
            return None;
        }

        self.bindings
            .iter()
            .find(|binding| binding.button == event.button)
            .map(|binding| binding.command)
    }
}
