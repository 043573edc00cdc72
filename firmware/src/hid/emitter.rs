//! Turns a password into a paced sequence of keyboard reports.

use core::fmt;

use embassy_time::Duration;
use log::{debug, warn};

use super::core::{InputChannel, KeyboardReport};
use super::keymap;
use crate::time::Clock;

/// Pause after every key-down/key-up pair so hosts do not drop repeats.
pub const DEFAULT_KEYSTROKE_DELAY: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EmitSummary {
    /// Reports delivered, key-up reports included.
    pub reports: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitError {
    /// The text holds a character the keymap cannot type; nothing was sent.
    Unmapped { ch: char, position: usize },
    /// The host went away; `sent` reports made it out before that.
    Disconnected { sent: usize },
}

impl fmt::Display for EmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EmitError::Unmapped { position, .. } => {
                write!(f, "character at position {position} has no key mapping")
            }
            EmitError::Disconnected { sent } => {
                write!(f, "host disconnected after {sent} reports")
            }
        }
    }
}

impl core::error::Error for EmitError {}

/// Type `text` on the host: one key-down and one release report per
/// character, followed by `delay`.
///
/// The whole text is checked against the keymap before the first report so a
/// password is never typed halfway because of an unsupported character.
pub async fn type_text<C, K>(
    channel: &mut C,
    clock: &K,
    text: &str,
    delay: Duration,
) -> Result<EmitSummary, EmitError>
where
    C: InputChannel,
    K: Clock,
{
    if let Some((position, ch)) = keymap::first_unmapped(text) {
        warn!("refusing to type text with unmapped character at {position}");
        return Err(EmitError::Unmapped { ch, position });
    }

    let mut sent = 0;
    for (position, ch) in text.chars().enumerate() {
        let Some(stroke) = keymap::lookup(ch) else {
            return Err(EmitError::Unmapped { ch, position });
        };

        send(channel, KeyboardReport::key_down(stroke.modifiers, stroke.usage), &mut sent).await?;
        send(channel, KeyboardReport::empty(), &mut sent).await?;
        clock.sleep(delay).await;
    }

    debug!("typed {} characters", sent / 2);
    Ok(EmitSummary { reports: sent })
}

async fn send<C: InputChannel>(
    channel: &mut C,
    report: KeyboardReport,
    sent: &mut usize,
) -> Result<(), EmitError> {
    if !channel.is_ready() {
        warn!("input channel closed after {} reports", *sent);
        return Err(EmitError::Disconnected { sent: *sent });
    }

    match channel.notify(report).await {
        Ok(()) => {
            *sent += 1;
            Ok(())
        }
        Err(error) => {
            warn!("input report not delivered: {error}");
            Err(EmitError::Disconnected { sent: *sent })
        }
    }
}
