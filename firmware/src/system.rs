//! Main-loop context: owns the credential cache, the selection and every
//! collaborator the user commands drive.
//!
//! Button commands arrive over [`command_sender`]; session notices arrive from
//! the BLE task over [`crate::hid::session::notice_sender`]. Both are merged
//! by [`next_input`] and applied one at a time by [`Device::handle`], so the
//! cache and selection have a single writer.

use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::{Channel, Receiver as ChannelReceiver, Sender as ChannelSender};
use embassy_sync::watch::{Receiver as WatchReceiver, Sender as WatchSender, Watch};
use embedded_storage_async::nor_flash::NorFlash;
use log::{info, warn};

use crate::config::DeviceConfig;
use crate::hid::session::{ConnectionState, NoticeReceiver, SessionNotice};
use crate::hid::{EmitError, EmitSummary, InputChannel, type_text};
use crate::storage::{CredentialCache, CredentialStore};
use crate::sync::{HttpTransport, NetworkLink, SyncError, refresh};
use crate::time::Clock;
use crate::ui::{Navigation, StatusDisplay, StatusFrame, UiCommand};

type SystemMutex = CriticalSectionRawMutex;

const COMMAND_CHANNEL_DEPTH: usize = 8;
const FRAME_SUBSCRIBERS: usize = 2;

static COMMANDS: Channel<SystemMutex, UiCommand, COMMAND_CHANNEL_DEPTH> = Channel::new();
static STATUS_FRAMES: Watch<SystemMutex, StatusFrame, FRAME_SUBSCRIBERS> = Watch::new();

pub type CommandSender = ChannelSender<'static, SystemMutex, UiCommand, COMMAND_CHANNEL_DEPTH>;
pub type CommandReceiver = ChannelReceiver<'static, SystemMutex, UiCommand, COMMAND_CHANNEL_DEPTH>;
pub type FrameReceiver = WatchReceiver<'static, SystemMutex, StatusFrame, FRAME_SUBSCRIBERS>;
type FrameSender = WatchSender<'static, SystemMutex, StatusFrame, FRAME_SUBSCRIBERS>;

pub fn command_sender() -> CommandSender {
    COMMANDS.sender()
}

pub fn command_receiver() -> CommandReceiver {
    COMMANDS.receiver()
}

pub fn frame_receiver() -> Option<FrameReceiver> {
    STATUS_FRAMES.receiver()
}

fn frame_sender() -> FrameSender {
    STATUS_FRAMES.sender()
}

/// Display backed by the status frame watch; the display task renders it.
#[derive(Debug, Default, Clone, Copy)]
pub struct WatchDisplay;

impl StatusDisplay for WatchDisplay {
    fn show(&mut self, frame: &StatusFrame) {
        frame_sender().send(frame.clone());
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceInput {
    Command(UiCommand),
    Session(SessionNotice),
}

/// Wait for the next button command or session notice.
pub async fn next_input(commands: &CommandReceiver, notices: &NoticeReceiver) -> DeviceInput {
    match select(commands.receive(), notices.receive()).await {
        Either::First(command) => DeviceInput::Command(command),
        Either::Second(notice) => DeviceInput::Session(notice),
    }
}

/// Result of a `TypePassword` command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOutcome {
    Typed(EmitSummary),
    /// No host has the input characteristic open.
    NotConnected,
    NothingSelected,
    Failed(EmitError),
}

pub struct Device<S, L, H, C, K, D> {
    cache: CredentialCache<S>,
    navigation: Navigation,
    link: L,
    http: H,
    channel: C,
    clock: K,
    display: D,
    config: DeviceConfig,
    connection: ConnectionState,
    frame: StatusFrame,
}

impl<S, L, H, C, K, D> Device<S, L, H, C, K, D>
where
    S: NorFlash,
    L: NetworkLink,
    H: HttpTransport,
    C: InputChannel,
    K: Clock,
    D: StatusDisplay,
{
    /// Restore the cache from `store`, select the first credential and show
    /// the selection.
    #[allow(clippy::too_many_arguments)]
    pub async fn boot(
        store: CredentialStore<S>,
        link: L,
        http: H,
        channel: C,
        clock: K,
        display: D,
        config: DeviceConfig,
    ) -> Self {
        let cache = CredentialCache::boot(store).await;
        let navigation = Navigation::new(cache.len());
        let frame = StatusFrame::for_selection(&navigation, cache.credentials());
        let mut device = Self {
            cache,
            navigation,
            link,
            http,
            channel,
            clock,
            display,
            config,
            connection: ConnectionState::Disconnected,
            frame,
        };
        device.show_selection();
        device
    }

    pub fn frame(&self) -> &StatusFrame {
        &self.frame
    }

    pub fn navigation(&self) -> &Navigation {
        &self.navigation
    }

    pub fn cache(&self) -> &CredentialCache<S> {
        &self.cache
    }

    pub fn connection(&self) -> ConnectionState {
        self.connection
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub fn link(&self) -> &L {
        &self.link
    }

    pub fn display(&self) -> &D {
        &self.display
    }

    pub async fn handle(&mut self, input: DeviceInput) {
        match input {
            DeviceInput::Command(command) => self.handle_command(command).await,
            DeviceInput::Session(notice) => self.handle_notice(notice),
        }
    }

    pub async fn handle_command(&mut self, command: UiCommand) {
        match command {
            UiCommand::NextEntry => self.next_entry(),
            UiCommand::TypePassword => {
                self.type_password().await;
            }
            UiCommand::RefreshCache => {
                let _ = self.refresh_cache().await;
            }
        }
    }

    pub fn next_entry(&mut self) {
        self.navigation.advance(self.cache.len());
        self.show_selection();
    }

    pub async fn type_password(&mut self) -> TypeOutcome {
        if !self.channel.is_ready() {
            info!("type ignored: no host connected");
            return TypeOutcome::NotConnected;
        }
        let Some(credential) = self.navigation.current(self.cache.credentials()) else {
            info!("type ignored: nothing selected");
            return TypeOutcome::NothingSelected;
        };

        match type_text(
            &mut self.channel,
            &self.clock,
            credential.password.expose(),
            self.config.keystroke_delay,
        )
        .await
        {
            Ok(summary) => {
                info!("typed password for {}", credential.title);
                TypeOutcome::Typed(summary)
            }
            Err(error) => {
                warn!("typing stopped: {error}");
                TypeOutcome::Failed(error)
            }
        }
    }

    /// Full refresh cycle as the user sees it: progress notice, sync, result
    /// notice held for a moment, then the (reset) selection.
    pub async fn refresh_cache(&mut self) -> Result<usize, SyncError<S::Error>> {
        self.show(StatusFrame::Updating);

        let settings = self.config.sync_settings();
        let outcome = refresh(
            &mut self.cache,
            &mut self.link,
            &mut self.http,
            &self.clock,
            &settings,
        )
        .await;

        match &outcome {
            Ok(count) => {
                self.navigation.reset_after_sync(*count);
                self.show(StatusFrame::UpdateSucceeded(*count));
            }
            Err(_) => self.show(StatusFrame::UpdateFailed),
        }

        self.clock.sleep(self.config.notice_hold).await;
        self.show_selection();
        outcome
    }

    pub fn handle_notice(&mut self, notice: SessionNotice) {
        match notice {
            SessionNotice::ShowPassKey(key) => self.show(StatusFrame::PassKey(key)),
            SessionNotice::Authenticated => self.show_selection(),
            SessionNotice::PairingFailed(error) => {
                warn!("pairing failed: {error}");
                self.show_selection();
            }
            SessionNotice::Connected => self.connection = ConnectionState::Connected,
            SessionNotice::Disconnected => self.connection = ConnectionState::Disconnected,
        }
    }

    fn show_selection(&mut self) {
        let frame = StatusFrame::for_selection(&self.navigation, self.cache.credentials());
        self.show(frame);
    }

    fn show(&mut self, frame: StatusFrame) {
        self.display.show(&frame);
        self.frame = frame;
    }
}

#[cfg(test)]
#[path = "system_tests.rs"]
mod tests;
