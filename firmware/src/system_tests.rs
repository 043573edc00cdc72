use super::*;
use crate::hid::PairingError;
use crate::storage::CredentialStore;
use crate::testing::{
    ManualClock, RecordingChannel, RecordingDisplay, ScriptedHttp, ScriptedLink,
};
use crate::ui::Selection;
use embassy_time::Duration;
use futures::executor::block_on;
use sequential_storage::mock_flash::{MockFlashBase, WriteCountCheck};
use shared::{Credential, CredentialList};

type Flash = MockFlashBase<16, 4, 1024>;
type TestDevice =
    Device<Flash, ScriptedLink, ScriptedHttp, RecordingChannel, ManualClock, RecordingDisplay>;

const MAIL_RESPONSE: &str =
    r#"{"result":[{"name":"Mail","userid":"bob","password":"Ab12!"}]}"#;

fn config() -> DeviceConfig {
    DeviceConfig {
        wifi_ssid: "office",
        wifi_password: "hunter2",
        endpoint: "https://example.invalid/pwd-allpasswd",
        api_key: "key-123",
        ..DeviceConfig::from_build_env()
    }
}

fn three_credentials() -> CredentialList {
    vec![
        Credential::new("Mail", "bob", "Ab12!"),
        Credential::new("Bank", "alice", "s3cret"),
        Credential::new("VPN", "carol", "tunnel"),
    ]
    .into()
}

fn device_with(list: Option<CredentialList>, http: ScriptedHttp) -> TestDevice {
    let mut store = CredentialStore::new(
        Flash::new(WriteCountCheck::Twice, None, false),
        Flash::FULL_FLASH_RANGE,
    );
    if let Some(list) = list {
        block_on(store.save(&list)).expect("seed");
    }

    block_on(Device::boot(
        store,
        ScriptedLink::connecting_after(1),
        http,
        RecordingChannel::connected(),
        ManualClock::new(),
        RecordingDisplay::new(),
        config(),
    ))
}

#[test]
fn boot_selects_first_credential() {
    let device = device_with(Some(three_credentials()), ScriptedHttp::new());

    assert_eq!(device.navigation().selection(), Selection::Index(0));
    assert_eq!(device.frame().to_string(), "(0) Mail\nbob");
    assert_eq!(device.display().frames().len(), 1);
}

#[test]
fn boot_without_cache_shows_not_found() {
    let device = device_with(None, ScriptedHttp::new());

    assert_eq!(device.navigation().selection(), Selection::None);
    assert_eq!(device.frame(), &StatusFrame::NotFound);
}

#[test]
fn next_entry_wraps_after_the_last_credential() {
    let mut device = device_with(Some(three_credentials()), ScriptedHttp::new());

    for _ in 0..3 {
        block_on(device.handle(DeviceInput::Command(UiCommand::NextEntry)));
    }

    assert_eq!(device.navigation().selection(), Selection::Index(0));
    let titles: std::vec::Vec<_> = device
        .display()
        .frames()
        .iter()
        .map(|frame| frame.to_string())
        .collect();
    assert_eq!(
        titles,
        ["(0) Mail\nbob", "(1) Bank\nalice", "(2) VPN\ncarol", "(0) Mail\nbob"]
    );
}

#[test]
fn type_password_emits_two_reports_per_character() {
    let mut device = device_with(Some(three_credentials()), ScriptedHttp::new());

    let outcome = block_on(device.type_password());

    assert_eq!(outcome, TypeOutcome::Typed(EmitSummary { reports: 10 }));
    assert_eq!(device.channel().reports().len(), 10);
}

#[test]
fn type_password_is_ignored_without_a_host() {
    let mut device = device_with(Some(three_credentials()), ScriptedHttp::new());
    device.channel_mut().set_ready(false);

    let outcome = block_on(device.type_password());

    assert_eq!(outcome, TypeOutcome::NotConnected);
    assert!(device.channel().reports().is_empty());
}

#[test]
fn type_password_is_ignored_without_selection() {
    let mut device = device_with(None, ScriptedHttp::new());

    assert_eq!(block_on(device.type_password()), TypeOutcome::NothingSelected);
    assert!(device.channel().reports().is_empty());
}

#[test]
fn refresh_shows_progress_result_and_new_selection() {
    let mut device = device_with(
        Some(three_credentials()),
        ScriptedHttp::responding(200, MAIL_RESPONSE),
    );
    block_on(device.handle(DeviceInput::Command(UiCommand::NextEntry)));

    let count = block_on(device.refresh_cache()).expect("refresh");

    assert_eq!(count, 1);
    assert_eq!(device.cache().len(), 1);
    assert_eq!(device.navigation().selection(), Selection::Index(0));
    let frames = device.display().frames();
    let tail = &frames[frames.len() - 3..];
    assert_eq!(
        tail,
        &[
            StatusFrame::Updating,
            StatusFrame::UpdateSucceeded(1),
            StatusFrame::Entry {
                index: 0,
                title: "Mail".into(),
                userid: "bob".into(),
            },
        ]
    );

    let outcome = block_on(device.type_password());
    assert_eq!(outcome, TypeOutcome::Typed(EmitSummary { reports: 10 }));
}

#[test]
fn refresh_to_empty_list_clears_selection() {
    let mut device = device_with(
        Some(three_credentials()),
        ScriptedHttp::responding(200, r#"{"result":[]}"#),
    );

    block_on(device.handle(DeviceInput::Command(UiCommand::RefreshCache)));

    assert_eq!(device.navigation().selection(), Selection::None);
    assert_eq!(device.frame(), &StatusFrame::NotFound);
    assert!(device.navigation().current(device.cache().credentials()).is_none());
}

#[test]
fn failed_refresh_keeps_list_and_selection() {
    let mut device = device_with(
        Some(three_credentials()),
        ScriptedHttp::responding(500, "oops"),
    );
    block_on(device.handle(DeviceInput::Command(UiCommand::NextEntry)));

    let result = block_on(device.refresh_cache());

    assert!(matches!(result, Err(SyncError::RemoteError(500))));
    assert_eq!(device.cache().len(), 3);
    assert_eq!(device.navigation().selection(), Selection::Index(1));
    assert!(device.display().frames().contains(&StatusFrame::UpdateFailed));
    assert_eq!(device.frame().to_string(), "(1) Bank\nalice");
    assert_eq!(device.link().disconnects(), 1);
}

#[test]
fn result_notice_is_held_before_returning_to_selection() {
    let mut device = device_with(
        Some(three_credentials()),
        ScriptedHttp::responding(200, MAIL_RESPONSE),
    );

    block_on(device.refresh_cache()).expect("refresh");

    assert_eq!(device.clock.sleeps().last(), Some(&Duration::from_secs(1)));
}

#[test]
fn session_notices_drive_the_display() {
    let mut device = device_with(Some(three_credentials()), ScriptedHttp::new());

    block_on(device.handle(DeviceInput::Session(SessionNotice::ShowPassKey(123_456))));
    assert_eq!(device.frame().to_string(), "PIN\n123456");

    block_on(device.handle(DeviceInput::Session(SessionNotice::Authenticated)));
    assert_eq!(device.frame().to_string(), "(0) Mail\nbob");

    block_on(device.handle(DeviceInput::Session(SessionNotice::Connected)));
    assert_eq!(device.connection(), ConnectionState::Connected);
    block_on(device.handle(DeviceInput::Session(SessionNotice::Disconnected)));
    assert_eq!(device.connection(), ConnectionState::Disconnected);
}

#[test]
fn pairing_failure_clears_the_pass_key() {
    let mut device = device_with(Some(three_credentials()), ScriptedHttp::new());

    device.handle_notice(SessionNotice::ShowPassKey(123_456));
    device.handle_notice(SessionNotice::PairingFailed(PairingError::AuthFailed));

    assert_eq!(device.frame().to_string(), "(0) Mail\nbob");
}

#[test]
fn inputs_are_merged_from_both_queues() {
    static COMMANDS: Channel<SystemMutex, UiCommand, COMMAND_CHANNEL_DEPTH> = Channel::new();
    static NOTICES: Channel<
        CriticalSectionRawMutex,
        SessionNotice,
        { crate::hid::session::NOTICE_QUEUE_DEPTH },
    > = Channel::new();

    COMMANDS
        .sender()
        .try_send(UiCommand::NextEntry)
        .expect("queue command");
    let input = block_on(next_input(&COMMANDS.receiver(), &NOTICES.receiver()));
    assert_eq!(input, DeviceInput::Command(UiCommand::NextEntry));

    NOTICES
        .sender()
        .try_send(SessionNotice::Connected)
        .expect("queue notice");
    let input = block_on(next_input(&COMMANDS.receiver(), &NOTICES.receiver()));
    assert_eq!(input, DeviceInput::Session(SessionNotice::Connected));
}
