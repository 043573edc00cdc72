use super::*;
use crate::testing::{ManualClock, ScriptedLink};
use embassy_time::Duration;
use futures::executor::block_on;

fn settings() -> SyncSettings<'static> {
    SyncSettings {
        wifi_ssid: "office",
        wifi_password: "hunter2",
        endpoint: "https://example.invalid/pwd-allpasswd",
        api_key: "key-123",
        connect_timeout: Duration::from_secs(10),
        poll_interval: Duration::from_secs(1),
    }
}

#[test]
fn connects_once_link_reports_up() {
    let mut link = ScriptedLink::connecting_after(3);
    let clock = ManualClock::new();

    block_on(connect_with_timeout(&mut link, &clock, &settings())).expect("connected");

    assert_eq!(link.begins(), 1);
    assert_eq!(link.polls(), 3);
    assert_eq!(clock.elapsed(), Duration::from_secs(2));
    assert_eq!(link.joined(), &[("office".to_string(), "hunter2".to_string())]);
}

#[test]
fn already_connected_link_does_not_sleep() {
    let mut link = ScriptedLink::connecting_after(1);
    let clock = ManualClock::new();

    block_on(connect_with_timeout(&mut link, &clock, &settings())).expect("connected");
    assert!(clock.sleeps().is_empty());
}

#[test]
fn times_out_when_link_never_comes_up() {
    let mut link = ScriptedLink::never_connecting();
    let clock = ManualClock::new();

    let result = block_on(connect_with_timeout(&mut link, &clock, &settings()));

    assert_eq!(result, Err(ConnectError::Timeout));
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
    // One check per second plus the final check at the deadline.
    assert_eq!(link.polls(), 11);
}

#[test]
fn link_up_exactly_at_deadline_counts_as_connected() {
    let mut link = ScriptedLink::connecting_after(11);
    let clock = ManualClock::new();

    block_on(connect_with_timeout(&mut link, &clock, &settings())).expect("connected");
    assert_eq!(clock.elapsed(), Duration::from_secs(10));
}

#[test]
fn last_sleep_is_clamped_to_the_deadline() {
    let mut link = ScriptedLink::never_connecting();
    let clock = ManualClock::new();
    let settings = SyncSettings {
        connect_timeout: Duration::from_millis(2_500),
        ..settings()
    };

    let result = block_on(connect_with_timeout(&mut link, &clock, &settings));

    assert_eq!(result, Err(ConnectError::Timeout));
    assert_eq!(
        clock.sleeps(),
        vec![
            Duration::from_secs(1),
            Duration::from_secs(1),
            Duration::from_millis(500)
        ]
    );
}

#[test]
fn zero_poll_interval_still_makes_progress() {
    let mut link = ScriptedLink::never_connecting();
    let clock = ManualClock::new();
    let settings = SyncSettings {
        connect_timeout: Duration::from_millis(5),
        poll_interval: Duration::from_ticks(0),
        ..settings()
    };

    let result = block_on(connect_with_timeout(&mut link, &clock, &settings));

    assert_eq!(result, Err(ConnectError::Timeout));
    assert_eq!(clock.elapsed(), Duration::from_millis(5));
}

#[test]
fn begin_failure_is_reported_without_polling() {
    let mut link = ScriptedLink::failing_begin("radio off");
    let clock = ManualClock::new();

    let result = block_on(connect_with_timeout(&mut link, &clock, &settings()));

    assert_eq!(result, Err(ConnectError::Link(LinkError("radio off".into()))));
    assert_eq!(link.polls(), 0);
}
