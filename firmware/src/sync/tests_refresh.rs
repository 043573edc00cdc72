use super::*;
use crate::storage::{CredentialCache, CredentialStore, StoreError};
use crate::testing::{FlakyFlash, ManualClock, ScriptedHttp, ScriptedLink};
use embassy_time::Duration;
use futures::executor::block_on;
use sequential_storage::mock_flash::{MockFlashBase, WriteCountCheck};
use shared::{Credential, CredentialList};

type Flash = MockFlashBase<16, 4, 1024>;

const MAIL_RESPONSE: &str =
    r#"{"result":[{"name":"Mail","userid":"bob","password":"Ab12!"}]}"#;

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

fn seeded_cache() -> CredentialCache<FlakyFlash<Flash>> {
    let flash = FlakyFlash::new(Flash::new(WriteCountCheck::Twice, None, false));
    let store = CredentialStore::new(flash, Flash::FULL_FLASH_RANGE);
    let mut cache = block_on(CredentialCache::boot(store));
    let seed: CredentialList = vec![
        Credential::new("Old", "ann", "one"),
        Credential::new("Older", "ben", "two"),
        Credential::new("Oldest", "cid", "three"),
    ]
    .into();
    block_on(cache.replace(seed)).expect("seed");
    cache
}

#[test]
fn successful_refresh_replaces_the_whole_list() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(2);
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();

    let count = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()))
        .expect("refresh");

    assert_eq!(count, 1);
    assert_eq!(cache.len(), 1);
    let credential = cache.get(0).expect("credential");
    assert_eq!(credential.title, "Mail");
    assert_eq!(credential.userid, "bob");
    assert_eq!(credential.password.expose(), "Ab12!");
    assert_eq!(link.disconnects(), 1);

    let persisted = block_on(cache.store_mut().load()).expect("load");
    assert_eq!(&persisted, cache.credentials());
}

#[test]
fn request_carries_api_key_and_empty_object() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();

    block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings())).expect("refresh");

    let requests = http.requests();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.url, "https://example.invalid/pwd-allpasswd");
    assert_eq!(request.header("x-api-key"), Some("key-123"));
    assert_eq!(request.header("Content-Type"), Some("application/json"));
    assert_eq!(request.body, b"{}");
}

#[test]
fn empty_result_empties_the_cache() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, r#"{"result":[]}"#);
    let clock = ManualClock::new();

    let count = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()))
        .expect("refresh");

    assert_eq!(count, 0);
    assert!(cache.is_empty());
}

#[test]
fn timeout_skips_the_request_and_still_disconnects() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::never_connecting();
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(result, Err(SyncError::NetworkTimeout)));
    assert!(http.requests().is_empty());
    assert_eq!(link.disconnects(), 1);
    assert_eq!(cache.len(), 3);
}

#[test]
fn non_ok_status_leaves_cache_untouched() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(401, r#"{"message":"unauthorized"}"#);
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(result, Err(SyncError::RemoteError(401))));
    assert_eq!(cache.len(), 3);
    assert_eq!(link.disconnects(), 1);
}

#[test]
fn success_status_other_than_200_is_a_remote_error() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(204, "");
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));
    assert!(matches!(result, Err(SyncError::RemoteError(204))));
}

#[test]
fn malformed_body_leaves_cache_untouched() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, r#"{"result":[{"name":"Mail"}]}"#);
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(result, Err(SyncError::MalformedResponse(_))));
    assert_eq!(cache.len(), 3);
    assert_eq!(link.disconnects(), 1);
}

#[test]
fn transport_failure_is_reported() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::new();
    http.push_failure("connection reset");
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(result, Err(SyncError::Transport(_))));
    assert_eq!(link.disconnects(), 1);
}

#[test]
fn oversized_response_keeps_persisted_bytes() {
    let mut cache = seeded_cache();
    let before = block_on(cache.store_mut().load_blob()).expect("blob");

    let entries: std::vec::Vec<std::string::String> = (0..64)
        .map(|i| {
            format!(
                r#"{{"name":"service-{i:02}","userid":"someone@example.com","password":"{}"}}"#,
                "x".repeat(64)
            )
        })
        .collect();
    let body = format!(r#"{{"result":[{}]}}"#, entries.join(","));
    assert!(body.len() + 512 < RESPONSE_BUFFER_LEN);

    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, &body);
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(
        result,
        Err(SyncError::PersistFailed(StoreError::TooLarge { .. }))
    ));
    assert_eq!(cache.len(), 3);
    let after = block_on(cache.store_mut().load_blob()).expect("blob");
    assert_eq!(*before, *after);
    assert_eq!(link.disconnects(), 1);
}

#[test]
fn flash_write_failure_is_persist_failed() {
    let mut cache = seeded_cache();
    cache.store_mut().flash_mut().fail_writes(true);
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings()));

    assert!(matches!(
        result,
        Err(SyncError::PersistFailed(StoreError::WriteFailed(_)))
    ));
    assert_eq!(cache.len(), 3);
}

#[test]
fn missing_configuration_never_touches_the_network() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();
    let settings = SyncSettings {
        endpoint: "",
        ..settings()
    };

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings));

    assert!(matches!(result, Err(SyncError::NotConfigured("sync endpoint"))));
    assert_eq!(link.begins(), 0);
    assert_eq!(link.disconnects(), 0);
    assert!(http.requests().is_empty());
}

#[test]
fn blank_api_key_is_not_configured() {
    let mut cache = seeded_cache();
    let mut link = ScriptedLink::connecting_after(1);
    let mut http = ScriptedHttp::responding(200, MAIL_RESPONSE);
    let clock = ManualClock::new();
    let settings = SyncSettings {
        api_key: " ",
        ..settings()
    };

    let result = block_on(refresh(&mut cache, &mut link, &mut http, &clock, &settings));

    assert!(matches!(result, Err(SyncError::NotConfigured("api key"))));
    assert_eq!(link.begins(), 0);
    assert!(http.requests().is_empty());
}
