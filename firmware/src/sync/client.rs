use alloc::string::{String, ToString};
use core::cmp;
use core::fmt;

use embassy_time::Duration;
use embedded_storage_async::nor_flash::NorFlash;
use shared::CredentialList;
use shared::schema::{
    API_KEY_HEADER, CONTENT_TYPE_JSON, STATUS_OK, SyncRequest, decode_envelope, encode_request,
};

use super::net::{HttpRequest, HttpTransport, LinkError, NetworkLink, TransportError};
use crate::storage::{CACHE_CAPACITY, CredentialCache, StoreError};
use crate::time::{Clock, Deadline};

const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// JSON spends several bytes per stored byte on keys and quoting.
const JSON_EXPANSION: usize = 4;
const HEADER_HEADROOM: usize = 2048;

/// Receive buffer a transport needs so that any list too large for the
/// cache arrives whole and fails in the store as `TooLarge`.
pub const RESPONSE_BUFFER_LEN: usize = CACHE_CAPACITY * JSON_EXPANSION + HEADER_HEADROOM;

/// Everything a refresh needs to reach the endpoint.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings<'a> {
    pub wifi_ssid: &'a str,
    pub wifi_password: &'a str,
    pub endpoint: &'a str,
    pub api_key: &'a str,
    pub connect_timeout: Duration,
    pub poll_interval: Duration,
}

impl SyncSettings<'_> {
    /// First required field that is blank, if any.
    pub fn missing_field(&self) -> Option<&'static str> {
        let required = [
            ("wifi ssid", self.wifi_ssid),
            ("sync endpoint", self.endpoint),
            ("api key", self.api_key),
        ];

        required
            .into_iter()
            .find(|(_, value)| value.trim().is_empty())
            .map(|(field, _)| field)
    }
}

impl fmt::Debug for SyncSettings<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncSettings")
            .field("wifi_ssid", &self.wifi_ssid)
            .field("endpoint", &self.endpoint)
            .field("connect_timeout_ms", &self.connect_timeout.as_millis())
            .field("poll_interval_ms", &self.poll_interval.as_millis())
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectError {
    /// The link never reported connected before the deadline.
    Timeout,
    Link(LinkError),
}

#[derive(Debug)]
pub enum SyncError<E> {
    NotConfigured(&'static str),
    NetworkTimeout,
    Link(LinkError),
    Transport(TransportError),
    /// Endpoint answered with a status other than 200.
    RemoteError(u16),
    MalformedResponse(String),
    PersistFailed(StoreError<E>),
}

impl<E> From<ConnectError> for SyncError<E> {
    fn from(error: ConnectError) -> Self {
        match error {
            ConnectError::Timeout => SyncError::NetworkTimeout,
            ConnectError::Link(err) => SyncError::Link(err),
        }
    }
}

impl<E: fmt::Debug> fmt::Display for SyncError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncError::NotConfigured(field) => write!(f, "{field} is not configured"),
            SyncError::NetworkTimeout => write!(f, "timed out joining the network"),
            SyncError::Link(err) => write!(f, "{err}"),
            SyncError::Transport(err) => write!(f, "{err}"),
            SyncError::RemoteError(status) => write!(f, "endpoint returned status {status}"),
            SyncError::MalformedResponse(err) => write!(f, "malformed response: {err}"),
            SyncError::PersistFailed(err) => write!(f, "failed to persist credentials: {err}"),
        }
    }
}

impl<E: fmt::Debug> core::error::Error for SyncError<E> {}

/// Start joining the network and poll until connected or `timeout` elapses.
///
/// The link status is checked before the deadline, so a link that comes up
/// exactly at the deadline still counts as connected.
pub async fn connect_with_timeout<L, C>(
    link: &mut L,
    clock: &C,
    settings: &SyncSettings<'_>,
) -> Result<(), ConnectError>
where
    L: NetworkLink,
    C: Clock,
{
    link.begin(settings.wifi_ssid, settings.wifi_password)
        .await
        .map_err(ConnectError::Link)?;

    let deadline = Deadline::after(clock, settings.connect_timeout);
    let poll = cmp::max(settings.poll_interval, MIN_POLL_INTERVAL);

    loop {
        if link.is_connected() {
            log::info!("joined network {}", settings.wifi_ssid);
            return Ok(());
        }
        if deadline.has_passed(clock) {
            log::warn!(
                "network {} not joined within {} ms",
                settings.wifi_ssid,
                settings.connect_timeout.as_millis()
            );
            return Err(ConnectError::Timeout);
        }

        clock.sleep(cmp::min(poll, deadline.remaining(clock))).await;
    }
}

/// POST `{}` to the endpoint and decode the credential list it returns.
pub async fn fetch_credentials<H, E>(
    http: &mut H,
    settings: &SyncSettings<'_>,
) -> Result<CredentialList, SyncError<E>>
where
    H: HttpTransport,
{
    let body = encode_request(&SyncRequest {})
        .map_err(|err| SyncError::Transport(TransportError(err.to_string())))?;
    let headers = [
        ("Content-Type", CONTENT_TYPE_JSON),
        (API_KEY_HEADER, settings.api_key),
    ];
    let request = HttpRequest {
        url: settings.endpoint,
        headers: &headers,
        body: &body,
    };

    let response = http.post(&request).await.map_err(SyncError::Transport)?;
    log::debug!("sync endpoint answered {}", response.status);
    if response.status != STATUS_OK {
        return Err(SyncError::RemoteError(response.status));
    }

    decode_envelope(&response.body).map_err(|err| SyncError::MalformedResponse(err.to_string()))
}

/// Replace the cached credentials with the endpoint's current list.
///
/// Returns the new credential count. Whatever the outcome, the network link
/// is torn down before returning; on any error the cache is left untouched.
pub async fn refresh<S, L, H, C>(
    cache: &mut CredentialCache<S>,
    link: &mut L,
    http: &mut H,
    clock: &C,
    settings: &SyncSettings<'_>,
) -> Result<usize, SyncError<S::Error>>
where
    S: NorFlash,
    L: NetworkLink,
    H: HttpTransport,
    C: Clock,
{
    if let Some(field) = settings.missing_field() {
        log::warn!("refresh skipped: {field} is not configured");
        return Err(SyncError::NotConfigured(field));
    }

    let outcome = fetch_and_replace(cache, link, http, clock, settings).await;
    link.disconnect().await;

    match &outcome {
        Ok(count) => log::info!("refresh stored {count} credentials"),
        Err(err) => log::warn!("refresh failed: {err}"),
    }
    outcome
}

async fn fetch_and_replace<S, L, H, C>(
    cache: &mut CredentialCache<S>,
    link: &mut L,
    http: &mut H,
    clock: &C,
    settings: &SyncSettings<'_>,
) -> Result<usize, SyncError<S::Error>>
where
    S: NorFlash,
    L: NetworkLink,
    H: HttpTransport,
    C: Clock,
{
    connect_with_timeout(link, clock, settings).await?;
    let list = fetch_credentials(http, settings).await?;
    cache.replace(list).await.map_err(SyncError::PersistFailed)
}
