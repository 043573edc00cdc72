use alloc::{string::String, vec::Vec};
use core::fmt;
use zeroize::Zeroizing;

/// Failure to start joining the configured network.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkError(pub String);

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "network link error: {}", self.0)
    }
}

/// HTTP exchange that failed before a status code was received.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransportError(pub String);

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http transport error: {}", self.0)
    }
}

/// Station-mode network connection (Wi-Fi on the device).
#[allow(async_fn_in_trait)]
pub trait NetworkLink {
    /// Start joining the network; completion is observed through `is_connected`.
    async fn begin(&mut self, ssid: &str, password: &str) -> Result<(), LinkError>;

    fn is_connected(&mut self) -> bool;

    async fn disconnect(&mut self);
}

#[derive(Debug, Clone, Copy)]
pub struct HttpRequest<'a> {
    pub url: &'a str,
    pub headers: &'a [(&'a str, &'a str)],
    pub body: &'a [u8],
}

impl HttpRequest<'_> {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| *value)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Zeroizing<Vec<u8>>,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: Zeroizing::new(body.into()),
        }
    }
}

/// Blocking-until-complete HTTP POST.
#[allow(async_fn_in_trait)]
pub trait HttpTransport {
    async fn post(&mut self, request: &HttpRequest<'_>) -> Result<HttpResponse, TransportError>;
}
