//! Wi-Fi refresh of the credential cache from the remote endpoint.
//!
//! A refresh is a full replace: connect, POST `{}` with the API key, decode
//! the `result` array and commit it through [`crate::storage::CredentialCache`].
//! The radio and HTTP stacks stay behind [`NetworkLink`] and [`HttpTransport`].

mod client;
mod net;

pub use client::{
    ConnectError, RESPONSE_BUFFER_LEN, SyncError, SyncSettings, connect_with_timeout,
    fetch_credentials, refresh,
};
pub use net::{HttpRequest, HttpResponse, HttpTransport, LinkError, NetworkLink, TransportError};

#[cfg(test)]
mod tests_connect;
#[cfg(test)]
mod tests_refresh;
