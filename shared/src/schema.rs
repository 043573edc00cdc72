//! JSON shapes exchanged with the sync endpoint and persisted in flash.
//!
//! The persisted cache reuses the response envelope verbatim, so a blob
//! written after a sync can be decoded with the same codec at boot.

use alloc::{string::String, string::ToString, vec::Vec};
use core::fmt;
use serde::{Deserialize, Serialize};

use crate::credential::CredentialList;

/// Header carrying the endpoint API key.
pub const API_KEY_HEADER: &str = "X-API-KEY";
/// Content type used for both request and response bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";
/// HTTP status accepted as a successful fetch.
pub const STATUS_OK: u16 = 200;

/// Body of the fetch request; always the empty object.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {}

/// `{"result": [...]}` wrapper used by the endpoint and the flash cache.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEnvelope {
    pub result: CredentialList,
}

impl CredentialEnvelope {
    pub fn new(result: CredentialList) -> Self {
        Self { result }
    }

    pub fn into_list(self) -> CredentialList {
        self.result
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    Encode(String),
    Decode(String),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::Encode(err) => write!(f, "failed to encode JSON: {err}"),
            CodecError::Decode(err) => write!(f, "failed to decode JSON: {err}"),
        }
    }
}

impl core::error::Error for CodecError {}

pub fn encode_request(request: &SyncRequest) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec(request).map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn encode_envelope(list: &CredentialList) -> Result<Vec<u8>, CodecError> {
    #[derive(Serialize)]
    struct Borrowed<'a> {
        result: &'a CredentialList,
    }

    serde_json::to_vec(&Borrowed { result: list })
        .map_err(|err| CodecError::Encode(err.to_string()))
}

pub fn decode_envelope(bytes: &[u8]) -> Result<CredentialList, CodecError> {
    serde_json::from_slice::<CredentialEnvelope>(bytes)
        .map(CredentialEnvelope::into_list)
        .map_err(|err| CodecError::Decode(err.to_string()))
}
