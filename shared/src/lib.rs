#![cfg_attr(not(test), no_std)]

//! Data model and sync wire schema shared by the password reminder firmware.

extern crate alloc;

pub mod credential;
pub mod schema;

pub use credential::{Credential, CredentialList, SecretString};
pub use schema::{CodecError, CredentialEnvelope, SyncRequest};
