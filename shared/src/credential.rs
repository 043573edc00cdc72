use alloc::{borrow::ToOwned, string::String, vec::Vec};
use core::fmt;
use core::ops::Deref;
use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Wrapper around sensitive strings that zeroize their memory on drop.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    pub fn new(value: String) -> Self {
        Self(Zeroizing::new(value))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl From<String> for SecretString {
    fn from(value: String) -> Self {
        Self::new(value)
    }
}

impl From<&str> for SecretString {
    fn from(value: &str) -> Self {
        Self::new(value.to_owned())
    }
}

impl Deref for SecretString {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SecretString(<{} chars>)", self.0.chars().count())
    }
}

impl Serialize for SecretString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Self::new(value))
    }
}

/// A named login remembered by the device.
///
/// The title travels as `name` on the wire and in the persisted cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    #[serde(rename = "name")]
    pub title: String,
    pub userid: String,
    pub password: SecretString,
}

impl Credential {
    pub fn new(
        title: impl Into<String>,
        userid: impl Into<String>,
        password: impl Into<SecretString>,
    ) -> Self {
        Self {
            title: title.into(),
            userid: userid.into(),
            password: password.into(),
        }
    }
}

/// Ordered, index-addressed list of credentials.
///
/// The list is never edited in place; a sync replaces it wholesale.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CredentialList(Vec<Credential>);

impl CredentialList {
    pub const fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Credential> {
        self.0.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Credential> {
        self.0.iter()
    }

    pub fn as_slice(&self) -> &[Credential] {
        &self.0
    }
}

impl From<Vec<Credential>> for CredentialList {
    fn from(entries: Vec<Credential>) -> Self {
        Self(entries)
    }
}

impl FromIterator<Credential> for CredentialList {
    fn from_iter<I: IntoIterator<Item = Credential>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a CredentialList {
    type Item = &'a Credential;
    type IntoIter = core::slice::Iter<'a, Credential>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
