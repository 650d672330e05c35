//! Opaque session identifiers

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::utils::crypto::generate_random_string;

/// Length of every session key
pub const SESSION_KEY_LENGTH: usize = 32;

/// Characters a session key is drawn from
pub const VALID_KEY_CHARS: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

/// Unguessable identifier of a stored session
///
/// Only constructible through [`SessionKey::generate`] or a successful
/// [`SessionKey::parse`], so every instance is safe to embed in file names
/// and cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionKey(String);

impl SessionKey {
    /// Draw a fresh key from the CSPRNG
    ///
    /// Uniqueness against the store is the caller's job, see
    /// [`crate::store::allocate_key`].
    #[must_use]
    pub fn generate() -> Self {
        Self(generate_random_string(SESSION_KEY_LENGTH, VALID_KEY_CHARS))
    }

    /// Accept `value` only if it has the shape of a generated key
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let well_formed = value.len() == SESSION_KEY_LENGTH
            && value.bytes().all(|b| VALID_KEY_CHARS.contains(&b));
        well_formed.then(|| Self(value.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionKey {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid session key: {value:?}"))
    }
}

impl From<SessionKey> for String {
    fn from(key: SessionKey) -> Self {
        key.0
    }
}
