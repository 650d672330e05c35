//! Timestamped HMAC signing
//!
//! [`Signer`] authenticates a payload with HMAC-SHA256 under a key derived
//! from a secret and a salt. The signing time is embedded in the token so a
//! verifier can enforce a maximum age. Several secrets may be trusted at once
//! to allow rotation: tokens are always signed with the first (current)
//! secret and verified against every secret in order.
//!
//! - [`codec`] - text encoding of [`SignedToken`] for cookies

pub mod codec;

use std::fmt;
use std::sync::Arc;

use chrono::Utc;

use crate::session::errors::{SessionError, SignatureError};
use crate::utils::crypto::{derive_signing_key, hmac_sha256, verify_hmac_sha256};

/// A payload together with its signing time and signature
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedToken {
    pub payload: Vec<u8>,
    /// Seconds since the Unix epoch at signing time
    pub timestamp: i64,
    pub signature: Vec<u8>,
}

/// Stateless sign/verify engine over byte payloads
#[derive(Clone)]
pub struct Signer {
    // Current secret first, then previous secrets still accepted
    secrets: Arc<[Vec<u8>]>,
}

impl fmt::Debug for Signer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signer")
            .field("secrets", &format_args!("<{} redacted>", self.secrets.len()))
            .finish()
    }
}

impl Signer {
    /// Create a signer from an ordered list of secrets, current first
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` if no secrets are given or any
    /// secret is empty.
    pub fn new<I, S>(secrets: I) -> Result<Self, SessionError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let secrets: Vec<Vec<u8>> = secrets.into_iter().map(|s| s.as_ref().to_vec()).collect();
        if secrets.is_empty() {
            return Err(SessionError::Configuration(
                "at least one signing secret is required".to_string(),
            ));
        }
        if secrets.iter().any(Vec::is_empty) {
            return Err(SessionError::Configuration(
                "signing secrets must not be empty".to_string(),
            ));
        }
        Ok(Self {
            secrets: secrets.into(),
        })
    }

    /// Number of trusted secrets, including the current one
    #[must_use]
    pub fn secret_count(&self) -> usize {
        self.secrets.len()
    }

    /// Sign `payload` under `salt` with the current time embedded
    #[must_use]
    pub fn sign(&self, payload: &[u8], salt: &str) -> SignedToken {
        self.sign_at(payload, salt, Utc::now().timestamp())
    }

    /// Sign `payload` under `salt` with an explicit timestamp
    #[must_use]
    pub fn sign_at(&self, payload: &[u8], salt: &str, timestamp: i64) -> SignedToken {
        let key = derive_signing_key(&self.secrets[0], salt);
        let signature = hmac_sha256(&key, &[payload, &timestamp.to_be_bytes()]);
        SignedToken {
            payload: payload.to_vec(),
            timestamp,
            signature,
        }
    }

    /// Verify `token` under `salt` and return its payload
    ///
    /// # Errors
    ///
    /// - `BadSignature` if no trusted secret produced the signature
    /// - `SignatureExpired` if `max_age_seconds` is given and the token is older
    pub fn unsign(
        &self,
        token: &SignedToken,
        salt: &str,
        max_age_seconds: Option<i64>,
    ) -> Result<Vec<u8>, SignatureError> {
        self.unsign_at(token, salt, max_age_seconds, Utc::now().timestamp())
    }

    /// Verify `token` as of `now` (seconds since the Unix epoch)
    ///
    /// # Errors
    ///
    /// See [`Signer::unsign`].
    pub fn unsign_at(
        &self,
        token: &SignedToken,
        salt: &str,
        max_age_seconds: Option<i64>,
        now: i64,
    ) -> Result<Vec<u8>, SignatureError> {
        let timestamp = token.timestamp.to_be_bytes();
        let parts: [&[u8]; 2] = [&token.payload, &timestamp];

        let verified = self.secrets.iter().any(|secret| {
            let key = derive_signing_key(secret, salt);
            verify_hmac_sha256(&key, &parts, &token.signature)
        });
        if !verified {
            return Err(SignatureError::BadSignature);
        }

        if let Some(max_age) = max_age_seconds {
            let age = now.saturating_sub(token.timestamp);
            if age > max_age {
                return Err(SignatureError::SignatureExpired { age, max_age });
            }
        }

        Ok(token.payload.clone())
    }

    /// Sign a string and encode it as a cookie-safe value
    #[must_use]
    pub fn sign_value(&self, value: &str, salt: &str) -> String {
        codec::encode(&self.sign(value.as_bytes(), salt))
    }

    /// Decode and verify a value produced by [`Signer::sign_value`]
    ///
    /// # Errors
    ///
    /// Returns `MalformedToken` for undecodable input (including non UTF-8
    /// payloads), `BadSignature` for an unreadable signature field, and
    /// otherwise the errors of [`Signer::unsign`].
    pub fn unsign_value(
        &self,
        value: &str,
        salt: &str,
        max_age_seconds: Option<i64>,
    ) -> Result<String, SignatureError> {
        let token = codec::decode(value)?;
        let payload = self.unsign(&token, salt, max_age_seconds)?;
        String::from_utf8(payload)
            .map_err(|_| SignatureError::MalformedToken("payload is not UTF-8".to_string()))
    }
}
