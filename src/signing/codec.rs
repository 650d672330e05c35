//! Cookie-safe textual encoding of signed tokens
//!
//! A token is written as three base64url fields joined by dots:
//! `payload.timestamp.signature`. The timestamp field is the big-endian
//! 8-byte Unix timestamp. A value whose payload and timestamp decode but whose
//! signature field does not is a forged or damaged signature and decodes to
//! `BadSignature`. Every other failure is `MalformedToken`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};

use super::SignedToken;
use crate::session::errors::SignatureError;

/// Field separator; never produced by base64url
pub const SEPARATOR: char = '.';

/// Longest cookie value accepted for decoding (browsers cap cookies at 4 KiB)
pub const MAX_ENCODED_LEN: usize = 4096;

/// Encode a token into its cookie value form
#[must_use]
pub fn encode(token: &SignedToken) -> String {
    format!(
        "{}{SEPARATOR}{}{SEPARATOR}{}",
        URL_SAFE_NO_PAD.encode(&token.payload),
        URL_SAFE_NO_PAD.encode(token.timestamp.to_be_bytes()),
        URL_SAFE_NO_PAD.encode(&token.signature),
    )
}

/// Decode a cookie value back into a token
///
/// # Errors
///
/// Returns `SignatureError::MalformedToken` if the value is too long, has
/// fewer than three fields, or the payload or timestamp is not valid
/// base64url. Returns `SignatureError::BadSignature` if only the signature
/// field is unreadable or empty.
pub fn decode(value: &str) -> Result<SignedToken, SignatureError> {
    if value.len() > MAX_ENCODED_LEN {
        return Err(malformed("value too long"));
    }

    // Stray separators after the timestamp belong to the signature field
    let mut fields = value.splitn(3, SEPARATOR);
    let (Some(payload), Some(timestamp), Some(signature)) =
        (fields.next(), fields.next(), fields.next())
    else {
        return Err(malformed("expected three fields"));
    };

    let payload = URL_SAFE_NO_PAD
        .decode(payload)
        .map_err(|_| malformed("payload is not base64url"))?;
    let timestamp_bytes: [u8; 8] = URL_SAFE_NO_PAD
        .decode(timestamp)
        .map_err(|_| malformed("timestamp is not base64url"))?
        .try_into()
        .map_err(|_| malformed("timestamp has wrong length"))?;
    let signature = URL_SAFE_NO_PAD
        .decode(signature)
        .map_err(|_| SignatureError::BadSignature)?;

    if signature.is_empty() {
        return Err(SignatureError::BadSignature);
    }

    Ok(SignedToken {
        payload,
        timestamp: i64::from_be_bytes(timestamp_bytes),
        signature,
    })
}

fn malformed(reason: &str) -> SignatureError {
    SignatureError::MalformedToken(reason.to_string())
}
