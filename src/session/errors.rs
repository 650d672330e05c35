//! Error taxonomy for the session subsystem
//!
//! Signature and format failures (`SignatureError`) are absorbed by the
//! `SessionManager` and downgraded to "no session". `SessionError` is what
//! callers actually see: configuration misuse and backend failures.

use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use thiserror::Error;

/// Failures while verifying a signed value
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SignatureError {
    /// The signature does not match the payload under any trusted secret
    #[error("signature does not match")]
    BadSignature,

    /// The signature is valid but older than the accepted max age
    #[error("signature age {age}s exceeds max age {max_age}s")]
    SignatureExpired { age: i64, max_age: i64 },

    /// The value could not be decoded into a token at all
    #[error("malformed token: {0}")]
    MalformedToken(String),
}

/// Errors surfaced to callers of the session subsystem
#[derive(Debug, Error)]
pub enum SessionError {
    /// A caller asked for an expiry that has already passed
    #[error("invalid session expiry: {0}")]
    InvalidExpiry(String),

    /// The session store could not complete the operation
    #[error("session backend unavailable: {0}")]
    BackendUnavailable(String),

    /// Session data could not be converted to or from its stored form
    #[error("session serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Settings handed to the subsystem are unusable
    #[error("session configuration error: {0}")]
    Configuration(String),
}

impl SessionError {
    pub(crate) fn backend(context: &str, err: impl std::fmt::Display) -> Self {
        Self::BackendUnavailable(format!("{context}: {err}"))
    }
}

impl ResponseError for SessionError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BackendUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::InvalidExpiry(_) => StatusCode::BAD_REQUEST,
            Self::Serialization(_) | Self::Configuration(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        // Backend details stay in the log, never in the response body
        let message = match self {
            Self::InvalidExpiry(msg) => msg.clone(),
            Self::BackendUnavailable(_) => "Session storage unavailable".to_string(),
            Self::Serialization(_) | Self::Configuration(_) => "Internal server error".to_string(),
        };
        HttpResponse::build(self.status_code()).json(serde_json::json!({ "error": message }))
    }
}
