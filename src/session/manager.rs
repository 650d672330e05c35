//! Session Manager - signed-cookie sessions over a pluggable store
//!
//! The `SessionManager` is the entry point for request handling code. It turns
//! the inbound `Cookie` header into a [`Session`] and, once the handler is done,
//! persists the session if needed and renders the `Set-Cookie` header.
//!
//! ## Failure handling
//!
//! - **Cookie problems** (tampered, stale, malformed): absorbed. The request
//!   simply gets a fresh session; only the log records what happened.
//! - **Store problems**: propagated as `SessionError::BackendUnavailable`. The
//!   hosting layer decides whether to fail the request.

use std::sync::Arc;

use actix_web::cookie::Cookie;
use log::{debug, warn};

use crate::session::cookie::{extract_cookie_value, CookieFactory};
use crate::session::errors::{SessionError, SignatureError};
use crate::session::expiry::ExpiryPolicy;
use crate::session::key::SessionKey;
use crate::session::object::Session;
use crate::settings::SessionSettings;
use crate::signing::Signer;
use crate::store::{build_store, SessionStore};

/// Salt separating session cookies from any other value signed with the same secrets
pub const SESSION_SALT: &str = "satchel.session";

#[derive(Clone)]
pub struct SessionManager {
    settings: Arc<SessionSettings>,
    signer: Signer,
    store: Arc<dyn SessionStore>,
    cookie_factory: CookieFactory,
    policy: ExpiryPolicy,
}

// =============================================================================
// Construction
// =============================================================================

impl SessionManager {
    /// Create a manager over an existing store
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Configuration` if no usable signing secret is configured.
    pub fn new(
        settings: SessionSettings,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, SessionError> {
        let signer = Signer::new(&settings.secret_keys)?;
        let cookie_factory = CookieFactory::from_settings(&settings);
        let policy = ExpiryPolicy::from_settings(&settings);

        Ok(Self {
            settings: Arc::new(settings),
            signer,
            store,
            cookie_factory,
            policy,
        })
    }

    /// Create a manager with the store selected by `settings.backend`
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be built or the secrets are unusable.
    pub fn from_settings(settings: SessionSettings) -> Result<Self, SessionError> {
        let store = build_store(&settings)?;
        Self::new(settings, store)
    }
}

// =============================================================================
// Request side
// =============================================================================

impl SessionManager {
    /// Resolve the session for an inbound request
    ///
    /// A missing, invalid or expired cookie, or a key the store no longer
    /// knows, all yield a new empty session.
    ///
    /// # Errors
    ///
    /// Returns `SessionError::BackendUnavailable` if the store cannot be read.
    pub async fn get_session(&self, cookie_header: Option<&str>) -> Result<Session, SessionError> {
        let Some(key) = self.session_key_from_cookie(cookie_header) else {
            return Ok(self.new_session());
        };

        match self.store.load(&key).await? {
            Some(record) => Ok(Session::loaded(
                key,
                record,
                Arc::clone(&self.store),
                self.policy,
            )),
            None => {
                debug!("Session cookie refers to a missing or expired session");
                Ok(self.new_session())
            }
        }
    }

    /// Verify the session cookie in `cookie_header` and return the key it carries
    #[must_use]
    pub fn session_key_from_cookie(&self, cookie_header: Option<&str>) -> Option<SessionKey> {
        let value = extract_cookie_value(cookie_header?, self.cookie_factory.cookie_name())?;
        let max_age = self
            .settings
            .token_max_age_seconds
            .map(|seconds| i64::try_from(seconds).unwrap_or(i64::MAX));

        match self.signer.unsign_value(&value, SESSION_SALT, max_age) {
            Ok(raw_key) => {
                let key = SessionKey::parse(&raw_key);
                if key.is_none() {
                    warn!("Signed session cookie carries an invalid session key");
                }
                key
            }
            Err(SignatureError::BadSignature) => {
                warn!("Rejected session cookie with a bad signature (possible tampering)");
                None
            }
            Err(e) => {
                debug!("Ignoring session cookie: {e}");
                None
            }
        }
    }

    /// A fresh session with no key
    #[must_use]
    pub fn new_session(&self) -> Session {
        Session::new(Arc::clone(&self.store), self.policy)
    }
}

// =============================================================================
// Response side
// =============================================================================

impl SessionManager {
    /// Apply the save policy and return the `Set-Cookie` header to send, if any
    ///
    /// Modified sessions are saved; unmodified sessions with a key are saved
    /// too when `save_every_request` is set. A new session that never received
    /// data is not persisted and gets no cookie.
    ///
    /// # Errors
    ///
    /// Propagates store failures from the save.
    pub async fn finish(&self, session: &mut Session) -> Result<Option<String>, SessionError> {
        let should_save = if session.is_new_and_empty() {
            false
        } else {
            session.is_modified()
                || (self.settings.save_every_request && session.session_key().is_some())
        };

        if should_save {
            session.save().await?;
        }

        Ok(self.build_set_cookie_header(session))
    }

    /// Render the `Set-Cookie` header for a session written during this request
    #[must_use]
    pub fn build_set_cookie_header(&self, session: &Session) -> Option<String> {
        self.build_cookie(session).map(|cookie| cookie.to_string())
    }

    /// The session cookie for a session written during this request
    #[must_use]
    pub fn build_cookie(&self, session: &Session) -> Option<Cookie<'static>> {
        if !session.cookie_pending() {
            return None;
        }
        let key = session.session_key()?;
        let value = self.signer.sign_value(key.as_str(), SESSION_SALT);
        Some(
            self.cookie_factory
                .create_session_cookie(value, session.cookie_max_age()),
        )
    }
}

// =============================================================================
// Utilities
// =============================================================================

impl SessionManager {
    /// Sweep expired sessions from the store
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn clear_expired(&self) -> Result<usize, SessionError> {
        self.store.clear_expired().await
    }

    #[must_use]
    pub fn store(&self) -> Arc<dyn SessionStore> {
        Arc::clone(&self.store)
    }

    #[must_use]
    pub const fn signer(&self) -> &Signer {
        &self.signer
    }

    #[must_use]
    pub const fn cookie_factory(&self) -> &CookieFactory {
        &self.cookie_factory
    }

    #[must_use]
    pub fn settings(&self) -> &SessionSettings {
        &self.settings
    }
}
