//! Test fixtures providing pre-built test objects

use std::sync::Arc;

use crate::session::SessionManager;
use crate::settings::SessionSettings;
use crate::store::{MemoryStore, SessionStore};

use super::constants::{
    TEST_COOKIE_NAME, TEST_DEFAULT_AGE_SECONDS, TEST_PREVIOUS_SECRET, TEST_SECRET,
};

/// Central fixture provider for all test data
pub struct TestFixtures;

impl TestFixtures {
    /// Session settings with fixed secrets and non-secure cookies
    #[must_use]
    pub fn session_settings() -> SessionSettings {
        SessionSettings {
            cookie_name: TEST_COOKIE_NAME.to_string(),
            secure: false,
            default_age_seconds: TEST_DEFAULT_AGE_SECONDS,
            secret_keys: vec![TEST_SECRET.to_string(), TEST_PREVIOUS_SECRET.to_string()],
            sweep_interval_seconds: 0,
            ..SessionSettings::default()
        }
    }

    /// Session manager over a fresh in-memory store
    #[must_use]
    pub fn session_manager() -> SessionManager {
        Self::session_manager_with_store(Arc::new(MemoryStore::new()))
    }

    /// Session manager over the given store
    ///
    /// # Panics
    ///
    /// Panics if the fixture settings are rejected.
    #[must_use]
    pub fn session_manager_with_store(store: Arc<dyn SessionStore>) -> SessionManager {
        SessionManager::new(Self::session_settings(), store).unwrap()
    }

    /// Session manager trusting exactly `secrets`, current first
    ///
    /// # Panics
    ///
    /// Panics if `secrets` is empty or contains an empty secret.
    #[must_use]
    pub fn session_manager_with_secrets(
        secrets: &[&str],
        store: Arc<dyn SessionStore>,
    ) -> SessionManager {
        let settings = SessionSettings {
            secret_keys: secrets.iter().map(ToString::to_string).collect(),
            ..Self::session_settings()
        };
        SessionManager::new(settings, store).unwrap()
    }
}

/// Turn a `Set-Cookie` header into the `Cookie` request header a browser would send back
///
/// # Panics
///
/// Panics if the header has no `name=value` pair.
#[must_use]
pub fn request_cookie(set_cookie: &str) -> String {
    let pair = set_cookie.split(';').next().unwrap().trim();
    assert!(pair.contains('='), "not a cookie header: {set_cookie}");
    pair.to_string()
}
