//! Mock store implementations for exercising failure paths

use async_trait::async_trait;

use crate::session::{SessionError, SessionKey};
use crate::store::{SessionRecord, SessionStore};

/// A store whose backend is always down
pub struct UnavailableStore;

impl UnavailableStore {
    fn down() -> SessionError {
        SessionError::BackendUnavailable("mock backend is down".to_string())
    }
}

#[async_trait]
impl SessionStore for UnavailableStore {
    async fn load(&self, _key: &SessionKey) -> Result<Option<SessionRecord>, SessionError> {
        Err(Self::down())
    }

    async fn save(&self, _key: &SessionKey, _record: &SessionRecord) -> Result<(), SessionError> {
        Err(Self::down())
    }

    async fn create(
        &self,
        _key: &SessionKey,
        _record: &SessionRecord,
    ) -> Result<bool, SessionError> {
        Err(Self::down())
    }

    async fn delete(&self, _key: &SessionKey) -> Result<(), SessionError> {
        Err(Self::down())
    }

    async fn exists(&self, _key: &SessionKey) -> Result<bool, SessionError> {
        Err(Self::down())
    }

    async fn clear_expired(&self) -> Result<usize, SessionError> {
        Err(Self::down())
    }

    fn backend_name(&self) -> &'static str {
        "unavailable"
    }
}
