use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::Utc;

use super::{SessionRecord, SessionStore};
use crate::session::errors::SessionError;
use crate::session::key::SessionKey;

/// Process-local session store
///
/// Sessions vanish on restart and are not shared between processes; use the
/// file backend when either matters.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<SessionKey, SessionRecord>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries currently held, expired ones included
    ///
    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn len(&self) -> Result<usize, SessionError> {
        Ok(self.read()?.len())
    }

    /// # Errors
    ///
    /// Returns an error if the lock is poisoned.
    pub fn is_empty(&self) -> Result<bool, SessionError> {
        Ok(self.read()?.is_empty())
    }

    fn read(
        &self,
    ) -> Result<std::sync::RwLockReadGuard<'_, HashMap<SessionKey, SessionRecord>>, SessionError>
    {
        self.entries
            .read()
            .map_err(|_| SessionError::BackendUnavailable("memory store lock poisoned".into()))
    }

    fn write(
        &self,
    ) -> Result<std::sync::RwLockWriteGuard<'_, HashMap<SessionKey, SessionRecord>>, SessionError>
    {
        self.entries
            .write()
            .map_err(|_| SessionError::BackendUnavailable("memory store lock poisoned".into()))
    }
}

#[async_trait]
#[allow(clippy::significant_drop_tightening)]
impl SessionStore for MemoryStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>, SessionError> {
        let now = Utc::now();
        {
            let entries = self.read()?;
            match entries.get(key) {
                None => return Ok(None),
                Some(record) if !record.is_expired_at(now) => return Ok(Some(record.clone())),
                Some(_) => {}
            }
        }

        // Stale entry: drop it unless a writer refreshed it in the meantime
        let mut entries = self.write()?;
        if entries.get(key).is_some_and(|record| record.is_expired_at(now)) {
            entries.remove(key);
        }
        Ok(None)
    }

    async fn save(&self, key: &SessionKey, record: &SessionRecord) -> Result<(), SessionError> {
        self.write()?.insert(key.clone(), record.clone());
        Ok(())
    }

    async fn create(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<bool, SessionError> {
        let mut entries = self.write()?;
        if entries.contains_key(key) {
            return Ok(false);
        }
        entries.insert(key.clone(), record.clone());
        Ok(true)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), SessionError> {
        self.write()?.remove(key);
        Ok(())
    }

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionError> {
        Ok(self.read()?.contains_key(key))
    }

    async fn clear_expired(&self) -> Result<usize, SessionError> {
        let now = Utc::now();
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|_, record| !record.is_expired_at(now));
        Ok(before - entries.len())
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}
