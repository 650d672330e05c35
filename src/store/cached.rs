use std::sync::Arc;

use async_trait::async_trait;
use log::debug;

use super::{MemoryStore, SessionRecord, SessionStore};
use crate::session::errors::SessionError;
use crate::session::key::SessionKey;

/// Write-through cache over a durable store
///
/// Reads are served from process memory when possible; writes always reach
/// the durable store first, so a crash never loses an acknowledged save.
/// The cache is local to the process: deployments running several processes
/// against one directory should use the plain durable store instead.
pub struct CachedStore {
    cache: MemoryStore,
    inner: Arc<dyn SessionStore>,
}

impl CachedStore {
    #[must_use]
    pub fn new(inner: Arc<dyn SessionStore>) -> Self {
        Self {
            cache: MemoryStore::new(),
            inner,
        }
    }
}

#[async_trait]
impl SessionStore for CachedStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>, SessionError> {
        if let Some(record) = self.cache.load(key).await? {
            return Ok(Some(record));
        }
        let record = self.inner.load(key).await?;
        if let Some(record) = &record {
            debug!("Session cache miss filled from {}", self.inner.backend_name());
            self.cache.save(key, record).await?;
        }
        Ok(record)
    }

    async fn save(&self, key: &SessionKey, record: &SessionRecord) -> Result<(), SessionError> {
        self.inner.save(key, record).await?;
        self.cache.save(key, record).await
    }

    async fn create(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<bool, SessionError> {
        if !self.inner.create(key, record).await? {
            return Ok(false);
        }
        self.cache.save(key, record).await?;
        Ok(true)
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), SessionError> {
        // Evict first so a failing backend never leaves a readable cached copy
        self.cache.delete(key).await?;
        self.inner.delete(key).await
    }

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionError> {
        if self.cache.exists(key).await? {
            return Ok(true);
        }
        self.inner.exists(key).await
    }

    async fn clear_expired(&self) -> Result<usize, SessionError> {
        self.cache.clear_expired().await?;
        self.inner.clear_expired().await
    }

    fn backend_name(&self) -> &'static str {
        "cached_file"
    }
}
