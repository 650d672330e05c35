//! Session persistence backends
//!
//! Every backend implements [`SessionStore`]. Loads re-check expiry on every
//! read, so periodic sweeping through [`SessionStore::clear_expired`] only
//! reclaims space and is never needed for correctness.
//!
//! - [`memory`] - process-local map
//! - [`file`] - one JSON file per session in a directory
//! - [`cached`] - write-through memory cache in front of another store

pub mod cached;
pub mod file;
pub mod memory;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error, info};
use serde::{Deserialize, Serialize};

use crate::session::errors::SessionError;
use crate::session::expiry::SessionExpiry;
use crate::session::key::SessionKey;
use crate::settings::{BackendKind, SessionSettings};

pub use cached::CachedStore;
pub use file::FileStore;
pub use memory::MemoryStore;

/// Session payload: string keys mapped to arbitrary JSON values
pub type SessionData = HashMap<String, serde_json::Value>;

/// Upper bound on key draws before giving up on allocation
pub const MAX_KEY_ATTEMPTS: usize = 32;

/// Everything persisted for one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRecord {
    #[serde(default)]
    pub data: SessionData,
    #[serde(default)]
    pub expiry: SessionExpiry,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    pub expire_date: DateTime<Utc>,
}

impl SessionRecord {
    /// An empty record created at `now`
    #[must_use]
    pub fn new(now: DateTime<Utc>, expire_date: DateTime<Utc>) -> Self {
        Self {
            data: SessionData::new(),
            expiry: SessionExpiry::Default,
            created_at: now,
            modified_at: now,
            expire_date,
        }
    }

    #[must_use]
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expire_date <= now
    }
}

/// Keyed persistence for session records
///
/// Implementations are shared by all concurrent requests. `save` replaces the
/// whole record, so concurrent writers to one key resolve as last writer wins.
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Fetch a live record; expired or missing entries both yield `None`
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>, SessionError>;

    /// Insert or overwrite the record for `key`
    async fn save(&self, key: &SessionKey, record: &SessionRecord) -> Result<(), SessionError>;

    /// Insert only if `key` is unused; `Ok(false)` signals a collision
    async fn create(&self, key: &SessionKey, record: &SessionRecord)
        -> Result<bool, SessionError>;

    /// Remove the record for `key`; missing keys are not an error
    async fn delete(&self, key: &SessionKey) -> Result<(), SessionError>;

    /// Whether any entry, live or expired, occupies `key`
    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionError>;

    /// Remove all expired entries and report how many went away
    async fn clear_expired(&self) -> Result<usize, SessionError>;

    /// Short backend name for logs
    fn backend_name(&self) -> &'static str;
}

/// Store `record` under a freshly drawn key that no other session uses
///
/// Keys already present are redrawn; the store's `create` closes the race
/// between the existence check and the insert.
///
/// # Errors
///
/// Propagates backend errors, and returns `BackendUnavailable` if no free key
/// was found within [`MAX_KEY_ATTEMPTS`] draws.
pub async fn allocate_key(
    store: &dyn SessionStore,
    record: &SessionRecord,
) -> Result<SessionKey, SessionError> {
    for _ in 0..MAX_KEY_ATTEMPTS {
        let key = SessionKey::generate();
        if store.exists(&key).await? {
            debug!("Session key collision in {} store, redrawing", store.backend_name());
            continue;
        }
        if store.create(&key, record).await? {
            return Ok(key);
        }
        debug!("Session key taken concurrently in {} store, redrawing", store.backend_name());
    }
    Err(SessionError::BackendUnavailable(format!(
        "no free session key after {MAX_KEY_ATTEMPTS} attempts"
    )))
}

/// Build the store selected by `settings.backend`
///
/// # Errors
///
/// Returns an error if the file backend directory cannot be prepared.
pub fn build_store(settings: &SessionSettings) -> Result<Arc<dyn SessionStore>, SessionError> {
    let timeout = StdDuration::from_millis(settings.backend_timeout_ms);
    let store: Arc<dyn SessionStore> = match settings.backend {
        BackendKind::Memory => Arc::new(MemoryStore::new()),
        BackendKind::File => Arc::new(FileStore::new(&settings.file_path, timeout)?),
        BackendKind::CachedFile => Arc::new(CachedStore::new(Arc::new(FileStore::new(
            &settings.file_path,
            timeout,
        )?))),
    };
    info!("Session store initialised: {}", store.backend_name());
    Ok(store)
}

/// Periodically sweep expired sessions until the task is dropped
pub async fn run_sweeper(store: Arc<dyn SessionStore>, interval: StdDuration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately
    ticker.tick().await;
    loop {
        ticker.tick().await;
        match store.clear_expired().await {
            Ok(0) => debug!("Session sweep found nothing to remove"),
            Ok(removed) => info!("Session sweep removed {removed} expired sessions"),
            Err(e) => error!("Session sweep failed: {e}"),
        }
    }
}
