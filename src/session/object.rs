use std::collections::hash_map::Entry;
use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;

use crate::session::errors::SessionError;
use crate::session::expiry::{ExpiryPolicy, SessionExpiry};
use crate::session::key::SessionKey;
use crate::store::{allocate_key, SessionRecord, SessionStore};

/// Where a session stands within the current request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No valid cookie came in and nothing has been written yet
    Empty,
    /// Read from the store and not changed since
    Loaded,
    /// Changed in memory and not yet persisted
    Dirty,
    /// Written during this request; a cookie must go out with the response
    Persisted,
}

/// Request-scoped view over one stored session
///
/// Mutations only touch the in-memory copy and set the dirty flag; nothing
/// reaches the store until [`Session::save`], [`Session::flush`] or
/// [`Session::cycle_key`] runs. A `Session` is never shared between requests.
pub struct Session {
    key: Option<SessionKey>,
    record: SessionRecord,
    loaded: bool,
    modified: bool,
    cookie_pending: bool,
    store: Arc<dyn SessionStore>,
    policy: ExpiryPolicy,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("key", &self.key)
            .field("state", &self.state())
            .field("entries", &self.record.data.len())
            .field("backend", &self.store.backend_name())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// A fresh session with no key; a key is allocated on first save
    pub(crate) fn new(store: Arc<dyn SessionStore>, policy: ExpiryPolicy) -> Self {
        let now = Utc::now();
        let plan = policy.resolve(SessionExpiry::Default, now);
        Self {
            key: None,
            record: SessionRecord::new(now, plan.expire_date),
            loaded: false,
            modified: false,
            cookie_pending: false,
            store,
            policy,
        }
    }

    pub(crate) fn loaded(
        key: SessionKey,
        record: SessionRecord,
        store: Arc<dyn SessionStore>,
        policy: ExpiryPolicy,
    ) -> Self {
        Self {
            key: Some(key),
            record,
            loaded: true,
            modified: false,
            cookie_pending: false,
            store,
            policy,
        }
    }

    #[must_use]
    pub fn session_key(&self) -> Option<&SessionKey> {
        self.key.as_ref()
    }

    #[must_use]
    pub fn state(&self) -> SessionState {
        if self.modified {
            SessionState::Dirty
        } else if self.cookie_pending {
            SessionState::Persisted
        } else if self.loaded && self.key.is_some() {
            SessionState::Loaded
        } else {
            SessionState::Empty
        }
    }

    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    /// Whether this session came in without a key and has no data
    #[must_use]
    pub fn is_new_and_empty(&self) -> bool {
        self.key.is_none() && self.record.data.is_empty()
    }

    pub(crate) fn cookie_pending(&self) -> bool {
        self.cookie_pending
    }

    // Mapping interface

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.record.data.get(name)
    }

    /// Fetch and deserialize a value
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Serialization` if the stored value does not fit `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>, SessionError> {
        self.get(name)
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
            .map_err(SessionError::from)
    }

    /// Set a value, returning the one it replaced
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Serialization` if `value` cannot be represented as JSON.
    pub fn insert<T: Serialize>(
        &mut self,
        name: impl Into<String>,
        value: T,
    ) -> Result<Option<Value>, SessionError> {
        let value = serde_json::to_value(value)?;
        self.modified = true;
        Ok(self.record.data.insert(name.into(), value))
    }

    /// Return the existing value for `name`, storing `default` first if there is none
    ///
    /// # Errors
    ///
    /// Returns `SessionError::Serialization` if `default` cannot be represented as JSON.
    pub fn get_or_insert<T: Serialize>(
        &mut self,
        name: &str,
        default: T,
    ) -> Result<&Value, SessionError> {
        match self.record.data.entry(name.to_string()) {
            Entry::Occupied(entry) => Ok(&*entry.into_mut()),
            Entry::Vacant(entry) => {
                let value = serde_json::to_value(default)?;
                self.modified = true;
                Ok(&*entry.insert(value))
            }
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        let removed = self.record.data.remove(name);
        if removed.is_some() {
            self.modified = true;
        }
        removed
    }

    #[must_use]
    pub fn contains_key(&self, name: &str) -> bool {
        self.record.data.contains_key(name)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.record.data.keys().map(String::as_str)
    }

    pub fn items(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.record.data.iter().map(|(k, v)| (k.as_str(), v))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.record.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.record.data.is_empty()
    }

    /// Drop all data but keep the key
    pub fn clear(&mut self) {
        self.record.data.clear();
        self.modified = true;
    }

    // Expiry

    /// Override when this session expires
    ///
    /// # Errors
    ///
    /// Returns `SessionError::InvalidExpiry` for negative ages or absolute
    /// times that are not in the future; the session is left untouched.
    pub fn set_expiry(&mut self, expiry: impl Into<SessionExpiry>) -> Result<(), SessionError> {
        let expiry = self.policy.validate(expiry.into(), Utc::now())?;
        self.record.expiry = expiry;
        self.modified = true;
        Ok(())
    }

    #[must_use]
    pub fn expiry(&self) -> SessionExpiry {
        self.record.expiry
    }

    /// Seconds until the session would expire if it were saved now
    #[must_use]
    pub fn get_expiry_age(&self) -> i64 {
        let now = Utc::now();
        let plan = self.policy.resolve(self.record.expiry, now);
        (plan.expire_date - now).num_seconds()
    }

    /// Absolute expiry if the session were saved now
    #[must_use]
    pub fn get_expiry_date(&self) -> DateTime<Utc> {
        self.policy.resolve(self.record.expiry, Utc::now()).expire_date
    }

    #[must_use]
    pub fn get_expire_at_browser_close(&self) -> bool {
        self.policy.expire_at_browser_close(self.record.expiry)
    }

    /// `Max-Age` for the cookie matching the last save, `None` for browser-session cookies
    #[must_use]
    pub fn cookie_max_age(&self) -> Option<i64> {
        self.policy
            .resolve(self.record.expiry, self.record.modified_at)
            .cookie_max_age
    }

    // Lifecycle

    /// Persist the current data, allocating a key if the session has none
    ///
    /// # Errors
    ///
    /// Propagates store failures; the dirty flag stays set when saving fails.
    pub async fn save(&mut self) -> Result<(), SessionError> {
        let now = Utc::now();
        self.record.modified_at = now;
        self.record.expire_date = self.policy.resolve(self.record.expiry, now).expire_date;

        if let Some(key) = &self.key {
            self.store.save(key, &self.record).await?;
        } else {
            self.record.created_at = now;
            self.key = Some(allocate_key(self.store.as_ref(), &self.record).await?);
        }

        self.modified = false;
        self.cookie_pending = true;
        Ok(())
    }

    /// Log out: delete the stored entry and continue under a new, empty session
    ///
    /// The in-memory data is dropped before the store is touched, so a backend
    /// failure never leaves the old data reachable through this object.
    ///
    /// # Errors
    ///
    /// Propagates store failures.
    pub async fn flush(&mut self) -> Result<(), SessionError> {
        let now = Utc::now();
        let old_key = self.key.take();
        self.record = SessionRecord::new(
            now,
            self.policy.resolve(SessionExpiry::Default, now).expire_date,
        );
        self.modified = false;
        self.cookie_pending = false;

        if let Some(old_key) = old_key {
            self.store.delete(&old_key).await?;
        }
        self.key = Some(allocate_key(self.store.as_ref(), &self.record).await?);
        self.cookie_pending = true;
        Ok(())
    }

    /// Move the current data to a new key and delete the old entry
    ///
    /// # Errors
    ///
    /// Propagates store failures. If the old entry cannot be deleted the
    /// session already points at the new key.
    pub async fn cycle_key(&mut self) -> Result<(), SessionError> {
        let now = Utc::now();
        self.record.modified_at = now;
        self.record.expire_date = self.policy.resolve(self.record.expiry, now).expire_date;

        let new_key = allocate_key(self.store.as_ref(), &self.record).await?;
        let old_key = self.key.replace(new_key);
        self.modified = false;
        self.cookie_pending = true;

        if let Some(old_key) = old_key {
            self.store.delete(&old_key).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use chrono::Duration;
    use serde_json::json;

    const DAY: u64 = 86_400;

    fn session() -> (Arc<MemoryStore>, Session) {
        let store = Arc::new(MemoryStore::new());
        let session = Session::new(store.clone(), ExpiryPolicy::new(DAY, false));
        (store, session)
    }

    #[test]
    fn test_new_session_is_empty() {
        let (_store, session) = session();
        assert_eq!(session.state(), SessionState::Empty);
        assert!(session.session_key().is_none());
        assert!(session.is_new_and_empty());
        assert!(!session.cookie_pending());
    }

    #[test]
    fn test_mapping_operations_track_dirty_flag() {
        let (_store, mut session) = session();

        assert_eq!(session.insert("username", "JohnDoe").unwrap(), None);
        assert_eq!(session.state(), SessionState::Dirty);
        assert!(session.contains_key("username"));
        assert_eq!(session.get("username"), Some(&json!("JohnDoe")));
        assert_eq!(
            session.insert("username", "JaneDoe").unwrap(),
            Some(json!("JohnDoe"))
        );

        session.insert("visits", 3).unwrap();
        let mut keys: Vec<_> = session.keys().collect();
        keys.sort_unstable();
        assert_eq!(keys, ["username", "visits"]);
        assert_eq!(session.items().count(), 2);
        assert_eq!(session.len(), 2);
        assert_eq!(session.get_as::<u32>("visits").unwrap(), Some(3));
        assert!(session.get_as::<u32>("username").is_err());
        assert_eq!(session.get_as::<u32>("missing").unwrap(), None);
    }

    #[test]
    fn test_removing_missing_key_does_not_dirty() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let mut record = SessionRecord::new(now, now + Duration::days(1));
        record.data.insert("a".into(), json!(1));
        let mut session = Session::loaded(
            SessionKey::generate(),
            record,
            store,
            ExpiryPolicy::new(DAY, false),
        );

        assert_eq!(session.remove("missing"), None);
        assert_eq!(session.state(), SessionState::Loaded);
        assert_eq!(session.remove("a"), Some(json!(1)));
        assert_eq!(session.state(), SessionState::Dirty);
    }

    #[test]
    fn test_get_or_insert_keeps_existing_value() {
        let (_store, mut session) = session();
        assert_eq!(session.get_or_insert("theme", "dark").unwrap(), &json!("dark"));
        assert_eq!(session.get_or_insert("theme", "light").unwrap(), &json!("dark"));
    }

    #[actix_web::test]
    async fn test_save_allocates_key_and_persists() {
        let (store, mut session) = session();
        session.insert("username", "JohnDoe").unwrap();
        session.save().await.unwrap();

        assert_eq!(session.state(), SessionState::Persisted);
        let key = session.session_key().unwrap().clone();
        let stored = store.load(&key).await.unwrap().unwrap();
        assert_eq!(stored.data.get("username"), Some(&json!("JohnDoe")));
        assert!(stored.expire_date > Utc::now() + Duration::hours(23));

        // A second save reuses the key
        session.insert("visits", 1).unwrap();
        session.save().await.unwrap();
        assert_eq!(session.session_key(), Some(&key));
        assert_eq!(store.len().unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_clear_keeps_key() {
        let (store, mut session) = session();
        session.insert("a", 1).unwrap();
        session.save().await.unwrap();
        let key = session.session_key().cloned();

        session.clear();
        assert!(session.is_empty());
        assert_eq!(session.state(), SessionState::Dirty);
        session.save().await.unwrap();
        assert_eq!(session.session_key().cloned(), key);

        let stored = store.load(&key.unwrap()).await.unwrap().unwrap();
        assert!(stored.data.is_empty());
    }

    #[actix_web::test]
    async fn test_flush_removes_entry_and_issues_new_key() {
        let (store, mut session) = session();
        session.insert("username", "JohnDoe").unwrap();
        session.set_expiry(SessionExpiry::Age(60)).unwrap();
        session.save().await.unwrap();
        let old_key = session.session_key().unwrap().clone();

        session.flush().await.unwrap();

        assert!(!store.exists(&old_key).await.unwrap());
        assert!(session.is_empty());
        assert_eq!(session.expiry(), SessionExpiry::Default);
        let new_key = session.session_key().unwrap().clone();
        assert_ne!(new_key, old_key);
        let stored = store.load(&new_key).await.unwrap().unwrap();
        assert!(stored.data.is_empty());
        assert!(session.cookie_pending());
    }

    #[actix_web::test]
    async fn test_flush_without_key_still_issues_one() {
        let (store, mut session) = session();
        session.flush().await.unwrap();
        assert!(session.session_key().is_some());
        assert_eq!(store.len().unwrap(), 1);
    }

    #[actix_web::test]
    async fn test_cycle_key_preserves_data() {
        let (store, mut session) = session();
        session.insert("username", "JohnDoe").unwrap();
        session.insert("role", "admin").unwrap();
        session.save().await.unwrap();
        let old_key = session.session_key().unwrap().clone();

        session.cycle_key().await.unwrap();

        let new_key = session.session_key().unwrap().clone();
        assert_ne!(new_key, old_key);
        assert!(!store.exists(&old_key).await.unwrap());
        let stored = store.load(&new_key).await.unwrap().unwrap();
        assert_eq!(stored.data.get("username"), Some(&json!("JohnDoe")));
        assert_eq!(stored.data.get("role"), Some(&json!("admin")));
        assert_eq!(session.state(), SessionState::Persisted);
    }

    #[test]
    fn test_set_expiry_validation() {
        let (_store, mut session) = session();

        let past = Utc::now() - Duration::minutes(5);
        assert!(matches!(
            session.set_expiry(past),
            Err(SessionError::InvalidExpiry(_))
        ));
        assert!(matches!(
            session.set_expiry(SessionExpiry::Age(-1)),
            Err(SessionError::InvalidExpiry(_))
        ));
        assert_eq!(session.state(), SessionState::Empty);
        assert_eq!(session.expiry(), SessionExpiry::Default);
    }

    #[test]
    fn test_expiry_queries() {
        let (_store, mut session) = session();
        let age = session.get_expiry_age();
        assert!((86_399..=86_400).contains(&age));
        assert!(!session.get_expire_at_browser_close());

        session.set_expiry(Duration::minutes(5)).unwrap();
        assert_eq!(session.get_expiry_age(), 300);

        let at = Utc::now() + Duration::hours(2);
        session.set_expiry(at).unwrap();
        assert_eq!(session.get_expiry_date(), at);
        assert_eq!(session.cookie_max_age().map(|s| s > 0), Some(true));

        session.set_expiry(SessionExpiry::from_seconds(Some(0))).unwrap();
        assert!(session.get_expire_at_browser_close());
        assert_eq!(session.cookie_max_age(), None);

        session.set_expiry(SessionExpiry::from_seconds(None)).unwrap();
        assert_eq!(session.cookie_max_age(), Some(86_400));
    }

    #[actix_web::test]
    async fn test_browser_close_store_entry_stays_bounded() {
        let (store, mut session) = session();
        session.set_expiry(SessionExpiry::Age(0)).unwrap();
        session.save().await.unwrap();

        let stored = store
            .load(session.session_key().unwrap())
            .await
            .unwrap()
            .unwrap();
        assert!(stored.expire_date <= Utc::now() + Duration::days(1));
        assert_eq!(stored.expiry, SessionExpiry::BrowserClose);
    }
}
