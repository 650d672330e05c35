use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use uuid::Uuid;

use super::{SessionRecord, SessionStore};
use crate::session::errors::SessionError;
use crate::session::key::SessionKey;

const FILE_PREFIX: &str = "satchel-";
const FILE_SUFFIX: &str = ".json";
const TEMP_SUFFIX: &str = ".tmp";
const STALE_SUFFIX: &str = ".stale";

/// Minimum age before the sweeper treats a leftover scratch file as orphaned
const ORPHAN_GRACE: Duration = Duration::from_secs(60);

/// Durable store keeping one JSON file per session
///
/// Writes go to a uniquely named temporary file first and are then moved into
/// place, so readers only ever see complete records. New sessions are linked
/// into place with `hard_link`, which fails instead of overwriting when the
/// key is already taken. Every operation is bounded by `timeout`.
///
/// Expired files are only removed by [`SessionStore::clear_expired`], never
/// by `load`. The sweeper first moves a file aside and re-checks it there, so
/// a record saved concurrently under the same key is put back instead of
/// deleted.
///
/// A timed-out operation reports `BackendUnavailable`, but the filesystem
/// work already handed to the blocking pool keeps running and may still
/// commit. Scratch files it leaves behind are removed by the sweeper once
/// they are older than both the timeout and one minute.
#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
    timeout: Duration,
}

impl FileStore {
    /// Open (creating if needed) a session directory
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the directory cannot be created.
    pub fn new(dir: impl AsRef<Path>, timeout: Duration) -> Result<Self, SessionError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)
            .map_err(|e| SessionError::backend(&format!("create {}", dir.display()), e))?;
        Ok(Self { dir, timeout })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.dir.join(format!("{FILE_PREFIX}{key}{FILE_SUFFIX}"))
    }

    async fn bounded<T, F>(&self, operation: &str, future: F) -> Result<T, SessionError>
    where
        F: Future<Output = Result<T, SessionError>> + Send,
    {
        tokio::time::timeout(self.timeout, future)
            .await
            .map_err(|_| {
                SessionError::BackendUnavailable(format!(
                    "file store {operation} timed out after {}ms",
                    self.timeout.as_millis()
                ))
            })?
    }

    async fn write_temp(&self, record: &SessionRecord) -> Result<PathBuf, SessionError> {
        let contents = serde_json::to_vec(record)?;
        let temp = self
            .dir
            .join(format!(".{FILE_PREFIX}{}{TEMP_SUFFIX}", Uuid::new_v4().simple()));
        tokio::fs::write(&temp, contents)
            .await
            .map_err(|e| SessionError::backend("write session file", e))?;
        Ok(temp)
    }

    async fn read_record(path: &Path) -> Result<Option<SessionRecord>, SessionError> {
        let bytes = match tokio::fs::read(path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(SessionError::backend("read session file", e)),
        };
        match serde_json::from_slice(&bytes) {
            Ok(record) => Ok(Some(record)),
            Err(e) => {
                warn!("Ignoring unreadable session file {}: {e}", path.display());
                Ok(None)
            }
        }
    }

    fn is_scratch_file(name: &str) -> bool {
        name.starts_with(&format!(".{FILE_PREFIX}"))
            && (name.ends_with(TEMP_SUFFIX) || name.ends_with(STALE_SUFFIX))
    }

    /// Delete `path` if it is still expired, without losing a concurrent save
    async fn sweep_file(&self, path: &Path, now: DateTime<Utc>) -> Result<bool, SessionError> {
        let stale = self
            .dir
            .join(format!(".{FILE_PREFIX}{}{STALE_SUFFIX}", Uuid::new_v4().simple()));
        match tokio::fs::rename(path, &stale).await {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(SessionError::backend("move stale session file", e)),
        }

        let still_expired = Self::read_record(&stale)
            .await?
            .is_some_and(|record| record.is_expired_at(now));
        if !still_expired {
            // A save replaced the file between the first read and the move
            match tokio::fs::hard_link(&stale, path).await {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Newer session written to {} during sweep", path.display());
                }
                Err(e) => {
                    warn!("Could not restore {} after sweep: {e}", path.display());
                    return Ok(false);
                }
            }
        }
        Self::remove_quietly(&stale).await;
        Ok(still_expired)
    }

    async fn remove_orphan(&self, path: &Path) {
        let grace = self.timeout.max(ORPHAN_GRACE);
        let Ok(metadata) = tokio::fs::metadata(path).await else {
            return;
        };
        let orphaned = metadata
            .modified()
            .ok()
            .and_then(|modified| SystemTime::now().duration_since(modified).ok())
            .is_some_and(|age| age >= grace);
        if orphaned {
            debug!("Removing orphaned scratch file {}", path.display());
            Self::remove_quietly(path).await;
        }
    }

    async fn remove_quietly(path: &Path) {
        if let Err(e) = tokio::fs::remove_file(path).await {
            if e.kind() != ErrorKind::NotFound {
                debug!("Could not remove {}: {e}", path.display());
            }
        }
    }
}

#[async_trait]
impl SessionStore for FileStore {
    async fn load(&self, key: &SessionKey) -> Result<Option<SessionRecord>, SessionError> {
        let path = self.path_for(key);
        let record = self.bounded("load", Self::read_record(&path)).await?;
        Ok(record.filter(|record| !record.is_expired_at(Utc::now())))
    }

    async fn save(&self, key: &SessionKey, record: &SessionRecord) -> Result<(), SessionError> {
        let path = self.path_for(key);
        self.bounded("save", async {
            let temp = self.write_temp(record).await?;
            if let Err(e) = tokio::fs::rename(&temp, &path).await {
                Self::remove_quietly(&temp).await;
                return Err(SessionError::backend("replace session file", e));
            }
            Ok(())
        })
        .await
    }

    async fn create(
        &self,
        key: &SessionKey,
        record: &SessionRecord,
    ) -> Result<bool, SessionError> {
        let path = self.path_for(key);
        self.bounded("create", async {
            let temp = self.write_temp(record).await?;
            let linked = tokio::fs::hard_link(&temp, &path).await;
            Self::remove_quietly(&temp).await;
            match linked {
                Ok(()) => Ok(true),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
                Err(e) => Err(SessionError::backend("create session file", e)),
            }
        })
        .await
    }

    async fn delete(&self, key: &SessionKey) -> Result<(), SessionError> {
        let path = self.path_for(key);
        self.bounded("delete", async {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
                Err(e) => Err(SessionError::backend("delete session file", e)),
            }
        })
        .await
    }

    async fn exists(&self, key: &SessionKey) -> Result<bool, SessionError> {
        let path = self.path_for(key);
        self.bounded("exists", async {
            tokio::fs::try_exists(&path)
                .await
                .map_err(|e| SessionError::backend("stat session file", e))
        })
        .await
    }

    async fn clear_expired(&self) -> Result<usize, SessionError> {
        let mut entries = tokio::fs::read_dir(&self.dir)
            .await
            .map_err(|e| SessionError::backend("list session directory", e))?;
        let now = Utc::now();
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| SessionError::backend("list session directory", e))?
        {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            let path = entry.path();
            if Self::is_scratch_file(name) {
                self.remove_orphan(&path).await;
                continue;
            }
            if !(name.starts_with(FILE_PREFIX) && name.ends_with(FILE_SUFFIX)) {
                continue;
            }
            let record = self.bounded("sweep", Self::read_record(&path)).await?;
            if record.is_some_and(|record| record.is_expired_at(now))
                && self.bounded("sweep", self.sweep_file(&path, now)).await?
            {
                removed += 1;
            }
        }

        Ok(removed)
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;
    use serde_json::json;
    use tempfile::TempDir;

    fn store() -> (TempDir, FileStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), Duration::from_secs(5)).unwrap();
        (dir, store)
    }

    fn live_record() -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(now, now + ChronoDuration::hours(1))
    }

    fn expired_record() -> SessionRecord {
        let now = Utc::now();
        SessionRecord::new(now - ChronoDuration::hours(2), now - ChronoDuration::minutes(1))
    }

    fn session_files(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect()
    }

    #[actix_web::test]
    async fn test_save_load_round_trip() {
        let (_dir, store) = store();
        let key = SessionKey::generate();
        let mut record = live_record();
        record.data.insert("username".into(), json!("JohnDoe"));

        store.save(&key, &record).await.unwrap();
        assert_eq!(store.load(&key).await.unwrap(), Some(record));
    }

    #[actix_web::test]
    async fn test_save_leaves_no_temp_files() {
        let (dir, store) = store();
        let key = SessionKey::generate();
        store.save(&key, &live_record()).await.unwrap();
        store.save(&key, &live_record()).await.unwrap();
        assert!(store.create(&SessionKey::generate(), &live_record()).await.unwrap());

        let files = session_files(dir.path());
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.starts_with(FILE_PREFIX) && f.ends_with(FILE_SUFFIX)));
    }

    #[actix_web::test]
    async fn test_create_does_not_overwrite() {
        let (_dir, store) = store();
        let key = SessionKey::generate();
        let mut first = live_record();
        first.data.insert("owner".into(), json!("first"));

        assert!(store.create(&key, &first).await.unwrap());
        assert!(!store.create(&key, &live_record()).await.unwrap());
        assert_eq!(store.load(&key).await.unwrap(), Some(first));
    }

    #[actix_web::test]
    async fn test_expired_file_is_absent_until_swept() {
        let (dir, store) = store();
        let key = SessionKey::generate();
        store.save(&key, &expired_record()).await.unwrap();

        assert_eq!(store.load(&key).await.unwrap(), None);
        assert!(store.exists(&key).await.unwrap());

        assert_eq!(store.clear_expired().await.unwrap(), 1);
        assert!(!store.exists(&key).await.unwrap());
        assert!(session_files(dir.path()).is_empty());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_load_racing_save_never_loses_the_save() {
        let (_dir, store) = store();
        for round in 0..200 {
            let key = SessionKey::generate();
            store.save(&key, &expired_record()).await.unwrap();
            let mut fresh = live_record();
            fresh.data.insert("round".into(), json!(round));

            let reader = tokio::spawn({
                let store = store.clone();
                let key = key.clone();
                async move { store.load(&key).await }
            });
            let writer = tokio::spawn({
                let store = store.clone();
                let key = key.clone();
                let fresh = fresh.clone();
                async move { store.save(&key, &fresh).await }
            });
            reader.await.unwrap().unwrap();
            writer.await.unwrap().unwrap();

            assert_eq!(store.load(&key).await.unwrap(), Some(fresh), "round {round}");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_sweep_racing_save_never_loses_the_save() {
        let (_dir, store) = store();
        for round in 0..200 {
            let key = SessionKey::generate();
            store.save(&key, &expired_record()).await.unwrap();
            let mut fresh = live_record();
            fresh.data.insert("round".into(), json!(round));

            let sweeper = tokio::spawn({
                let store = store.clone();
                async move { store.clear_expired().await }
            });
            let writer = tokio::spawn({
                let store = store.clone();
                let key = key.clone();
                let fresh = fresh.clone();
                async move { store.save(&key, &fresh).await }
            });
            sweeper.await.unwrap().unwrap();
            writer.await.unwrap().unwrap();

            assert_eq!(store.load(&key).await.unwrap(), Some(fresh), "round {round}");
        }
    }

    #[actix_web::test]
    async fn test_stalled_operation_times_out_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path(), Duration::from_millis(20)).unwrap();

        let result = store
            .bounded("load", std::future::pending::<Result<(), SessionError>>())
            .await;
        match result {
            Err(SessionError::BackendUnavailable(message)) => {
                assert!(message.contains("timed out after 20ms"), "{message}");
            }
            other => panic!("expected BackendUnavailable, got {other:?}"),
        }
    }

    #[actix_web::test]
    async fn test_sweep_removes_orphaned_scratch_files() {
        let (dir, store) = store();
        let old = dir.path().join(format!(".{FILE_PREFIX}abandoned{TEMP_SUFFIX}"));
        let recent = dir.path().join(format!(".{FILE_PREFIX}inflight{TEMP_SUFFIX}"));
        std::fs::write(&old, b"{}").unwrap();
        std::fs::write(&recent, b"{}").unwrap();
        std::fs::File::options()
            .write(true)
            .open(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(3600))
            .unwrap();

        assert_eq!(store.clear_expired().await.unwrap(), 0);
        assert!(!old.exists());
        assert!(recent.exists());
    }

    #[actix_web::test]
    async fn test_delete_and_exists() {
        let (_dir, store) = store();
        let key = SessionKey::generate();
        assert!(!store.exists(&key).await.unwrap());

        store.save(&key, &live_record()).await.unwrap();
        assert!(store.exists(&key).await.unwrap());

        store.delete(&key).await.unwrap();
        store.delete(&key).await.unwrap();
        assert!(!store.exists(&key).await.unwrap());
    }

    #[actix_web::test]
    async fn test_corrupt_file_reads_as_absent() {
        let (_dir, store) = store();
        let key = SessionKey::generate();
        std::fs::write(store.path_for(&key), b"{not json").unwrap();

        assert_eq!(store.load(&key).await.unwrap(), None);
    }

    #[actix_web::test]
    async fn test_last_writer_wins() {
        let (_dir, store) = store();
        let key = SessionKey::generate();
        let mut a = live_record();
        a.data.insert("a".into(), json!(1));
        let mut b = live_record();
        b.data.insert("b".into(), json!(2));

        store.save(&key, &a).await.unwrap();
        store.save(&key, &b).await.unwrap();

        let loaded = store.load(&key).await.unwrap().unwrap();
        assert_eq!(loaded.data, b.data);
    }

    #[actix_web::test]
    async fn test_clear_expired_skips_foreign_files() {
        let (dir, store) = store();
        store.save(&SessionKey::generate(), &expired_record()).await.unwrap();
        let live = SessionKey::generate();
        store.save(&live, &live_record()).await.unwrap();
        std::fs::write(dir.path().join("unrelated.txt"), b"keep me").unwrap();

        assert_eq!(store.clear_expired().await.unwrap(), 1);
        assert!(store.exists(&live).await.unwrap());
        assert!(dir.path().join("unrelated.txt").exists());
    }

    #[test]
    fn test_unusable_directory_is_backend_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("file");
        std::fs::write(&blocker, b"").unwrap();

        let result = FileStore::new(blocker.join("sessions"), Duration::from_secs(1));
        assert!(matches!(result, Err(SessionError::BackendUnavailable(_))));
    }
}
