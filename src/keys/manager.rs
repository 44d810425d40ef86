//! Time-based API key rotation.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info};

use super::record::KeyRecord;
use super::store::KeyStore;
use crate::error::Result;

/// Default minimum time between rotations.
pub const DEFAULT_ROTATION_INTERVAL_DAYS: i64 = 7;

/// Result of a rotation check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RotationOutcome {
    /// Whether a new secret was generated
    pub rotated: bool,
    /// Last rotation time after the check
    pub last_rotated: DateTime<Utc>,
}

/// Owns the current/previous secret pair.
///
/// Every read-decide-write of the record, including creation on first access,
/// runs under this manager's lock and the store's own [`KeyStore::lock`], so
/// racing callers never both generate a secret, even from separate processes
/// sharing one key file. The store remains the source of truth; nothing is
/// cached between calls.
pub struct KeyRotationManager {
    store: Arc<dyn KeyStore>,
    interval: Duration,
    lock: Mutex<()>,
}

impl KeyRotationManager {
    pub fn new(store: Arc<dyn KeyStore>) -> Self {
        Self::with_interval(store, Duration::days(DEFAULT_ROTATION_INTERVAL_DAYS))
    }

    pub fn with_interval(store: Arc<dyn KeyStore>, interval: Duration) -> Self {
        Self {
            store,
            interval,
            lock: Mutex::new(()),
        }
    }

    /// Rotate the secret if more than the rotation interval has passed since the last rotation.
    ///
    /// Manual and scheduled triggers both go through here; there is no way to
    /// rotate early. A failed write leaves the stored record untouched.
    pub async fn rotate_if_due(&self, now: DateTime<Utc>) -> Result<RotationOutcome> {
        let _guard = self.lock.lock().await;
        let _store_lock = self.store.lock().await?;
        let record = self.load_or_init(now).await?;

        let elapsed = now - record.last_rotated;
        if elapsed <= self.interval {
            debug!(
                elapsed_secs = elapsed.num_seconds(),
                interval_secs = self.interval.num_seconds(),
                "Key rotation not due"
            );
            return Ok(RotationOutcome {
                rotated: false,
                last_rotated: record.last_rotated,
            });
        }

        let next = record.rotated(now);
        if let Err(e) = self.store.save(&next).await {
            error!(error = %e, "Failed to persist rotated key, keeping previous record");
            return Err(e);
        }

        info!(
            previous_rotation = %record.last_rotated,
            last_rotated = %next.last_rotated,
            "API key rotated"
        );
        Ok(RotationOutcome {
            rotated: true,
            last_rotated: next.last_rotated,
        })
    }

    /// Snapshot of the record, creating it if it does not exist yet.
    pub async fn current_record(&self, now: DateTime<Utc>) -> Result<KeyRecord> {
        let _guard = self.lock.lock().await;
        let _store_lock = self.store.lock().await?;
        self.load_or_init(now).await
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Caller must hold `self.lock` and the store lock.
    async fn load_or_init(&self, now: DateTime<Utc>) -> Result<KeyRecord> {
        if let Some(record) = self.store.load().await? {
            return Ok(record);
        }

        let record = KeyRecord::generate(now);
        self.store.save(&record).await?;
        info!(last_rotated = %record.last_rotated, "Created initial API key record");
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BulwarkError;
    use crate::keys::store::{FileKeyStore, MemoryKeyStore};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio_test::{assert_err, assert_ok};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-05-01T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Memory store that counts writes and can be told to fail them.
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryKeyStore,
        saves: AtomicUsize,
        fail_saves: AtomicBool,
    }

    #[async_trait]
    impl KeyStore for FlakyStore {
        async fn load(&self) -> Result<Option<KeyRecord>> {
            self.inner.load().await
        }

        async fn save(&self, record: &KeyRecord) -> Result<()> {
            if self.fail_saves.load(Ordering::SeqCst) {
                return Err(BulwarkError::persistence("disk full"));
            }
            // Widen the race window for the concurrency test.
            tokio::task::yield_now().await;
            self.saves.fetch_add(1, Ordering::SeqCst);
            self.inner.save(record).await
        }
    }

    #[tokio::test]
    async fn test_first_access_creates_record() {
        let store = Arc::new(MemoryKeyStore::new());
        let manager = KeyRotationManager::new(store.clone());

        let outcome = manager.rotate_if_due(t0()).await.unwrap();

        assert!(!outcome.rotated);
        assert_eq!(outcome.last_rotated, t0());
        let record = store.load().await.unwrap().unwrap();
        assert!(record.previous.is_none());
        assert_eq!(record.current.len(), 64);
    }

    #[tokio::test]
    async fn test_rotation_not_due_at_exact_interval() {
        let manager = KeyRotationManager::new(Arc::new(MemoryKeyStore::new()));
        manager.rotate_if_due(t0()).await.unwrap();

        let outcome = manager.rotate_if_due(t0() + Duration::days(7)).await.unwrap();
        assert!(!outcome.rotated);
    }

    #[tokio::test]
    async fn test_rotation_history() {
        let store = Arc::new(MemoryKeyStore::new());
        let manager = KeyRotationManager::new(store.clone());
        let mut now = t0();
        let mut before = manager.current_record(now).await.unwrap();

        for _ in 0..3 {
            now += Duration::days(8);
            let outcome = manager.rotate_if_due(now).await.unwrap();
            assert!(outcome.rotated);
            assert_eq!(outcome.last_rotated, now);

            let after = store.load().await.unwrap().unwrap();
            assert_eq!(after.previous.as_deref(), Some(before.current.as_str()));
            assert_ne!(after.current, before.current);
            assert_ne!(Some(after.current.as_str()), before.previous.as_deref());
            assert_eq!(after.last_rotated, now);
            before = after;
        }
    }

    #[tokio::test]
    async fn test_second_call_within_interval_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("api_keys.json");
        let manager = KeyRotationManager::new(Arc::new(FileKeyStore::new(&path)));

        manager.rotate_if_due(t0()).await.unwrap();
        let rotated = manager.rotate_if_due(t0() + Duration::days(8)).await.unwrap();
        assert!(rotated.rotated);
        let after_first = std::fs::read(&path).unwrap();

        let again = manager
            .rotate_if_due(t0() + Duration::days(8) + Duration::hours(1))
            .await
            .unwrap();
        assert!(!again.rotated);
        assert_eq!(std::fs::read(&path).unwrap(), after_first);
    }

    #[tokio::test]
    async fn test_failed_write_leaves_record_unchanged() {
        let store = Arc::new(FlakyStore::default());
        let manager = KeyRotationManager::new(store.clone());
        let original = manager.current_record(t0()).await.unwrap();

        store.fail_saves.store(true, Ordering::SeqCst);
        let result = manager.rotate_if_due(t0() + Duration::days(30)).await;
        assert!(matches!(assert_err!(result), BulwarkError::Persistence(_)));
        assert_eq!(store.load().await.unwrap(), Some(original.clone()));

        store.fail_saves.store(false, Ordering::SeqCst);
        let outcome = assert_ok!(manager.rotate_if_due(t0() + Duration::days(30)).await);
        assert!(outcome.rotated);
        let record = store.load().await.unwrap().unwrap();
        assert_eq!(record.previous, Some(original.current));
    }

    #[tokio::test]
    async fn test_failed_initial_write_creates_nothing() {
        let store = Arc::new(FlakyStore::default());
        store.fail_saves.store(true, Ordering::SeqCst);
        let manager = KeyRotationManager::new(store.clone());

        assert_err!(manager.rotate_if_due(t0()).await);
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_first_access_creates_one_record() {
        let store = Arc::new(FlakyStore::default());
        let manager = Arc::new(KeyRotationManager::new(store.clone()));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.current_record(t0()).await.unwrap() })
            })
            .collect();
        let records: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap())
            .collect();

        assert_eq!(store.saves.load(Ordering::SeqCst), 1);
        assert!(records.windows(2).all(|w| w[0] == w[1]));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_rotation_rotates_once() {
        let store = Arc::new(FlakyStore::default());
        let manager = Arc::new(KeyRotationManager::new(store.clone()));
        let original = manager.current_record(t0()).await.unwrap();
        let due = t0() + Duration::days(10);

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.rotate_if_due(due).await.unwrap().rotated })
            })
            .collect();
        let rotations = futures::future::join_all(tasks)
            .await
            .into_iter()
            .filter(|r| *r.as_ref().unwrap())
            .count();

        assert_eq!(rotations, 1);
        let record = store.load().await.unwrap().unwrap();
        assert_eq!(record.previous, Some(original.current));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_managers_sharing_a_key_file_rotate_once() {
        for _ in 0..20 {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("api_keys.json");
            let managers: Vec<_> = (0..2)
                .map(|_| Arc::new(KeyRotationManager::new(Arc::new(FileKeyStore::new(&path)))))
                .collect();
            let original = managers[0].current_record(t0()).await.unwrap();
            let due = t0() + Duration::days(8);

            let tasks: Vec<_> = managers
                .iter()
                .cloned()
                .map(|manager| tokio::spawn(async move { manager.rotate_if_due(due).await }))
                .collect();
            let rotations = futures::future::join_all(tasks)
                .await
                .into_iter()
                .filter(|r| assert_ok!(r.as_ref().unwrap()).rotated)
                .count();

            assert_eq!(rotations, 1);
            let stored = FileKeyStore::new(&path).load().await.unwrap().unwrap();
            assert_eq!(stored.previous, Some(original.current));
            assert_eq!(stored.last_rotated, due);
        }
    }
}
