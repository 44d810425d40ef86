//! Retention sweep and export.

use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info, warn};

use super::record::UserRecord;
use super::store::RecordStore;
use crate::error::{BulwarkError, Result};

/// Default maximum age of a user record.
pub const DEFAULT_MAX_AGE_DAYS: i64 = 30;

/// Summary of one retention sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeReport {
    /// Records examined
    pub scanned: usize,
    /// Records deleted for exceeding the maximum age
    pub deleted: usize,
    /// Records that could not be checked or deleted
    pub failed: usize,
}

/// Enforces the retention window over stored user records.
pub struct RetentionManager {
    store: Arc<dyn RecordStore>,
    max_age: Duration,
}

impl RetentionManager {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self::with_max_age(store, Duration::days(DEFAULT_MAX_AGE_DAYS))
    }

    pub fn with_max_age(store: Arc<dyn RecordStore>, max_age: Duration) -> Self {
        Self { store, max_age }
    }

    /// Configured maximum age, used when a caller does not supply one.
    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Delete every record older than `max_age` as of `now`.
    ///
    /// A record exactly `max_age` old is kept. Failures are confined to the
    /// record they occur on and the sweep carries on with the rest; only
    /// failing to enumerate the store fails the whole call.
    pub async fn purge_expired(&self, now: DateTime<Utc>, max_age: Duration) -> Result<PurgeReport> {
        let ids = self.store.list_ids().await?;
        let mut report = PurgeReport::default();

        for user_id in ids {
            report.scanned += 1;

            let document = match self.store.get(&user_id).await {
                Ok(Some(document)) => document,
                Ok(None) => {
                    debug!(user_id = %user_id, "Record vanished before it could be checked");
                    continue;
                }
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Could not read record");
                    report.failed += 1;
                    continue;
                }
            };

            let record = match UserRecord::from_document(&user_id, document) {
                Ok(record) => record,
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Skipping record with unusable timestamp");
                    report.failed += 1;
                    continue;
                }
            };

            if now - record.timestamp <= max_age {
                continue;
            }

            match self.store.delete(&user_id).await {
                Ok(true) => {
                    debug!(user_id = %user_id, timestamp = %record.timestamp, "Deleted expired record");
                    report.deleted += 1;
                }
                Ok(false) => {}
                Err(e) => {
                    warn!(user_id = %user_id, error = %e, "Could not delete expired record");
                    report.failed += 1;
                }
            }
        }

        info!(
            scanned = report.scanned,
            deleted = report.deleted,
            failed = report.failed,
            max_age_days = max_age.num_days(),
            "Retention sweep finished"
        );
        Ok(report)
    }

    /// Read-only copy of one user's record.
    pub async fn export(&self, user_id: &str) -> Result<UserRecord> {
        match self.store.get(user_id).await? {
            Some(document) => UserRecord::from_document(user_id, document),
            None => {
                debug!(user_id = %user_id, "Export requested for unknown user");
                Err(BulwarkError::not_found(format!("no data for user {user_id}")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retention::store::{FileRecordStore, MemoryRecordStore};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2024-06-30T00:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    async fn seed(store: &dyn RecordStore, user_id: &str, timestamp: DateTime<Utc>) {
        let record = UserRecord::new(user_id, timestamp, json!({"user": user_id}));
        store.put(user_id, &record.to_document()).await.unwrap();
    }

    #[tokio::test]
    async fn test_purge_boundary() {
        let store = Arc::new(MemoryRecordStore::new());
        let max_age = Duration::days(30);
        seed(store.as_ref(), "at_limit", t0() - max_age).await;
        seed(store.as_ref(), "just_over", t0() - max_age - Duration::seconds(1)).await;
        seed(store.as_ref(), "fresh", t0() - Duration::days(1)).await;

        let manager = RetentionManager::new(store.clone());
        let report = manager.purge_expired(t0(), max_age).await.unwrap();

        assert_eq!(
            report,
            PurgeReport {
                scanned: 3,
                deleted: 1,
                failed: 0
            }
        );
        assert_eq!(store.list_ids().await.unwrap(), vec!["at_limit", "fresh"]);
    }

    #[tokio::test]
    async fn test_purge_continues_past_corrupt_records() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileRecordStore::new(dir.path()));
        seed(store.as_ref(), "a_old", t0() - Duration::days(90)).await;
        store
            .put("b_bad", &json!({"timestamp": "not a date", "payload": {}}))
            .await
            .unwrap();
        std::fs::write(dir.path().join("c_broken.json"), "{ truncated").unwrap();
        store.put("d_none", &json!({"payload": {}})).await.unwrap();
        seed(store.as_ref(), "e_old", t0() - Duration::days(31)).await;

        let manager = RetentionManager::new(store.clone());
        let report = manager
            .purge_expired(t0(), manager.max_age())
            .await
            .unwrap();

        assert_eq!(report.scanned, 5);
        assert_eq!(report.deleted, 2);
        assert_eq!(report.failed, 3);
        assert_eq!(
            store.list_ids().await.unwrap(),
            vec!["b_bad", "c_broken", "d_none"]
        );
    }

    #[tokio::test]
    async fn test_purge_reads_legacy_documents() {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .put("legacy", &json!({"timestamp": "2024-01-01 08:00:00.000001", "name": "x"}))
            .await
            .unwrap();

        let report = RetentionManager::new(store.clone())
            .purge_expired(t0(), Duration::days(30))
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_export_returns_record_without_mutation() {
        let store = Arc::new(MemoryRecordStore::new());
        // Long expired, but export must not trigger retention.
        seed(store.as_ref(), "123", t0() - Duration::days(400)).await;

        let manager = RetentionManager::new(store.clone());
        let record = manager.export("123").await.unwrap();

        assert_eq!(record.user_id, "123");
        assert_eq!(record.payload, json!({"user": "123"}));
        assert_eq!(record.timestamp, t0() - Duration::days(400));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_export_unknown_user_is_not_found() {
        let manager = RetentionManager::new(Arc::new(MemoryRecordStore::new()));
        let err = manager.export("nobody").await.unwrap_err();
        assert!(matches!(err, BulwarkError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_export_invalid_id_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let manager = RetentionManager::new(Arc::new(FileRecordStore::new(dir.path())));
        let err = manager.export("../../etc/passwd").await.unwrap_err();
        assert!(matches!(err, BulwarkError::NotFound(_)));
    }

    /// Store whose listing is stale: it still reports ids that were deleted.
    struct StaleListing {
        inner: MemoryRecordStore,
        listed: Vec<String>,
    }

    #[async_trait]
    impl RecordStore for StaleListing {
        async fn list_ids(&self) -> Result<Vec<String>> {
            Ok(self.listed.clone())
        }
        async fn get(&self, user_id: &str) -> Result<Option<Value>> {
            self.inner.get(user_id).await
        }
        async fn put(&self, user_id: &str, document: &Value) -> Result<()> {
            self.inner.put(user_id, document).await
        }
        async fn delete(&self, user_id: &str) -> Result<bool> {
            self.inner.delete(user_id).await
        }
    }

    #[tokio::test]
    async fn test_purge_skips_records_removed_mid_sweep() {
        let store = StaleListing {
            inner: MemoryRecordStore::new(),
            listed: vec!["gone".to_string(), "old".to_string()],
        };
        seed(&store, "old", t0() - Duration::days(60)).await;

        let report = RetentionManager::new(Arc::new(store))
            .purge_expired(t0(), Duration::days(30))
            .await
            .unwrap();

        assert_eq!(report.deleted, 1);
        assert_eq!(report.failed, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_export_racing_purge_sees_whole_record_or_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(FileRecordStore::new(dir.path()));
        for i in 0..20 {
            seed(store.as_ref(), &format!("user{i}"), t0() - Duration::days(45)).await;
        }
        let manager = Arc::new(RetentionManager::new(store.clone()));

        let sweep = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.purge_expired(t0(), Duration::days(30)).await })
        };
        let exports: Vec<_> = (0..20)
            .map(|i| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.export(&format!("user{i}")).await })
            })
            .collect();

        for result in futures::future::join_all(exports).await {
            match result.unwrap() {
                Ok(record) => assert_eq!(record.timestamp, t0() - Duration::days(45)),
                Err(BulwarkError::NotFound(_)) => {}
                Err(other) => panic!("export returned {other}"),
            }
        }

        let report = sweep.await.unwrap().unwrap();
        assert_eq!(report.deleted, 20);
        assert!(store.list_ids().await.unwrap().is_empty());
    }
}
