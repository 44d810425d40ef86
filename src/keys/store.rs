//! Storage backends for the key record.

use async_trait::async_trait;
use fs2::FileExt;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::record::KeyRecord;
use crate::error::{BulwarkError, Result};

/// Exclusive hold on a [`KeyStore`], released when dropped.
#[derive(Debug, Default)]
pub struct StoreLock {
    _file: Option<File>,
}

impl StoreLock {
    /// A lock that holds nothing, for stores no other process can reach.
    pub fn unshared() -> Self {
        Self::default()
    }
}

/// Durable home of the single [`KeyRecord`].
///
/// `save` must replace the stored record as a whole: after a failed save the
/// previously stored record is still the one `load` returns.
#[async_trait]
pub trait KeyStore: Send + Sync {
    /// Read the record, `None` if it has never been written.
    async fn load(&self) -> Result<Option<KeyRecord>>;

    /// Replace the stored record.
    async fn save(&self, record: &KeyRecord) -> Result<()>;

    /// Wait until no other holder, in this process or another one, can run a
    /// load-then-save cycle against the same record.
    async fn lock(&self) -> Result<StoreLock> {
        Ok(StoreLock::unshared())
    }
}

/// JSON file store. Writes go to a sibling temp file that is renamed into place.
///
/// [`KeyStore::lock`] takes an advisory lock on a sibling `.lock` file, so
/// every process pointed at the same path serializes its rotations.
pub struct FileKeyStore {
    path: PathBuf,
}

impl FileKeyStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        self.sibling(&format!(".{}.tmp", std::process::id()))
    }

    fn lock_path(&self) -> PathBuf {
        self.sibling(".lock")
    }

    fn sibling(&self, suffix: &str) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(suffix);
        self.path.with_file_name(name)
    }

    async fn create_parent(&self) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                BulwarkError::persistence(format!("creating {}: {}", parent.display(), e))
            })?;
        }
        Ok(())
    }
}

#[async_trait]
impl KeyStore for FileKeyStore {
    async fn load(&self) -> Result<Option<KeyRecord>> {
        let bytes = match tokio::fs::read(&self.path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BulwarkError::persistence(format!(
                    "reading {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        let record: KeyRecord = serde_json::from_slice(&bytes).map_err(|e| {
            BulwarkError::persistence(format!("parsing {}: {}", self.path.display(), e))
        })?;
        if record.current.is_empty() || record.previous.as_deref() == Some("") {
            return Err(BulwarkError::persistence(format!(
                "{} holds an empty secret",
                self.path.display()
            )));
        }
        Ok(Some(record))
    }

    async fn save(&self, record: &KeyRecord) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(record)?;
        let tmp = self.temp_path();

        self.create_parent().await?;

        tokio::fs::write(&tmp, &bytes).await.map_err(|e| {
            BulwarkError::persistence(format!("writing {}: {}", tmp.display(), e))
        })?;
        if let Err(e) = tokio::fs::rename(&tmp, &self.path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BulwarkError::persistence(format!(
                "replacing {}: {}",
                self.path.display(),
                e
            )));
        }

        trace!(path = %self.path.display(), "Key record written");
        Ok(())
    }

    async fn lock(&self) -> Result<StoreLock> {
        self.create_parent().await?;
        let path = self.lock_path();

        let locked = {
            let lock_path = path.clone();
            tokio::task::spawn_blocking(move || -> std::io::Result<File> {
                let file = OpenOptions::new()
                    .create(true)
                    .truncate(false)
                    .write(true)
                    .open(&lock_path)?;
                file.lock_exclusive()?;
                Ok(file)
            })
            .await
            .map_err(|e| BulwarkError::persistence(format!("locking {}: {}", path.display(), e)))?
        };
        let file = locked
            .map_err(|e| BulwarkError::persistence(format!("locking {}: {}", path.display(), e)))?;

        debug!(path = %path.display(), "Key store locked");
        Ok(StoreLock { _file: Some(file) })
    }
}

/// In-process store, used when keys need not survive a restart and in tests.
#[derive(Default)]
pub struct MemoryKeyStore {
    record: Mutex<Option<KeyRecord>>,
}

impl MemoryKeyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyStore for MemoryKeyStore {
    async fn load(&self) -> Result<Option<KeyRecord>> {
        Ok(self.record.lock().clone())
    }

    async fn save(&self, record: &KeyRecord) -> Result<()> {
        *self.record.lock() = Some(record.clone());
        Ok(())
    }
}
