//! Storage backends for user records.

use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::Value;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{debug, trace};

use super::record::is_valid_user_id;
use crate::error::{BulwarkError, Result};

/// Flat key-value store of user documents keyed by user id.
///
/// Reads and writes are whole-document: `get` never observes a partially
/// written or partially deleted document.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Ids of every stored document.
    async fn list_ids(&self) -> Result<Vec<String>>;

    /// The stored document, `None` if there is none.
    async fn get(&self, user_id: &str) -> Result<Option<Value>>;

    /// Store or replace a document.
    async fn put(&self, user_id: &str, document: &Value) -> Result<()>;

    /// Remove a document. Returns `false` if it was already gone.
    async fn delete(&self, user_id: &str) -> Result<bool>;
}

/// A directory holding one `<user_id>.json` file per user.
pub struct FileRecordStore {
    dir: PathBuf,
}

impl FileRecordStore {
    pub fn new<P: AsRef<Path>>(dir: P) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, user_id: &str) -> Option<PathBuf> {
        is_valid_user_id(user_id).then(|| self.dir.join(format!("{user_id}.json")))
    }
}

#[async_trait]
impl RecordStore for FileRecordStore {
    async fn list_ids(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(BulwarkError::persistence(format!(
                    "listing {}: {}",
                    self.dir.display(),
                    e
                )))
            }
        };

        let mut ids = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|ext| ext.to_str()) != Some("json") {
                continue;
            }
            match path.file_stem().and_then(|stem| stem.to_str()) {
                Some(id) if is_valid_user_id(id) => ids.push(id.to_string()),
                _ => debug!(path = %path.display(), "Skipping file that does not name a user record"),
            }
        }
        ids.sort();
        Ok(ids)
    }

    async fn get(&self, user_id: &str) -> Result<Option<Value>> {
        let Some(path) = self.path_for(user_id) else {
            return Ok(None);
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(BulwarkError::persistence(format!(
                    "reading {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| BulwarkError::persistence(format!("parsing {}: {}", path.display(), e)))
    }

    async fn put(&self, user_id: &str, document: &Value) -> Result<()> {
        let path = self.path_for(user_id).ok_or_else(|| {
            BulwarkError::persistence(format!("invalid user id {user_id:?}"))
        })?;
        // Hidden temp name so a concurrent list_ids never picks it up.
        let tmp = self.dir.join(format!(".{user_id}.json.tmp"));
        let bytes = serde_json::to_vec_pretty(document)?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            BulwarkError::persistence(format!("creating {}: {}", self.dir.display(), e))
        })?;
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| BulwarkError::persistence(format!("writing {}: {}", tmp.display(), e)))?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(BulwarkError::persistence(format!(
                "replacing {}: {}",
                path.display(),
                e
            )));
        }
        trace!(user_id, "User record written");
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        let Some(path) = self.path_for(user_id) else {
            return Ok(false);
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(BulwarkError::persistence(format!(
                "deleting {}: {}",
                path.display(),
                e
            ))),
        }
    }
}

/// In-process record store.
#[derive(Default)]
pub struct MemoryRecordStore {
    documents: RwLock<BTreeMap<String, Value>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn list_ids(&self) -> Result<Vec<String>> {
        Ok(self.documents.read().keys().cloned().collect())
    }

    async fn get(&self, user_id: &str) -> Result<Option<Value>> {
        Ok(self.documents.read().get(user_id).cloned())
    }

    async fn put(&self, user_id: &str, document: &Value) -> Result<()> {
        self.documents
            .write()
            .insert(user_id.to_string(), document.clone());
        Ok(())
    }

    async fn delete(&self, user_id: &str) -> Result<bool> {
        Ok(self.documents.write().remove(user_id).is_some())
    }
}
