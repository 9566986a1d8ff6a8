//! Durable key-value storage
//!
//! The log buffer is persisted through a `KvStore` so pending usage records
//! survive process restarts. Stores are not assumed to be transactional
//! across keys.

use crate::error::{FirewallError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::{Mutex, RwLock};

/// Durable local key-value storage
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Values for the requested keys; missing keys are absent from the map
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>>;

    /// Write entries, overwriting existing keys
    async fn set(&self, entries: HashMap<String, Value>) -> Result<()>;
}

/// JSON file-based store
///
/// All keys live in one JSON object. Writes go to a temp file that is then
/// renamed over the original.
pub struct FileKvStore {
    path: PathBuf,
    write_lock: Mutex<()>,
}

impl FileKvStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn read_all(&self) -> Result<HashMap<String, Value>> {
        let json = match tokio::fs::read_to_string(&self.path).await {
            Ok(json) => json,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(HashMap::new()),
            Err(e) => {
                return Err(FirewallError::Storage(format!(
                    "Failed to read store file {}: {}",
                    self.path.display(),
                    e
                )))
            }
        };

        serde_json::from_str(&json).map_err(|e| {
            FirewallError::Storage(format!(
                "Failed to parse store file {}: {}",
                self.path.display(),
                e
            ))
        })
    }
}

#[async_trait]
impl KvStore for FileKvStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let mut all = self.read_all().await?;
        let found: HashMap<String, Value> = keys
            .iter()
            .filter_map(|key| all.remove_entry(*key))
            .collect();

        tracing::debug!(path = %self.path.display(), found = found.len(), "Store read");
        Ok(found)
    }

    async fn set(&self, entries: HashMap<String, Value>) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut all = self.read_all().await?;
        let count = entries.len();
        all.extend(entries);
        let json = serde_json::to_string_pretty(&all)?;

        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                FirewallError::Storage(format!(
                    "Failed to create store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("tmp");
        tokio::fs::write(&tmp_path, json).await.map_err(|e| {
            FirewallError::Storage(format!(
                "Failed to write store file {}: {}",
                tmp_path.display(),
                e
            ))
        })?;

        tokio::fs::rename(&tmp_path, &self.path).await.map_err(|e| {
            FirewallError::Storage(format!(
                "Failed to rename store file {} → {}: {}",
                tmp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::debug!(path = %self.path.display(), keys = count, "Store written");
        Ok(())
    }
}

/// In-memory store for testing
#[derive(Default)]
pub struct MemoryKvStore {
    entries: RwLock<HashMap<String, Value>>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl KvStore for MemoryKvStore {
    async fn get(&self, keys: &[&str]) -> Result<HashMap<String, Value>> {
        let entries = self.entries.read().await;
        Ok(keys
            .iter()
            .filter_map(|key| entries.get(*key).map(|v| (key.to_string(), v.clone())))
            .collect())
    }

    async fn set(&self, new_entries: HashMap<String, Value>) -> Result<()> {
        self.entries.write().await.extend(new_entries);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn entries(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[tokio::test]
    async fn test_memory_store_set_get() {
        let store = MemoryKvStore::new();
        store
            .set(entries(&[("logBuffer", json!([1, 2])), ("other", json!("x"))]))
            .await
            .unwrap();

        let found = store.get(&["logBuffer", "missing"]).await.unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found["logBuffer"], json!([1, 2]));
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn test_memory_store_overwrite() {
        let store = MemoryKvStore::new();
        store.set(entries(&[("k", json!(1))])).await.unwrap();
        store.set(entries(&[("k", json!(2))])).await.unwrap();
        assert_eq!(store.get(&["k"]).await.unwrap()["k"], json!(2));
    }

    #[tokio::test]
    async fn test_file_store_set_get() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileKvStore::new(&path);

        store.set(entries(&[("logBuffer", json!([{"a": 1}]))])).await.unwrap();
        store.set(entries(&[("other", json!(true))])).await.unwrap();
        assert!(path.exists());

        // A fresh instance sees both keys
        let reopened = FileKvStore::new(&path);
        let found = reopened.get(&["logBuffer", "other"]).await.unwrap();
        assert_eq!(found["logBuffer"], json!([{"a": 1}]));
        assert_eq!(found["other"], json!(true));
    }

    #[tokio::test]
    async fn test_file_store_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileKvStore::new(dir.path().join("absent.json"));
        assert!(store.get(&["logBuffer"]).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_file_store_creates_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/deep/store.json");
        let store = FileKvStore::new(&path);

        store.set(HashMap::new()).await.unwrap();
        assert!(path.exists());
    }

    #[tokio::test]
    async fn test_file_store_atomic_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        let store = FileKvStore::new(&path);

        store.set(entries(&[("k", json!(1))])).await.unwrap();
        store.set(entries(&[("k", json!(2))])).await.unwrap();
        assert!(!path.with_extension("tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");
        std::fs::write(&path, "not json").unwrap();

        let err = FileKvStore::new(&path).get(&["k"]).await.unwrap_err();
        assert!(matches!(err, FirewallError::Storage(_)));
    }
}
