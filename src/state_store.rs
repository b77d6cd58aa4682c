//! The host's per-node static state: a flat key/value map of JSON values that
//! survives between poll invocations.

use std::{
    collections::BTreeMap,
    io::ErrorKind as IoErrorKind,
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::error::TriggerError;

#[async_trait]
pub trait StateStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` when it was never set.
    async fn get(&self, key: &str) -> Result<Option<Value>, TriggerError>;

    /// Replaces the value stored under `key`.
    async fn set(&self, key: &str, value: Value) -> Result<(), TriggerError>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<BTreeMap<String, Value>>,
}

impl MemoryStateStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every stored entry.
    pub async fn snapshot(&self) -> BTreeMap<String, Value> {
        self.values.lock().await.clone()
    }
}

#[async_trait]
impl StateStore for MemoryStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, TriggerError> {
        Ok(self.values.lock().await.get(key).cloned())
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TriggerError> {
        self.values.lock().await.insert(key.to_string(), value);
        Ok(())
    }
}

/// Static state kept as a single JSON object on disk.
///
/// Every `set` rewrites the whole file through a temporary sibling and a rename,
/// so readers never observe a half-written document.
#[derive(Debug)]
pub struct FileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStateStore {
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), lock: Mutex::new(()) }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> Result<BTreeMap<String, Value>, TriggerError> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) if bytes.is_empty() => Ok(BTreeMap::new()),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|e| {
                TriggerError::State(format!("corrupt state file {}: {e}", self.path.display()))
            }),
            Err(e) if e.kind() == IoErrorKind::NotFound => Ok(BTreeMap::new()),
            Err(e) => Err(TriggerError::State(format!(
                "failed to read state file {}: {e}",
                self.path.display()
            ))),
        }
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, TriggerError> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn set(&self, key: &str, value: Value) -> Result<(), TriggerError> {
        let _guard = self.lock.lock().await;
        let mut values = self.load().await?;
        values.insert(key.to_string(), value);

        let bytes = serde_json::to_vec_pretty(&values)
            .map_err(|e| TriggerError::State(format!("failed to encode state: {e}")))?;
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes).await.map_err(|e| {
            TriggerError::State(format!("failed to write {}: {e}", tmp.display()))
        })?;
        tokio::fs::rename(&tmp, &self.path).await.map_err(|e| {
            TriggerError::State(format!("failed to replace {}: {e}", self.path.display()))
        })?;

        debug!(key, path = %self.path.display(), "Persisted static state");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_store_get_and_set() -> anyhow::Result<()> {
        let store = MemoryStateStore::new();
        assert!(store.get("lastBlock").await?.is_none());

        store.set("lastBlock", json!("12345")).await?;
        assert_eq!(store.get("lastBlock").await?, Some(json!("12345")));

        store.set("lastBlock", json!("54321")).await?;
        assert_eq!(store.get("lastBlock").await?, Some(json!("54321")));
        Ok(())
    }

    #[tokio::test]
    async fn file_store_survives_reopen() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");

        let store = FileStateStore::new(&path);
        assert!(store.get("lastTxBlock").await?.is_none());
        store.set("lastTxBlock", json!({"lastBlockHeight": "7"})).await?;
        store.set("lastBlock", json!({"lastBlockHeight": "9"})).await?;

        let reopened = FileStateStore::new(&path);
        assert_eq!(reopened.get("lastTxBlock").await?, Some(json!({"lastBlockHeight": "7"})));
        assert_eq!(reopened.get("lastBlock").await?, Some(json!({"lastBlockHeight": "9"})));
        assert!(!path.with_extension("tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn corrupt_file_is_a_state_error() -> anyhow::Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"{not json")?;

        let result = FileStateStore::new(&path).get("lastBlock").await;
        assert!(matches!(result, Err(TriggerError::State(_))));
        Ok(())
    }
}
