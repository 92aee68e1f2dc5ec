//! Durable settings backend.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use crate::cache::StorageError;

/// Authoritative key-value store for settings.
#[async_trait]
pub trait DurableStore: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Value>, StorageError>;
    async fn write(&self, key: &str, value: Value) -> Result<(), StorageError>;
    async fn remove(&self, key: &str) -> Result<(), StorageError>;
    async fn entries(&self) -> Result<HashMap<String, Value>, StorageError>;
}

/// All settings in one JSON object file. Updates replace the file
/// atomically (write to a temp file, then rename).
pub struct FileDurableStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileDurableStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn load_all(&self) -> Result<HashMap<String, Value>, StorageError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(contents) => Ok(serde_json::from_str(&contents)?),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(HashMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    async fn store_all(&self, entries: &HashMap<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, serde_json::to_vec_pretty(entries)?).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DurableStore for FileDurableStore {
    async fn read(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().await;
        Ok(self.load_all().await?.remove(key))
    }

    async fn write(&self, key: &str, value: Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load_all().await?;
        entries.insert(key.to_string(), value);
        self.store_all(&entries).await
    }

    async fn remove(&self, key: &str) -> Result<(), StorageError> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load_all().await?;
        if entries.remove(key).is_some() {
            self.store_all(&entries).await?;
        }
        Ok(())
    }

    async fn entries(&self) -> Result<HashMap<String, Value>, StorageError> {
        let _guard = self.lock.lock().await;
        self.load_all().await
    }
}
