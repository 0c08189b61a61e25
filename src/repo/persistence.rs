//! Key/blob persistence port and its adapters.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("invalid storage key: {0}")]
    InvalidKey(String),
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Durable key/blob storage.
///
/// Callers treat load failures as "absent" and save failures as non-fatal.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersistencePort: Send + Sync {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), PersistenceError>;
    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError>;
}

/// One JSON file per key under a directory.
#[derive(Debug, Clone)]
pub struct FilePersistence {
    dir: PathBuf,
}

impl FilePersistence {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, PersistenceError> {
        let valid = !key.is_empty()
            && key
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
        if !valid {
            return Err(PersistenceError::InvalidKey(key.to_string()));
        }
        Ok(self.dir.join(format!("{key}.json")))
    }
}

#[async_trait]
impl PersistencePort for FilePersistence {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), PersistenceError> {
        let path = self.path_for(key)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        // write-then-rename so a crash never leaves a half-written blob
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, blob).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// Process-local storage, used when no storage directory is configured.
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    blobs: Mutex<HashMap<String, Vec<u8>>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: &str, blob: impl Into<Vec<u8>>) {
        self.blobs.lock().insert(key.to_string(), blob.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.blobs.lock().get(key).cloned()
    }
}

#[async_trait]
impl PersistencePort for MemoryPersistence {
    async fn save(&self, key: &str, blob: &[u8]) -> Result<(), PersistenceError> {
        self.insert(key, blob);
        Ok(())
    }

    async fn load(&self, key: &str) -> Result<Option<Vec<u8>>, PersistenceError> {
        Ok(self.get(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path().join("state"));

        assert!(store.load("meter_data").await.unwrap().is_none());
        store.save("meter_data", b"{\"a\":1}").await.unwrap();
        assert_eq!(store.load("meter_data").await.unwrap().unwrap(), b"{\"a\":1}");

        store.save("meter_data", b"{}").await.unwrap();
        assert_eq!(store.load("meter_data").await.unwrap().unwrap(), b"{}");
        assert!(!dir.path().join("state/meter_data.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FilePersistence::new(dir.path());
        assert!(matches!(
            store.save("../escape", b"x").await,
            Err(PersistenceError::InvalidKey(_))
        ));
        assert!(store.load("").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_round_trip() {
        let store = MemoryPersistence::new();
        assert!(store.load("k").await.unwrap().is_none());
        store.save("k", b"blob").await.unwrap();
        assert_eq!(store.load("k").await.unwrap().unwrap(), b"blob");
    }
}
