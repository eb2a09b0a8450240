//! Local filesystem storage backend
//!
//! Stores each backing key as a file in a base directory. The durable
//! analogue of the browser's local storage area for hosts that run outside
//! a browser (CLI tooling, native shells).

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;

use promptvault_core::{StoreError, StoreResult};

use crate::backend::StorageBackend;

/// File-per-key backend rooted at a base directory.
pub struct LocalStorageBackend {
    base_dir: PathBuf,
}

impl LocalStorageBackend {
    /// Create a new local backend, creating the base directory if needed.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Io` if directory creation fails.
    pub async fn new(base_dir: impl AsRef<Path>) -> StoreResult<Self> {
        let base_dir = base_dir.as_ref().to_path_buf();
        tokio::fs::create_dir_all(&base_dir).await?;
        Ok(Self { base_dir })
    }

    fn full_path(&self, key: &str) -> PathBuf {
        self.base_dir.join(format!("{key}.json"))
    }
}

#[async_trait]
impl StorageBackend for LocalStorageBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        let path = self.full_path(key);

        match tokio::fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StoreError::from(e)),
        }
    }

    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()> {
        if key.is_empty() {
            return Err(StoreError::backend("key cannot be empty"));
        }

        let path = self.full_path(key);
        tokio::fs::write(&path, &value).await?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        let path = self.full_path(key);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            tokio::fs::remove_file(&path).await?;
        }

        // Idempotent - no error if file doesn't exist
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        let path = self.full_path(key);
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}
