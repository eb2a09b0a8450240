//! In-memory storage backend

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use promptvault_core::StoreResult;

use crate::backend::StorageBackend;

/// In-memory backend, for tests and for embedding callers that manage
/// durability themselves.
#[derive(Clone, Default)]
pub struct MemoryStorageBackend {
    objects: Arc<RwLock<HashMap<String, Bytes>>>,
}

impl MemoryStorageBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw synchronous read, bypassing the async trait. Test affordance for
    /// asserting on the persisted bytes directly.
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.objects.read().get(key).cloned()
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.objects.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.read().is_empty()
    }
}

#[async_trait]
impl StorageBackend for MemoryStorageBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        Ok(self.objects.read().get(key).cloned())
    }

    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()> {
        self.objects.write().insert(key.to_string(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        self.objects.write().remove(key);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        Ok(self.objects.read().contains_key(key))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_backend_round_trip() {
        let backend = MemoryStorageBackend::new();

        backend
            .put("key", Bytes::from("value"))
            .await
            .unwrap();
        assert_eq!(backend.get("key").await.unwrap(), Some(Bytes::from("value")));
        assert!(backend.exists("key").await.unwrap());

        backend.delete("key").await.unwrap();
        assert_eq!(backend.get("key").await.unwrap(), None);

        // Idempotent delete
        backend.delete("key").await.unwrap();
    }

    #[tokio::test]
    async fn test_memory_backend_overwrite() {
        let backend = MemoryStorageBackend::new();

        backend.put("key", Bytes::from("one")).await.unwrap();
        backend.put("key", Bytes::from("two")).await.unwrap();

        assert_eq!(backend.get("key").await.unwrap(), Some(Bytes::from("two")));
        assert_eq!(backend.len(), 1);
    }
}
