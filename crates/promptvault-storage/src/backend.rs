use async_trait::async_trait;
use bytes::Bytes;

use promptvault_core::StoreResult;

/// Abstraction over the key-value store holding the library maps.
///
/// The product this engine serves persists through a callback-based browser
/// storage API; every implementation here exposes the same contract as plain
/// asynchronous calls. A single `put` is assumed atomic: the write queue
/// serializes this process's own writers, not other clients of the backing
/// primitive.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Fetch the value at `key`, or `None` when the key is absent.
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>>;

    /// Store `value` at `key`, overwriting any prior value.
    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()>;

    /// Remove `key`. Removing an absent key is a no-op.
    async fn delete(&self, key: &str) -> StoreResult<()>;

    /// Whether `key` currently holds a value.
    async fn exists(&self, key: &str) -> StoreResult<bool>;
}
