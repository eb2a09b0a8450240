//! Mock storage backend for testing
//!
//! Provides an in-memory backing store with configurable failure patterns
//! for exercising retry logic and write verification without a real
//! persistence layer.
//!
//! # Features
//!
//! - **Deterministic failures**: pre-defined failure sequences, popped one
//!   per backend call (or per `put` via the put-targeted queue)
//! - **Silent write drops**: `put` reports success without storing, which
//!   surfaces upstream as a verification failure
//! - **Random failures**: configurable failure rate
//! - **Call history**: every operation recorded for assertions
//! - **Latency simulation**: small async delay on every call

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;

use promptvault_core::{StoreError, StoreResult};

use crate::backend::StorageBackend;

/// Mock failure pattern.
#[derive(Debug, Clone)]
pub enum MockFailure {
    /// Transient error (retry-able): the call rejects.
    Transient(&'static str),

    /// The call reports success but the write is dropped. Only meaningful
    /// for `put`; other operations treat it as `Ok`.
    SilentDrop,

    /// Success (no error).
    Ok,
}

impl MockFailure {
    fn to_error(&self) -> Option<StoreError> {
        match self {
            MockFailure::Transient(msg) => Some(StoreError::backend(format!("transient: {msg}"))),
            MockFailure::SilentDrop | MockFailure::Ok => None,
        }
    }
}

/// Mock backend configuration.
#[derive(Debug, Clone)]
pub struct MockConfig {
    /// Simulated storage latency per call.
    pub latency: Duration,

    /// Enable call history tracking.
    pub track_history: bool,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            latency: Duration::from_millis(1),
            track_history: true,
        }
    }
}

/// Mock call history entry.
#[derive(Debug, Clone)]
pub struct CallHistoryEntry {
    /// Operation type: "put", "get", "delete", "exists".
    pub operation: String,

    /// Key the operation targeted.
    pub key: String,

    /// Whether the operation succeeded.
    pub success: bool,

    /// Timestamp of the operation.
    pub timestamp: Instant,
}

/// Mock storage backend with failure injection.
///
/// Two failure queues drive the behavior: a global queue popped by every
/// backend call, and a put-targeted queue consulted by `put` before the
/// global one. The put-targeted queue keeps retry tests independent of how
/// many reads an operation performs around each write.
pub struct MockStorageBackend {
    storage: Arc<RwLock<HashMap<String, Bytes>>>,
    failure_queue: Arc<RwLock<VecDeque<MockFailure>>>,
    put_failure_queue: Arc<RwLock<VecDeque<MockFailure>>>,
    config: MockConfig,
    call_history: Arc<RwLock<Vec<CallHistoryEntry>>>,
}

impl MockStorageBackend {
    /// Create a new mock backend with default config (no failures).
    pub fn new() -> Self {
        Self::new_with_config(MockConfig::default())
    }

    /// Create a new mock backend with custom config.
    pub fn new_with_config(config: MockConfig) -> Self {
        Self {
            storage: Arc::new(RwLock::new(HashMap::new())),
            failure_queue: Arc::new(RwLock::new(VecDeque::new())),
            put_failure_queue: Arc::new(RwLock::new(VecDeque::new())),
            config,
            call_history: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Create a mock backend with a deterministic failure pattern popped by
    /// every call. Once the queue is empty, all operations succeed.
    pub fn new_with_failures(pattern: Vec<MockFailure>) -> Self {
        let mock = Self::new();
        *mock.failure_queue.write() = pattern.into();
        mock
    }

    /// Create a mock backend where every call fails with the given error.
    pub fn new_always_fail(error: &'static str) -> Self {
        Self::new_with_failures(vec![MockFailure::Transient(error); 1000])
    }

    /// Create a mock backend with intermittent failures.
    ///
    /// Generates a random sequence of 100 successes/failures based on the
    /// failure rate (0.0-1.0), then succeeds unconditionally.
    pub fn new_flaky(failure_rate: f64) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let mut pattern = Vec::new();

        for _ in 0..100 {
            if rng.gen::<f64>() < failure_rate {
                pattern.push(MockFailure::Transient("timeout"));
            } else {
                pattern.push(MockFailure::Ok);
            }
        }

        Self::new_with_failures(pattern)
    }

    /// Queue failures that only `put` calls consume, ahead of the global
    /// queue. `SilentDrop` entries turn into writes that report success but
    /// never land.
    pub fn push_put_failures(&self, pattern: Vec<MockFailure>) {
        self.put_failure_queue.write().extend(pattern);
    }

    /// Seed a raw value directly into storage, bypassing failure queues and
    /// history. Used to plant legacy-format payloads.
    pub fn seed(&self, key: &str, value: Bytes) {
        self.storage.write().insert(key.to_string(), value);
    }

    /// Raw synchronous read of the stored bytes.
    pub fn raw(&self, key: &str) -> Option<Bytes> {
        self.storage.read().get(key).cloned()
    }

    /// Get call history for assertions.
    pub fn get_call_history(&self) -> Vec<CallHistoryEntry> {
        self.call_history.read().clone()
    }

    /// Clear call history.
    pub fn clear_history(&self) {
        self.call_history.write().clear();
    }

    /// Number of successful puts.
    pub fn successful_puts(&self) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == "put" && entry.success)
            .count()
    }

    /// Number of failed puts.
    pub fn failed_puts(&self) -> usize {
        self.call_history
            .read()
            .iter()
            .filter(|entry| entry.operation == "put" && !entry.success)
            .count()
    }

    /// Number of keys currently stored.
    pub fn storage_size(&self) -> usize {
        self.storage.read().len()
    }

    /// Whether a key exists in storage.
    pub fn contains_key(&self, key: &str) -> bool {
        self.storage.read().contains_key(key)
    }

    /// Reset storage and history.
    pub fn reset(&self) {
        self.storage.write().clear();
        self.call_history.write().clear();
        self.failure_queue.write().clear();
        self.put_failure_queue.write().clear();
    }

    fn next_failure(&self, for_put: bool) -> MockFailure {
        if for_put {
            if let Some(failure) = self.put_failure_queue.write().pop_front() {
                return failure;
            }
        }
        self.failure_queue
            .write()
            .pop_front()
            .unwrap_or(MockFailure::Ok)
    }

    fn record_call(&self, operation: &str, key: &str, success: bool) {
        if self.config.track_history {
            self.call_history.write().push(CallHistoryEntry {
                operation: operation.to_string(),
                key: key.to_string(),
                success,
                timestamp: Instant::now(),
            });
        }
    }
}

impl Default for MockStorageBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl StorageBackend for MockStorageBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<Bytes>> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.next_failure(false).to_error() {
            self.record_call("get", key, false);
            return Err(error);
        }

        let value = self.storage.read().get(key).cloned();
        self.record_call("get", key, true);
        Ok(value)
    }

    async fn put(&self, key: &str, value: Bytes) -> StoreResult<()> {
        tokio::time::sleep(self.config.latency).await;

        match self.next_failure(true) {
            MockFailure::Transient(msg) => {
                self.record_call("put", key, false);
                Err(StoreError::backend(format!("transient: {msg}")))
            }
            MockFailure::SilentDrop => {
                // Reported as success; the write never lands.
                self.record_call("put", key, true);
                Ok(())
            }
            MockFailure::Ok => {
                self.storage.write().insert(key.to_string(), value);
                self.record_call("put", key, true);
                Ok(())
            }
        }
    }

    async fn delete(&self, key: &str) -> StoreResult<()> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.next_failure(false).to_error() {
            self.record_call("delete", key, false);
            return Err(error);
        }

        self.storage.write().remove(key);
        self.record_call("delete", key, true);
        Ok(())
    }

    async fn exists(&self, key: &str) -> StoreResult<bool> {
        tokio::time::sleep(self.config.latency).await;

        if let Some(error) = self.next_failure(false).to_error() {
            self.record_call("exists", key, false);
            return Err(error);
        }

        let present = self.storage.read().contains_key(key);
        self.record_call("exists", key, true);
        Ok(present)
    }
}
