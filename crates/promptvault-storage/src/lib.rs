//! Concurrency-safe storage engine for prompt and context libraries.
//!
//! Composition, outermost first: [`LibraryService`] (facade) →
//! [`AtomicExecutor`] (bounded retry) → [`WriteQueue`] (single-flight FIFO)
//! → [`RecordStore`] (read-modify-write against a [`StorageBackend`]).

pub mod backend;
pub mod executor;
pub mod library;
pub mod local;
pub mod memory;
pub mod metrics;
pub mod mock;
pub mod record_store;
pub mod write_queue;

pub use backend::StorageBackend;
pub use executor::AtomicExecutor;
pub use library::LibraryService;
pub use local::LocalStorageBackend;
pub use memory::MemoryStorageBackend;
pub use metrics::{ConcurrencyMetrics, LayerMetrics};
pub use mock::{CallHistoryEntry, MockConfig, MockFailure, MockStorageBackend};
pub use record_store::{RecordStore, StoredValue, WriteMode};
pub use write_queue::WriteQueue;
