//! Core domain types for the PromptVault storage engine.

pub mod config;
pub mod error;
pub mod ids;
pub mod record;

pub use config::{FallbackRetryConfig, RetryConfig, StorageConfig, VaultConfig};
pub use error::{StoreError, StoreResult};
pub use ids::RecordId;
pub use record::{ContextDraft, ContextRecord, Draft, PromptDraft, PromptRecord, Record};
