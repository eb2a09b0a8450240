//! Storage facade consumed by external collaborators (message routers, UI
//! hosts).
//!
//! The facade owns all map mutation: callers submit drafts and ids, never
//! mutated records. Default flows go through the atomic (queue-serialized)
//! paths; the non-atomic variants exist as an explicit fallback for
//! single-writer call sites and carry no ordering guarantee. Mixing the two
//! disciplines against the same backing key is the caller's responsibility
//! to avoid.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use promptvault_core::{
    ContextDraft, ContextRecord, Draft, PromptDraft, PromptRecord, Record, RecordId, StoreError,
    StoreResult, VaultConfig,
};

use crate::backend::StorageBackend;
use crate::executor::AtomicExecutor;
use crate::metrics::ConcurrencyMetrics;
use crate::record_store::{RecordStore, WriteMode};
use crate::write_queue::WriteQueue;

/// Public storage contract for the prompt and context libraries.
pub struct LibraryService {
    prompts: Arc<RecordStore<PromptRecord>>,
    contexts: Arc<RecordStore<ContextRecord>>,
    executor: AtomicExecutor,
    queue: Arc<WriteQueue>,
    config: VaultConfig,
}

impl LibraryService {
    /// Build a facade over `backend`. Must be called from within a tokio
    /// runtime (the write queue spawns its worker on construction).
    pub fn new(backend: Arc<dyn StorageBackend>, config: VaultConfig) -> Self {
        let queue = Arc::new(WriteQueue::new());
        let executor = AtomicExecutor::new(Arc::clone(&queue), config.storage.retry.clone());
        let prompts = Arc::new(RecordStore::new(
            Arc::clone(&backend),
            config.storage.prompts_key.clone(),
        ));
        let contexts = Arc::new(RecordStore::new(
            backend,
            config.storage.contexts_key.clone(),
        ));

        Self {
            prompts,
            contexts,
            executor,
            queue,
            config,
        }
    }

    /// Facade with default configuration.
    pub fn with_defaults(backend: Arc<dyn StorageBackend>) -> Self {
        Self::new(backend, VaultConfig::default())
    }

    // === Read paths (not serialized against writers) ===

    /// All prompts, ascending by creation time, ties broken by id.
    pub async fn prompts(&self) -> StoreResult<Vec<PromptRecord>> {
        let records = self.prompts.read().await?;
        Ok(RecordStore::to_sorted_list(&records))
    }

    /// All context snippets, ascending by creation time, ties broken by id.
    pub async fn contexts(&self) -> StoreResult<Vec<ContextRecord>> {
        let records = self.contexts.read().await?;
        Ok(RecordStore::to_sorted_list(&records))
    }

    // === Atomic paths (queue-serialized, default flows) ===

    /// Save a prompt through the write queue, with retries.
    pub async fn save_prompt_atomic(&self, draft: PromptDraft) -> StoreResult<PromptRecord> {
        let store = Arc::clone(&self.prompts);
        self.executor
            .execute_atomic_with_retry(
                "save prompt",
                self.config.storage.retry.max_attempts,
                move || {
                    let store = Arc::clone(&store);
                    let draft = draft.clone();
                    async move { save_once(store.as_ref(), &draft).await }
                },
            )
            .await
    }

    /// Save a context snippet through the write queue, with retries.
    pub async fn save_context_atomic(&self, draft: ContextDraft) -> StoreResult<ContextRecord> {
        let store = Arc::clone(&self.contexts);
        self.executor
            .execute_atomic_with_retry(
                "save context",
                self.config.storage.retry.max_attempts,
                move || {
                    let store = Arc::clone(&store);
                    let draft = draft.clone();
                    async move { save_once(store.as_ref(), &draft).await }
                },
            )
            .await
    }

    /// Delete a prompt through the write queue, with retries. Deleting an
    /// absent id succeeds as a no-op.
    pub async fn delete_prompt_atomic(&self, id: &RecordId) -> StoreResult<()> {
        let store = Arc::clone(&self.prompts);
        let id = id.clone();
        self.executor
            .execute_atomic_with_retry(
                "delete prompt",
                self.config.storage.retry.max_attempts,
                move || {
                    let store = Arc::clone(&store);
                    let id = id.clone();
                    async move { delete_once(store.as_ref(), &id).await }
                },
            )
            .await
    }

    /// Delete a context snippet through the write queue, with retries.
    pub async fn delete_context_atomic(&self, id: &RecordId) -> StoreResult<()> {
        let store = Arc::clone(&self.contexts);
        let id = id.clone();
        self.executor
            .execute_atomic_with_retry(
                "delete context",
                self.config.storage.retry.max_attempts,
                move || {
                    let store = Arc::clone(&store);
                    let id = id.clone();
                    async move { delete_once(store.as_ref(), &id).await }
                },
            )
            .await
    }

    // === Non-atomic fallback paths ===

    /// Save a prompt without queue serialization.
    ///
    /// Unsafe under concurrent writers: no ordering guarantee against any
    /// other call, including other non-atomic ones. Retained for
    /// single-writer call sites; prefer [`save_prompt_atomic`].
    ///
    /// [`save_prompt_atomic`]: Self::save_prompt_atomic
    pub async fn save_prompt(&self, draft: PromptDraft) -> StoreResult<PromptRecord> {
        let fallback = &self.config.storage.fallback_retry;
        let store = &self.prompts;
        self.executor
            .execute_with_fixed_retry(
                "save prompt",
                fallback.max_attempts,
                fallback.delay(),
                || {
                    let draft = draft.clone();
                    async move { save_once(store.as_ref(), &draft).await }
                },
            )
            .await
    }

    /// Save a context snippet without queue serialization. Same caveats as
    /// [`save_prompt`](Self::save_prompt).
    pub async fn save_context(&self, draft: ContextDraft) -> StoreResult<ContextRecord> {
        let fallback = &self.config.storage.fallback_retry;
        let store = &self.contexts;
        self.executor
            .execute_with_fixed_retry(
                "save context",
                fallback.max_attempts,
                fallback.delay(),
                || {
                    let draft = draft.clone();
                    async move { save_once(store.as_ref(), &draft).await }
                },
            )
            .await
    }

    /// Delete a prompt without queue serialization. Same caveats as
    /// [`save_prompt`](Self::save_prompt).
    pub async fn delete_prompt(&self, id: &RecordId) -> StoreResult<()> {
        let fallback = &self.config.storage.fallback_retry;
        let store = &self.prompts;
        self.executor
            .execute_with_fixed_retry(
                "delete prompt",
                fallback.max_attempts,
                fallback.delay(),
                || {
                    let id = id.clone();
                    async move { delete_once(store.as_ref(), &id).await }
                },
            )
            .await
    }

    /// Delete a context snippet without queue serialization. Same caveats
    /// as [`save_prompt`](Self::save_prompt).
    pub async fn delete_context(&self, id: &RecordId) -> StoreResult<()> {
        let fallback = &self.config.storage.fallback_retry;
        let store = &self.contexts;
        self.executor
            .execute_with_fixed_retry(
                "delete context",
                fallback.max_attempts,
                fallback.delay(),
                || {
                    let id = id.clone();
                    async move { delete_once(store.as_ref(), &id).await }
                },
            )
            .await
    }

    // === Observability ===

    /// Combined executor and queue counters.
    pub fn concurrency_metrics(&self) -> ConcurrencyMetrics {
        ConcurrencyMetrics::combine(
            self.executor.metrics(),
            self.queue.metrics(),
            self.queue.depth(),
        )
    }

    /// Zero the counters of both layers.
    pub fn reset_metrics(&self) {
        self.executor.reset_metrics();
        self.queue.reset_metrics();
    }

    /// Await completion of every queued write.
    pub async fn flush(&self) {
        self.queue.flush().await;
    }

    /// Ops queued or in flight right now.
    pub fn queue_depth(&self) -> usize {
        self.queue.depth()
    }
}

/// One save attempt: read, merge over the prior record, merge-write,
/// verify. Re-run wholesale on retry, so each attempt sees current state.
async fn save_once<D: Draft>(
    store: &RecordStore<D::Output>,
    draft: &D,
) -> StoreResult<D::Output> {
    let records = store.read().await?;

    let id = draft.id().cloned().unwrap_or_else(RecordId::generate);
    let prior = records.get(&id);
    // Prior record's created_at wins; a caller-supplied one is honored only
    // on creation.
    let created_at = prior
        .map(|record| record.created_at())
        .or_else(|| draft.created_at())
        .unwrap_or_else(Utc::now);
    let record = draft
        .clone()
        .into_record(prior, id.clone(), created_at, Utc::now());

    let mut delta = HashMap::with_capacity(1);
    delta.insert(id.clone(), record.clone());
    store.write(delta, WriteMode::Merge).await?;

    // Commit-then-verify: a write that silently didn't land is a failure,
    // not a success.
    let persisted = store.read().await?;
    match persisted.get(&id) {
        Some(stored) if *stored == record => {
            debug!(entity = <D::Output as Record>::ENTITY, id = %id, "record saved");
            Ok(record)
        }
        _ => Err(StoreError::Verification {
            operation: "save",
            entity: <D::Output as Record>::ENTITY,
            id: id.to_string(),
        }),
    }
}

/// One delete attempt: read, drop the key, replace-write, verify. Deleting
/// an id that was never present is a successful no-op.
async fn delete_once<R: Record>(store: &RecordStore<R>, id: &RecordId) -> StoreResult<()> {
    let mut records = store.read().await?;

    if records.remove(id).is_none() {
        debug!(entity = R::ENTITY, id = %id, "delete of absent record is a no-op");
        return Ok(());
    }

    store.write(records, WriteMode::Replace).await?;

    let persisted = store.read().await?;
    if persisted.contains_key(id) {
        return Err(StoreError::Verification {
            operation: "deletion",
            entity: R::ENTITY,
            id: id.to_string(),
        });
    }

    debug!(entity = R::ENTITY, id = %id, "record deleted");
    Ok(())
}
