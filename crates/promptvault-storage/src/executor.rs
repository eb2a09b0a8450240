//! Atomic-operation wrapper: bounded retries with exponential backoff,
//! composed with the write queue for serialization.
//!
//! The composition order matters: `execute_atomic_with_retry` runs the
//! *entire* retry loop as a single queue entry (retry-inside-atomic), so
//! retries of one caller's failed attempt never interleave with another
//! caller's write. The opposite nesting would let attempt 1 of caller A
//! interleave with attempt 1 of caller B, each reading the other's partial
//! state.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::time::sleep;
use tracing::{debug, warn};

use promptvault_core::{RetryConfig, StoreError, StoreResult};

use crate::metrics::{LayerMetrics, MetricsRecorder};
use crate::write_queue::WriteQueue;

/// Bounded-retry executor over a shared [`WriteQueue`].
pub struct AtomicExecutor {
    queue: Arc<WriteQueue>,
    retry: RetryConfig,
    metrics: MetricsRecorder,
}

impl AtomicExecutor {
    pub fn new(queue: Arc<WriteQueue>, retry: RetryConfig) -> Self {
        Self {
            queue,
            retry,
            metrics: MetricsRecorder::default(),
        }
    }

    /// Attempt `op` up to `max_attempts` times with exponential backoff
    /// between attempts.
    ///
    /// `op` must be idempotent: it re-runs from scratch on every attempt, so
    /// it has to re-read current state rather than reuse a captured
    /// snapshot. The executor does not enforce this precondition.
    pub async fn execute_with_retry<T, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        op: F,
    ) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let retry = self.retry.clone();
        let started = Instant::now();
        let result = retry_loop(
            operation,
            max_attempts,
            move |attempt| retry.backoff_for_attempt(attempt),
            op,
        )
        .await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// Attempt `op` up to `max_attempts` times with a fixed delay between
    /// attempts. Used by the non-atomic fallback paths.
    pub async fn execute_with_fixed_retry<T, F, Fut>(
        &self,
        operation: &str,
        max_attempts: u32,
        delay: Duration,
        op: F,
    ) -> StoreResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = StoreResult<T>>,
    {
        let started = Instant::now();
        let result = retry_loop(operation, max_attempts, move |_| delay, op).await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// Submit `op` to the write queue unmodified: serialization without
    /// retry.
    pub async fn execute_atomic<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let started = Instant::now();
        let result = self.queue.enqueue(op).await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// Run the entire retry loop as a single queue entry.
    ///
    /// The same idempotency precondition as [`execute_with_retry`] applies.
    ///
    /// [`execute_with_retry`]: Self::execute_with_retry
    pub async fn execute_atomic_with_retry<T, F, Fut>(
        &self,
        operation: &'static str,
        max_attempts: u32,
        op: F,
    ) -> StoreResult<T>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let retry = self.retry.clone();
        let started = Instant::now();
        let result = self
            .queue
            .enqueue(move || async move {
                retry_loop(
                    operation,
                    max_attempts,
                    move |attempt| retry.backoff_for_attempt(attempt),
                    op,
                )
                .await
            })
            .await;
        self.metrics.record(started.elapsed(), result.is_ok());
        result
    }

    /// Executor-level counters.
    pub fn metrics(&self) -> LayerMetrics {
        self.metrics.snapshot()
    }

    /// Zero the executor-level counters.
    pub fn reset_metrics(&self) {
        self.metrics.reset();
    }
}

async fn retry_loop<T, F, Fut, B>(
    operation: &str,
    max_attempts: u32,
    backoff: B,
    op: F,
) -> StoreResult<T>
where
    F: Fn() -> Fut,
    Fut: Future<Output = StoreResult<T>>,
    B: Fn(u32) -> Duration,
{
    let attempts = max_attempts.max(1);
    let mut last_message = String::new();

    for attempt in 1..=attempts {
        match op().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!(operation, attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                warn!(operation, attempt, error = %err, "operation attempt failed");
                last_message = err.to_string();
                if attempt < attempts {
                    sleep(backoff(attempt)).await;
                }
            }
        }
    }

    Err(StoreError::RetriesExhausted {
        operation: operation.to_string(),
        attempts,
        message: last_message,
    })
}
