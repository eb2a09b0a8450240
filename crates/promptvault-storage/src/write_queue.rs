//! Single-flight FIFO write serializer.
//!
//! All write-intent operations against one backing key funnel through a
//! [`WriteQueue`] so that no two read-modify-write cycles interleave. The
//! queue is an explicit object: construct one per facade (or share one
//! across facades targeting the same keys) instead of reaching for
//! process-wide state.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::{oneshot, Notify};
use tokio::task::JoinHandle;
use tracing::{trace, warn};

use promptvault_core::{StoreError, StoreResult};

use crate::metrics::{LayerMetrics, MetricsRecorder};

type QueueJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

struct QueuedOp {
    id: u64,
    enqueued_at: Instant,
    job: QueueJob,
}

struct QueueState {
    pending: Mutex<VecDeque<QueuedOp>>,
    /// Worker wake-up; carries a permit so an enqueue racing the worker's
    /// empty-check is never lost.
    wake: Notify,
    /// Notified whenever the worker completes an op or finds the queue
    /// empty; `flush` waits on this.
    idle: Notify,
    busy: AtomicBool,
    next_op_id: AtomicU64,
    metrics: MetricsRecorder,
}

/// FIFO serializer guaranteeing at most one operation executes at any
/// instant, in enqueue order.
pub struct WriteQueue {
    state: Arc<QueueState>,
    worker: JoinHandle<()>,
}

impl WriteQueue {
    /// Spawn the worker loop. Must be called from within a tokio runtime.
    #[must_use]
    pub fn new() -> Self {
        let state = Arc::new(QueueState {
            pending: Mutex::new(VecDeque::new()),
            wake: Notify::new(),
            idle: Notify::new(),
            busy: AtomicBool::new(false),
            next_op_id: AtomicU64::new(1),
            metrics: MetricsRecorder::default(),
        });
        let worker = tokio::spawn(Self::run(Arc::clone(&state)));
        Self { state, worker }
    }

    async fn run(state: Arc<QueueState>) {
        loop {
            let next = {
                let mut pending = state.pending.lock();
                let op = pending.pop_front();
                if op.is_some() {
                    // Flagged while the lock is held so depth() never reads
                    // zero between dequeue and execution.
                    state.busy.store(true, Ordering::SeqCst);
                }
                op
            };

            match next {
                Some(op) => {
                    trace!(
                        op_id = op.id,
                        waited_ms = op.enqueued_at.elapsed().as_millis() as u64,
                        "write op starting"
                    );
                    (op.job)().await;
                    state.busy.store(false, Ordering::SeqCst);
                    state.idle.notify_waiters();
                }
                None => {
                    state.idle.notify_waiters();
                    state.wake.notified().await;
                }
            }
        }
    }

    /// Append `op` to the queue. The returned future resolves or rejects
    /// exactly as `op` does, once the single worker reaches it. Failure of
    /// one op never halts the queue.
    pub async fn enqueue<T, F, Fut>(&self, op: F) -> StoreResult<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: std::future::Future<Output = StoreResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let metrics = self.state.metrics.clone();
        let job: QueueJob = Box::new(move || -> BoxFuture<'static, ()> {
            Box::pin(async move {
                let started = Instant::now();
                let result = op().await;
                metrics.record(started.elapsed(), result.is_ok());
                // Receiver may be gone if the caller stopped waiting.
                let _ = tx.send(result);
            })
        });

        let id = self.state.next_op_id.fetch_add(1, Ordering::Relaxed);
        self.state.pending.lock().push_back(QueuedOp {
            id,
            enqueued_at: Instant::now(),
            job,
        });
        self.state.wake.notify_one();

        rx.await.map_err(|_| StoreError::QueueTeardown)?
    }

    /// Ops not yet started plus the op in flight, if any.
    pub fn depth(&self) -> usize {
        let pending = self.state.pending.lock();
        pending.len() + usize::from(self.state.busy.load(Ordering::SeqCst))
    }

    /// Wait until every queued op has completed, including ops enqueued
    /// while the flush is in progress.
    pub async fn flush(&self) {
        loop {
            let notified = self.state.idle.notified();
            if self.depth() == 0 {
                return;
            }
            notified.await;
        }
    }

    /// Discard every not-yet-started op without executing it; the op in
    /// flight (if any) is left to finish. Returns the number discarded.
    ///
    /// Callers awaiting a discarded op observe [`StoreError::QueueTeardown`].
    /// This is a test/teardown affordance, not part of the steady-state
    /// contract.
    pub fn clear(&self) -> usize {
        let discarded: Vec<QueuedOp> = self.state.pending.lock().drain(..).collect();
        if !discarded.is_empty() {
            warn!(discarded = discarded.len(), "write queue cleared with pending ops");
        }
        discarded.len()
    }

    /// Queue-level counters.
    pub fn metrics(&self) -> LayerMetrics {
        self.state.metrics.snapshot()
    }

    /// Zero the queue-level counters.
    pub fn reset_metrics(&self) {
        self.state.metrics.reset();
    }
}

impl Default for WriteQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        self.worker.abort();
        // Dropping pending jobs wakes their callers with QueueTeardown.
        self.state.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use promptvault_core::StoreError;

    #[tokio::test(start_paused = true)]
    async fn test_ops_run_in_fifo_order_without_overlap() {
        let queue = WriteQueue::new();
        let log: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for i in 0..5 {
            let log = Arc::clone(&log);
            handles.push(queue.enqueue(move || async move {
                log.lock().push(format!("start {i}"));
                tokio::time::sleep(Duration::from_millis(10)).await;
                log.lock().push(format!("end {i}"));
                Ok::<_, StoreError>(i)
            }));
        }

        let results = futures::future::join_all(handles).await;
        for (i, result) in results.into_iter().enumerate() {
            assert_eq!(result.unwrap(), i);
        }

        let log = log.lock();
        let expected: Vec<String> = (0..5)
            .flat_map(|i| [format!("start {i}"), format!("end {i}")])
            .collect();
        assert_eq!(*log, expected);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_op_does_not_halt_queue() {
        let queue = WriteQueue::new();

        let failed = queue
            .enqueue(|| async { Err::<(), _>(StoreError::backend("boom")) })
            .await;
        assert!(failed.is_err());

        let ok = queue.enqueue(|| async { Ok::<_, StoreError>(7) }).await;
        assert_eq!(ok.unwrap(), 7);

        let metrics = queue.metrics();
        assert_eq!(metrics.total_operations, 2);
        assert_eq!(metrics.failed_operations, 1);
        assert_eq!(metrics.successful_operations, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_drains_ops_enqueued_mid_flush() {
        let queue = Arc::new(WriteQueue::new());
        let completed = Arc::new(Mutex::new(0usize));

        for _ in 0..3 {
            let queue2 = Arc::clone(&queue);
            let completed = Arc::clone(&completed);
            tokio::spawn(async move {
                let completed2 = Arc::clone(&completed);
                let _ = queue2
                    .enqueue(move || async move {
                        tokio::time::sleep(Duration::from_millis(5)).await;
                        *completed2.lock() += 1;
                        Ok::<_, StoreError>(())
                    })
                    .await;
            });
        }

        // Let the spawned tasks enqueue.
        tokio::task::yield_now().await;

        queue.flush().await;
        assert_eq!(*completed.lock(), 3);
        assert_eq!(queue.depth(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_discards_pending_ops() {
        let queue = Arc::new(WriteQueue::new());

        // Head op blocks the worker long enough for the rest to pile up.
        let queue2 = Arc::clone(&queue);
        let blocker = tokio::spawn(async move {
            queue2
                .enqueue(|| async {
                    tokio::time::sleep(Duration::from_secs(1)).await;
                    Ok::<_, StoreError>(())
                })
                .await
        });

        let queue3 = Arc::clone(&queue);
        let victim = tokio::spawn(async move {
            queue3.enqueue(|| async { Ok::<_, StoreError>(42) }).await
        });

        // Let both enqueue and the worker pick up the blocker.
        tokio::time::sleep(Duration::from_millis(1)).await;
        assert!(queue.depth() >= 1);

        let discarded = queue.clear();
        assert_eq!(discarded, 1);

        let victim_result = victim.await.unwrap();
        assert!(matches!(victim_result, Err(StoreError::QueueTeardown)));

        // The in-flight blocker still completes.
        assert!(blocker.await.unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_depth_counts_pending_and_in_flight() {
        let queue = Arc::new(WriteQueue::new());
        assert_eq!(queue.depth(), 0);

        let queue2 = Arc::clone(&queue);
        let handle = tokio::spawn(async move {
            queue2
                .enqueue(|| async {
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, StoreError>(())
                })
                .await
        });

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(queue.depth(), 1);

        handle.await.unwrap().unwrap();
        assert_eq!(queue.depth(), 0);
    }
}
