//! Operation counters for the executor and the write queue.
//!
//! Counters are cumulative: the latency figure is a running average over the
//! full lifetime of the instance, not a window. `reset` zeroes everything.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

#[derive(Debug, Clone, Copy, Default)]
struct Counters {
    total: u64,
    successful: u64,
    failed: u64,
    average_latency_ms: f64,
    last_operation_time: Option<DateTime<Utc>>,
}

/// Shared recorder owned by one layer (executor or queue).
#[derive(Clone, Default)]
pub(crate) struct MetricsRecorder {
    inner: Arc<RwLock<Counters>>,
}

impl MetricsRecorder {
    pub(crate) fn record(&self, latency: Duration, success: bool) {
        let mut counters = self.inner.write();
        counters.total += 1;
        if success {
            counters.successful += 1;
        } else {
            counters.failed += 1;
        }
        let latency_ms = latency.as_secs_f64() * 1000.0;
        let n = counters.total as f64;
        counters.average_latency_ms += (latency_ms - counters.average_latency_ms) / n;
        counters.last_operation_time = Some(Utc::now());
    }

    pub(crate) fn reset(&self) {
        *self.inner.write() = Counters::default();
    }

    pub(crate) fn snapshot(&self) -> LayerMetrics {
        let counters = self.inner.read();
        LayerMetrics {
            total_operations: counters.total,
            successful_operations: counters.successful,
            failed_operations: counters.failed,
            average_latency_ms: counters.average_latency_ms,
            last_operation_time: counters.last_operation_time,
        }
    }
}

/// Counter snapshot for one layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct LayerMetrics {
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Cumulative running average, in milliseconds.
    pub average_latency_ms: f64,
    /// Wall clock of the most recent completion.
    pub last_operation_time: Option<DateTime<Utc>>,
}

/// Combined executor + queue snapshot returned by the facade.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ConcurrencyMetrics {
    /// Executor-level counters.
    pub executor: LayerMetrics,
    /// Queue-level counters.
    pub queue: LayerMetrics,
    /// Ops not yet started or in flight, at snapshot time.
    pub queue_depth: usize,
    /// Summed operation count across both layers.
    pub total_operations: u64,
    pub successful_operations: u64,
    pub failed_operations: u64,
    /// Latency averaged across both layers, weighted by operation count.
    pub average_latency_ms: f64,
    /// Most recent completion across both layers.
    pub last_operation_time: Option<DateTime<Utc>>,
}

impl ConcurrencyMetrics {
    pub(crate) fn combine(executor: LayerMetrics, queue: LayerMetrics, queue_depth: usize) -> Self {
        let total = executor.total_operations + queue.total_operations;
        let average_latency_ms = if total == 0 {
            0.0
        } else {
            (executor.average_latency_ms * executor.total_operations as f64
                + queue.average_latency_ms * queue.total_operations as f64)
                / total as f64
        };
        let last_operation_time = match (executor.last_operation_time, queue.last_operation_time)
        {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        };

        Self {
            executor,
            queue,
            queue_depth,
            total_operations: total,
            successful_operations: executor.successful_operations + queue.successful_operations,
            failed_operations: executor.failed_operations + queue.failed_operations,
            average_latency_ms,
            last_operation_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_average() {
        let recorder = MetricsRecorder::default();

        recorder.record(Duration::from_millis(10), true);
        recorder.record(Duration::from_millis(30), true);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_operations, 2);
        assert_eq!(snapshot.successful_operations, 2);
        assert!((snapshot.average_latency_ms - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_failure_counting_and_reset() {
        let recorder = MetricsRecorder::default();

        recorder.record(Duration::from_millis(5), false);
        recorder.record(Duration::from_millis(5), true);

        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.failed_operations, 1);
        assert_eq!(snapshot.successful_operations, 1);
        assert!(snapshot.last_operation_time.is_some());

        recorder.reset();
        let snapshot = recorder.snapshot();
        assert_eq!(snapshot.total_operations, 0);
        assert_eq!(snapshot.average_latency_ms, 0.0);
        assert!(snapshot.last_operation_time.is_none());
    }

    #[test]
    fn test_combine_weighted_average() {
        let executor = LayerMetrics {
            total_operations: 1,
            successful_operations: 1,
            failed_operations: 0,
            average_latency_ms: 100.0,
            last_operation_time: None,
        };
        let queue = LayerMetrics {
            total_operations: 3,
            successful_operations: 2,
            failed_operations: 1,
            average_latency_ms: 20.0,
            last_operation_time: Some(Utc::now()),
        };

        let combined = ConcurrencyMetrics::combine(executor, queue, 2);
        assert_eq!(combined.total_operations, 4);
        assert_eq!(combined.successful_operations, 3);
        assert_eq!(combined.failed_operations, 1);
        assert_eq!(combined.queue_depth, 2);
        // (100 * 1 + 20 * 3) / 4 = 40
        assert!((combined.average_latency_ms - 40.0).abs() < 1e-9);
        assert!(combined.last_operation_time.is_some());
    }

    #[test]
    fn test_combine_empty_layers() {
        let combined =
            ConcurrencyMetrics::combine(LayerMetrics::default(), LayerMetrics::default(), 0);
        assert_eq!(combined.total_operations, 0);
        assert_eq!(combined.average_latency_ms, 0.0);
        assert!(combined.last_operation_time.is_none());
    }
}
