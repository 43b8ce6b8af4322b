use crate::domain::batch::BatchResult;
use crate::domain::ports::ProcessingObserver;
use crate::domain::task::{TaskKind, TaskResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Default)]
struct KindCounters {
    success: AtomicU64,
    failure: AtomicU64,
    duration_micros: AtomicU64,
}

/// In-process metrics registry fed through [`ProcessingObserver`].
///
/// Mirrors the counters a Prometheus exporter would publish, per task kind.
#[derive(Debug, Default)]
pub struct InMemoryMetrics {
    credit: KindCounters,
    debit: KindCounters,
    transfer: KindCounters,
    submitted: AtomicU64,
    peak_queue_depth: AtomicUsize,
    dropped_results: AtomicU64,
    batches: Mutex<Vec<BatchSummary>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub batch_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KindMetrics {
    pub success: u64,
    pub failure: u64,
    pub total_duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub submitted: u64,
    pub peak_queue_depth: usize,
    pub dropped_results: u64,
    pub by_kind: BTreeMap<&'static str, KindMetrics>,
    pub batches: Vec<BatchSummary>,
}

impl InMemoryMetrics {
    /// Creates a new `InMemoryMetrics` with every counter at zero.
    pub fn new() -> Self {
        Self::default()
    }

    fn counters(&self, kind: TaskKind) -> &KindCounters {
        match kind {
            TaskKind::Credit => &self.credit,
            TaskKind::Debit => &self.debit,
            TaskKind::Transfer => &self.transfer,
        }
    }

    /// Copies the current counters and batch summaries.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let by_kind = [TaskKind::Credit, TaskKind::Debit, TaskKind::Transfer]
            .into_iter()
            .map(|kind| {
                let counters = self.counters(kind);
                (
                    kind.as_str(),
                    KindMetrics {
                        success: counters.success.load(Ordering::Relaxed),
                        failure: counters.failure.load(Ordering::Relaxed),
                        total_duration_ms: counters.duration_micros.load(Ordering::Relaxed) / 1000,
                    },
                )
            })
            .collect();

        MetricsSnapshot {
            submitted: self.submitted.load(Ordering::Relaxed),
            peak_queue_depth: self.peak_queue_depth.load(Ordering::Relaxed),
            dropped_results: self.dropped_results.load(Ordering::Relaxed),
            by_kind,
            batches: self.batches.lock().clone(),
        }
    }
}

impl ProcessingObserver for InMemoryMetrics {
    fn task_submitted(&self, _kind: TaskKind, queue_depth: usize) {
        self.submitted.fetch_add(1, Ordering::Relaxed);
        self.peak_queue_depth.fetch_max(queue_depth, Ordering::Relaxed);
    }

    fn task_processed(&self, kind: TaskKind, elapsed: Duration, success: bool) {
        let counters = self.counters(kind);
        if success {
            counters.success.fetch_add(1, Ordering::Relaxed);
        } else {
            counters.failure.fetch_add(1, Ordering::Relaxed);
        }
        counters
            .duration_micros
            .fetch_add(elapsed.as_micros() as u64, Ordering::Relaxed);
    }

    fn result_dropped(&self, _result: &TaskResult) {
        self.dropped_results.fetch_add(1, Ordering::Relaxed);
    }

    fn batch_completed(&self, result: &BatchResult) {
        self.batches.lock().push(BatchSummary {
            batch_id: result.batch_id.clone(),
            total: result.total,
            successful: result.successful,
            failed: result.failed,
            timed_out: result.timed_out,
        });
    }
}
