use crate::config::HealthThresholds;
use crate::domain::batch::serialize_millis;
use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Number of latency samples kept for the rolling average.
pub const LATENCY_WINDOW: usize = 1000;

/// Fixed-capacity circular buffer of processing latencies.
///
/// Once full, each push overwrites the oldest sample.
#[derive(Debug)]
pub struct LatencyWindow {
    samples: Vec<Duration>,
    next: usize,
    capacity: usize,
}

impl LatencyWindow {
    /// Creates an empty window holding at most `capacity` samples.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: Vec::with_capacity(capacity),
            next: 0,
            capacity,
        }
    }

    /// Adds a sample, evicting the oldest one once full.
    pub fn push(&mut self, sample: Duration) {
        if self.samples.len() < self.capacity {
            self.samples.push(sample);
        } else {
            self.samples[self.next] = sample;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn average(&self) -> Duration {
        if self.samples.is_empty() {
            return Duration::ZERO;
        }
        let total: Duration = self.samples.iter().sum();
        total / self.samples.len() as u32
    }

    pub fn max(&self) -> Duration {
        self.samples.iter().copied().max().unwrap_or_default()
    }
}

#[derive(Debug)]
struct Counters {
    total_processed: u64,
    successful: u64,
    failed: u64,
    latencies: LatencyWindow,
}

/// Running statistics shared by every pool worker.
///
/// The counter group and the latency window live behind one lock so a snapshot can never observe
/// `successful + failed` ahead of `total_processed`. The active-worker gauge is a separate atomic.
#[derive(Debug)]
pub struct StatsTracker {
    counters: Mutex<Counters>,
    active_workers: AtomicUsize,
}

impl Default for StatsTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsTracker {
    /// Creates a new tracker with zeroed counters and an empty latency window.
    pub fn new() -> Self {
        Self {
            counters: Mutex::new(Counters {
                total_processed: 0,
                successful: 0,
                failed: 0,
                latencies: LatencyWindow::with_capacity(LATENCY_WINDOW),
            }),
            active_workers: AtomicUsize::new(0),
        }
    }

    /// Records one processed task in a single critical section.
    pub fn record(&self, success: bool, elapsed: Duration) {
        let mut counters = self.counters.lock();
        if success {
            counters.successful += 1;
        } else {
            counters.failed += 1;
        }
        counters.total_processed += 1;
        counters.latencies.push(elapsed);
    }

    /// Marks a worker busy until the returned guard is dropped.
    pub fn enter_worker(&self) -> ActiveWorkerGuard<'_> {
        self.active_workers.fetch_add(1, Ordering::SeqCst);
        ActiveWorkerGuard { tracker: self }
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::SeqCst)
    }

    /// Reads all counters and latency figures at once.
    pub fn snapshot(&self, queue_depth: usize) -> StatsSnapshot {
        let counters = self.counters.lock();
        StatsSnapshot {
            total_processed: counters.total_processed,
            successful: counters.successful,
            failed: counters.failed,
            queue_depth,
            active_workers: self.active_workers(),
            average_latency: counters.latencies.average(),
            max_latency: counters.latencies.max(),
            latency_samples: counters.latencies.len(),
        }
    }
}

pub struct ActiveWorkerGuard<'a> {
    tracker: &'a StatsTracker,
}

impl Drop for ActiveWorkerGuard<'_> {
    fn drop(&mut self) {
        self.tracker.active_workers.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Point-in-time view of the processor statistics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatsSnapshot {
    pub total_processed: u64,
    pub successful: u64,
    pub failed: u64,
    pub queue_depth: usize,
    pub active_workers: usize,
    #[serde(rename = "average_latency_ms", serialize_with = "serialize_millis")]
    pub average_latency: Duration,
    #[serde(rename = "max_latency_ms", serialize_with = "serialize_millis")]
    pub max_latency: Duration,
    pub latency_samples: usize,
}

impl StatsSnapshot {
    pub fn failure_ratio(&self) -> f64 {
        if self.total_processed == 0 {
            0.0
        } else {
            self.failed as f64 / self.total_processed as f64
        }
    }

    pub fn health(&self, thresholds: &HealthThresholds) -> HealthReport {
        if self.failure_ratio() > thresholds.max_failure_ratio {
            HealthReport {
                status: HealthStatus::Warning,
                message: "High failure rate detected".to_string(),
            }
        } else if self.queue_depth > thresholds.max_queue_depth {
            HealthReport {
                status: HealthStatus::Warning,
                message: "Queue size is high".to_string(),
            }
        } else {
            HealthReport {
                status: HealthStatus::Healthy,
                message: "Worker system is operational".to_string(),
            }
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Warning,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub message: String,
}
