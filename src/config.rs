//! Construction-time settings for the processor, the batch coordinator and health checks.
//!
//! The core never reads the environment itself; the binary builds an [`AppConfig`] from an optional
//! JSON file plus command-line overrides and hands the pieces to the constructors.

use crate::error::{LedgerError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Number of pool workers.
    pub workers: usize,
    /// Capacity of the task queue and of the result queue.
    pub queue_capacity: usize,
    /// How long `submit` waits for queue space.
    pub submit_timeout_ms: u64,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            workers: 5,
            queue_capacity: 100,
            submit_timeout_ms: 5_000,
        }
    }
}

impl ProcessorConfig {
    pub fn submit_timeout(&self) -> Duration {
        Duration::from_millis(self.submit_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BatchConfig {
    /// Upper bound on concurrent batch workers.
    pub max_concurrency: usize,
    /// Default deadline for a whole batch.
    pub timeout_ms: u64,
    /// Largest batch the wiring layer hands to the coordinator in one call.
    pub max_batch_size: usize,
}

impl Default for BatchConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 5,
            timeout_ms: 30_000,
            max_batch_size: 100,
        }
    }
}

impl BatchConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthThresholds {
    pub max_queue_depth: usize,
    pub max_failure_ratio: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            max_queue_depth: 1000,
            max_failure_ratio: 0.1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub processor: ProcessorConfig,
    pub batch: BatchConfig,
    pub health: HealthThresholds,
}

impl AppConfig {
    /// Loads a JSON configuration file; missing fields keep their defaults.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        serde_json::from_str(&contents).map_err(|e| LedgerError::Config(e.to_string()))
    }

    /// Rejects sizes of zero and failure ratios outside `0..=1`.
    pub fn validate(&self) -> Result<()> {
        if self.processor.workers == 0 {
            return Err(LedgerError::Config("workers must be at least 1".to_string()));
        }
        if self.processor.queue_capacity == 0 {
            return Err(LedgerError::Config(
                "queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.batch.max_concurrency == 0 {
            return Err(LedgerError::Config(
                "batch max_concurrency must be at least 1".to_string(),
            ));
        }
        if self.batch.max_batch_size == 0 {
            return Err(LedgerError::Config(
                "batch max_batch_size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.health.max_failure_ratio) {
            return Err(LedgerError::Config(
                "max_failure_ratio must be within [0, 1]".to_string(),
            ));
        }
        Ok(())
    }
}
