use super::task::serialize_error;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Serialize, Serializer};
use std::time::Duration;

/// A failed task inside a batch.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct BatchError {
    pub task_id: String,
    #[serde(serialize_with = "serialize_required_error")]
    pub error: LedgerError,
}

/// Aggregate outcome of one batch invocation.
///
/// `successful + failed + timed_out == total` always holds; `timed_out` is only non-zero when the
/// deadline expired before every task reported.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct BatchResult {
    pub batch_id: String,
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    pub timed_out: usize,
    pub errors: Vec<BatchError>,
    #[serde(rename = "elapsed_ms", serialize_with = "serialize_millis")]
    pub elapsed: Duration,
    pub completed_at: DateTime<Utc>,
}

impl BatchResult {
    /// Creates a result for a batch with no tasks.
    pub fn empty(batch_id: impl Into<String>) -> Self {
        Self {
            batch_id: batch_id.into(),
            total: 0,
            successful: 0,
            failed: 0,
            timed_out: 0,
            errors: Vec::new(),
            elapsed: Duration::ZERO,
            completed_at: Utc::now(),
        }
    }

    /// Returns true when at least one task did not succeed.
    pub fn has_failures(&self) -> bool {
        self.failed + self.timed_out > 0
    }
}

pub fn generate_batch_id() -> String {
    format!("batch_{}", uuid::Uuid::new_v4().simple())
}

fn serialize_required_error<S>(error: &LedgerError, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serialize_error(&Some(error.clone()), serializer)
}

pub(crate) fn serialize_millis<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_u64(duration.as_millis() as u64)
}
