//! Application layer: the concurrent transaction-processing core.
//!
//! [`processor::TransactionProcessor`] owns the bounded task queue and the pool workers,
//! [`batch::BatchProcessor`] fans batches out over it under a deadline, and [`stats`] holds the
//! shared counters both of them report through.

pub mod batch;
pub mod processor;
pub mod stats;
