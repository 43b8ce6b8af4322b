//! Domain model: ledger value objects, task/result data and the ports the core depends on.

pub mod account;
pub mod batch;
pub mod ports;
pub mod task;
