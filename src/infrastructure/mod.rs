//! Concrete collaborators: ledgers implementing the domain ports and a metrics observer.

pub mod in_memory;
pub mod metrics;
#[cfg(feature = "storage-rocksdb")]
pub mod rocksdb;
