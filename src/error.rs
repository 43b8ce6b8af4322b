use crate::domain::account::UserId;
use thiserror::Error;

/// Errors surfaced by the processing core and its collaborators.
///
/// Structural variants (`InvalidTask`, `QueueFull`, `Closed`, `Cancelled`) are returned
/// synchronously to submitters. Business variants (`InsufficientBalance`, `SelfTransfer`, ...)
/// only ever travel inside a `TaskResult` or `BatchResult`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LedgerError {
    #[error("Invalid task: {0}")]
    InvalidTask(String),
    #[error("Queue is full, task submission timed out")]
    QueueFull,
    #[error("Processor is closed")]
    Closed,
    #[error("Submission cancelled by caller")]
    Cancelled,
    #[error("Processor is not running")]
    NotRunning,
    #[error("Processor is already running")]
    AlreadyRunning,
    #[error("Task did not complete before the batch deadline")]
    Timeout,
    #[error("Insufficient balance for user {user}")]
    InsufficientBalance { user: UserId },
    #[error("Balance overflow for user {user}")]
    BalanceOverflow { user: UserId },
    #[error("Cannot transfer to self")]
    SelfTransfer,
    #[error("Transaction service panicked: {0}")]
    Panicked(String),
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("CSV error: {0}")]
    Csv(String),
    #[error("IO error: {0}")]
    Io(String),
}

impl From<csv::Error> for LedgerError {
    fn from(e: csv::Error) -> Self {
        Self::Csv(e.to_string())
    }
}

impl From<std::io::Error> for LedgerError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e.to_string())
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(e: serde_json::Error) -> Self {
        Self::Storage(format!("Serialization error: {}", e))
    }
}

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for LedgerError {
    fn from(e: rocksdb::Error) -> Self {
        Self::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, LedgerError>;
