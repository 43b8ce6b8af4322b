use super::account::{Amount, UserBalance, UserId};
use super::batch::BatchResult;
use super::task::{TaskKind, TaskResult};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// The ledger collaborator that performs the actual balance mutations.
///
/// Implementations must be safe to call from many workers at once.
#[async_trait]
pub trait TransactionService: Send + Sync {
    async fn credit(&self, user_id: UserId, amount: Amount) -> Result<()>;
    async fn debit(&self, user_id: UserId, amount: Amount) -> Result<()>;
    async fn transfer(&self, from: UserId, to: UserId, amount: Amount) -> Result<()>;
}

pub type TransactionServiceRef = Arc<dyn TransactionService>;

/// Hook for metrics exporters.
///
/// Every method defaults to a no-op so implementations only override what they record.
pub trait ProcessingObserver: Send + Sync {
    fn task_submitted(&self, _kind: TaskKind, _queue_depth: usize) {}
    fn task_processed(&self, _kind: TaskKind, _elapsed: Duration, _success: bool) {}
    fn result_dropped(&self, _result: &TaskResult) {}
    fn batch_completed(&self, _result: &BatchResult) {}
}

pub type ProcessingObserverRef = Arc<dyn ProcessingObserver>;

/// Observer that records nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl ProcessingObserver for NoopObserver {}

/// Read access to ledger balances, used by the wiring layer to report final state.
#[async_trait]
pub trait BalanceStore: Send + Sync {
    async fn balance(&self, user_id: UserId) -> Result<Option<UserBalance>>;
    async fn all_balances(&self) -> Result<Vec<UserBalance>>;
}

pub type BalanceStoreRef = Arc<dyn BalanceStore>;
