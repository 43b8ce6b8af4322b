use crate::domain::account::{Amount, UserBalance, UserId};
use crate::domain::ports::{BalanceStore, TransactionService};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A thread-safe in-memory ledger.
///
/// Uses `Arc<RwLock<HashMap<UserId, UserBalance>>>` so clones share the same balances. Every
/// mutation holds the write lock for its whole read-modify-write, which keeps transfers atomic.
#[derive(Default, Clone)]
pub struct InMemoryLedger {
    balances: Arc<RwLock<HashMap<UserId, UserBalance>>>,
}

impl InMemoryLedger {
    /// Creates a new, empty ledger.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TransactionService for InMemoryLedger {
    async fn credit(&self, user_id: UserId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write().await;
        balances
            .entry(user_id)
            .or_insert_with(|| UserBalance::new(user_id))
            .credit(amount)
    }

    async fn debit(&self, user_id: UserId, amount: Amount) -> Result<()> {
        let mut balances = self.balances.write().await;
        match balances.get_mut(&user_id) {
            Some(balance) => balance.debit(amount),
            None => Err(LedgerError::InsufficientBalance { user: user_id }),
        }
    }

    async fn transfer(&self, from: UserId, to: UserId, amount: Amount) -> Result<()> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let mut balances = self.balances.write().await;
        let mut source = balances
            .get(&from)
            .cloned()
            .ok_or(LedgerError::InsufficientBalance { user: from })?;
        source.debit(amount)?;
        let mut target = balances
            .get(&to)
            .cloned()
            .unwrap_or_else(|| UserBalance::new(to));
        target.credit(amount)?;

        balances.insert(from, source);
        balances.insert(to, target);
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for InMemoryLedger {
    async fn balance(&self, user_id: UserId) -> Result<Option<UserBalance>> {
        let balances = self.balances.read().await;
        Ok(balances.get(&user_id).cloned())
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>> {
        let balances = self.balances.read().await;
        let mut all: Vec<UserBalance> = balances.values().cloned().collect();
        all.sort_by_key(|b| b.user);
        Ok(all)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::account::Balance;
    use rust_decimal_macros::dec;

    fn amount(value: rust_decimal::Decimal) -> Amount {
        Amount::new(value).unwrap()
    }

    #[tokio::test]
    async fn test_credit_creates_balance() {
        let ledger = InMemoryLedger::new();
        ledger.credit(1, amount(dec!(100.0))).await.unwrap();
        ledger.credit(1, amount(dec!(0.5))).await.unwrap();

        let balance = ledger.balance(1).await.unwrap().unwrap();
        assert_eq!(balance.balance, Balance::new(dec!(100.5)));
        assert!(ledger.balance(2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_debit_unknown_user_is_insufficient() {
        let ledger = InMemoryLedger::new();
        let result = ledger.debit(9, amount(dec!(1))).await;
        assert_eq!(result, Err(LedgerError::InsufficientBalance { user: 9 }));
    }

    #[tokio::test]
    async fn test_transfer_moves_funds() {
        let ledger = InMemoryLedger::new();
        ledger.credit(1, amount(dec!(10))).await.unwrap();
        ledger.transfer(1, 2, amount(dec!(4))).await.unwrap();

        let all = ledger.all_balances().await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].balance, Balance::new(dec!(6)));
        assert_eq!(all[1].balance, Balance::new(dec!(4)));
    }

    #[tokio::test]
    async fn test_failed_transfer_leaves_balances_untouched() {
        let ledger = InMemoryLedger::new();
        ledger.credit(1, amount(dec!(3))).await.unwrap();

        let result = ledger.transfer(1, 2, amount(dec!(5))).await;
        assert_eq!(result, Err(LedgerError::InsufficientBalance { user: 1 }));
        assert_eq!(
            ledger.balance(1).await.unwrap().unwrap().balance,
            Balance::new(dec!(3))
        );
        assert!(ledger.balance(2).await.unwrap().is_none());

        let result = ledger.transfer(1, 1, amount(dec!(1))).await;
        assert_eq!(result, Err(LedgerError::SelfTransfer));
    }

    #[tokio::test]
    async fn test_overflowing_transfer_is_all_or_nothing() {
        let ledger = InMemoryLedger::new();
        let max = amount(rust_decimal::Decimal::MAX);
        ledger.credit(1, amount(dec!(10))).await.unwrap();
        ledger.credit(2, max).await.unwrap();

        assert_eq!(
            ledger.credit(2, amount(dec!(1))).await,
            Err(LedgerError::BalanceOverflow { user: 2 })
        );
        assert_eq!(
            ledger.transfer(1, 2, amount(dec!(1))).await,
            Err(LedgerError::BalanceOverflow { user: 2 })
        );
        assert_eq!(
            ledger.balance(1).await.unwrap().unwrap().balance,
            Balance::new(dec!(10))
        );
        assert_eq!(
            ledger.balance(2).await.unwrap().unwrap().balance,
            Balance::new(rust_decimal::Decimal::MAX)
        );
    }
}
