use crate::error::LedgerError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Identifier of a ledger user.
pub type UserId = u32;

/// Represents a monetary balance.
///
/// Wraps `rust_decimal::Decimal` so ledger arithmetic never goes through floats.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Default, Serialize, Deserialize)]
pub struct Balance(pub Decimal);

/// Represents a strictly positive monetary amount carried by a task.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Amount(Decimal);

impl Amount {
    /// Creates a new `Amount`, rejecting zero and negative values.
    pub fn new(value: Decimal) -> Result<Self, LedgerError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(LedgerError::InvalidTask(
                "amount must be positive".to_string(),
            ))
        }
    }

    pub fn value(&self) -> Decimal {
        self.0
    }
}

impl From<Amount> for Balance {
    fn from(amount: Amount) -> Self {
        Self(amount.0)
    }
}

impl Balance {
    pub const ZERO: Self = Self(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self {
        Self(amount)
    }

    /// Returns the increased balance, or `None` if it would exceed the decimal range.
    pub fn checked_add(self, amount: Amount) -> Option<Self> {
        self.0.checked_add(amount.value()).map(Self)
    }
}

/// Balance held by a single user.
///
/// Users that were never credited have no record; ledgers treat them as a zero balance.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct UserBalance {
    pub user: UserId,
    pub balance: Balance,
}

impl UserBalance {
    /// Creates a new zero balance for `user`.
    pub fn new(user: UserId) -> Self {
        Self {
            user,
            balance: Balance::ZERO,
        }
    }

    /// Adds funds to the balance, leaving it untouched on overflow
    pub fn credit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow { user: self.user })?;
        Ok(())
    }

    /// Removes funds if the balance covers them
    pub fn debit(&mut self, amount: Amount) -> Result<(), LedgerError> {
        let amount: Balance = amount.into();
        if self.balance >= amount {
            self.balance = Balance(self.balance.0 - amount.0);
            Ok(())
        } else {
            Err(LedgerError::InsufficientBalance { user: self.user })
        }
    }
}
