use crate::domain::account::{UserBalance, UserId};
use crate::error::Result;
use rust_decimal::Decimal;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct BalanceRow {
    user: UserId,
    balance: Decimal,
}

/// Writes final balances as `user,balance` CSV rows.
pub struct BalanceWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> BalanceWriter<W> {
    /// Creates a new `BalanceWriter` over any `Write` sink (e.g., Stdout).
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::WriterBuilder::new()
                .has_headers(false)
                .from_writer(sink),
        }
    }

    /// Writes the header and one row per balance, in the given order.
    pub fn write_balances(&mut self, balances: Vec<UserBalance>) -> Result<()> {
        self.writer.write_record(["user", "balance"])?;
        for entry in balances {
            self.writer.serialize(BalanceRow {
                user: entry.user,
                balance: entry.balance.0.normalize(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
