use crate::domain::account::{Amount, UserBalance, UserId};
use crate::domain::ports::{BalanceStore, TransactionService};
use crate::error::{LedgerError, Result};
use async_trait::async_trait;
use rocksdb::{ColumnFamilyDescriptor, DB, Options, WriteBatch};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for storing user balances.
pub const CF_BALANCES: &str = "balances";

/// A persistent ledger implementation using RocksDB.
///
/// Balances are stored as JSON under the big-endian user id. Mutations are serialised through a
/// single writer lock and transfers are committed as one `WriteBatch`.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDbLedger {
    db: Arc<DB>,
    writer: Arc<Mutex<()>>,
}

impl RocksDbLedger {
    /// Opens or creates a RocksDB instance at the specified path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_balances = ColumnFamilyDescriptor::new(CF_BALANCES, Options::default());
        let db = DB::open_cf_descriptors(&opts, path, vec![cf_balances])?;

        Ok(Self {
            db: Arc::new(db),
            writer: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self) -> Result<&rocksdb::ColumnFamily> {
        self.db
            .cf_handle(CF_BALANCES)
            .ok_or_else(|| LedgerError::Storage("Balances column family not found".to_string()))
    }

    fn load(&self, user_id: UserId) -> Result<Option<UserBalance>> {
        let cf = self.cf()?;
        match self.db.get_cf(cf, user_id.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put(&self, batch: &mut WriteBatch, balance: &UserBalance) -> Result<()> {
        let cf = self.cf()?;
        batch.put_cf(cf, balance.user.to_be_bytes(), serde_json::to_vec(balance)?);
        Ok(())
    }
}

#[async_trait]
impl TransactionService for RocksDbLedger {
    async fn credit(&self, user_id: UserId, amount: Amount) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut balance = self
            .load(user_id)?
            .unwrap_or_else(|| UserBalance::new(user_id));
        balance.credit(amount)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, &balance)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn debit(&self, user_id: UserId, amount: Amount) -> Result<()> {
        let _writer = self.writer.lock().await;
        let mut balance = self
            .load(user_id)?
            .ok_or(LedgerError::InsufficientBalance { user: user_id })?;
        balance.debit(amount)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, &balance)?;
        self.db.write(batch)?;
        Ok(())
    }

    async fn transfer(&self, from: UserId, to: UserId, amount: Amount) -> Result<()> {
        if from == to {
            return Err(LedgerError::SelfTransfer);
        }
        let _writer = self.writer.lock().await;
        let mut source = self
            .load(from)?
            .ok_or(LedgerError::InsufficientBalance { user: from })?;
        source.debit(amount)?;
        let mut target = self.load(to)?.unwrap_or_else(|| UserBalance::new(to));
        target.credit(amount)?;

        let mut batch = WriteBatch::default();
        self.put(&mut batch, &source)?;
        self.put(&mut batch, &target)?;
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl BalanceStore for RocksDbLedger {
    async fn balance(&self, user_id: UserId) -> Result<Option<UserBalance>> {
        self.load(user_id)
    }

    async fn all_balances(&self) -> Result<Vec<UserBalance>> {
        let cf = self.cf()?;
        let mut balances = Vec::new();
        // Big-endian keys iterate in user order.
        for item in self.db.iterator_cf(cf, rocksdb::IteratorMode::Start) {
            let (_key, value) = item?;
            balances.push(serde_json::from_slice(&value)?);
        }
        Ok(balances)
    }
}
