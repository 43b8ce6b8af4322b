#![allow(dead_code)]

use async_trait::async_trait;
use ledger_pool::config::ProcessorConfig;
use ledger_pool::domain::account::{Amount, UserId};
use ledger_pool::domain::ports::TransactionService;
use ledger_pool::error::{LedgerError, Result};
use std::fs::File;
use std::io::Error;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Collaborator that succeeds after an optional delay and counts every call.
#[derive(Default)]
pub struct StubService {
    pub calls: AtomicUsize,
    pub delay: Duration,
    /// Users whose debits fail with insufficient balance.
    pub broke_user: Option<UserId>,
}

impl StubService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn slow(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn call(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

#[async_trait]
impl TransactionService for StubService {
    async fn credit(&self, _user_id: UserId, _amount: Amount) -> Result<()> {
        self.call().await;
        Ok(())
    }

    async fn debit(&self, user_id: UserId, _amount: Amount) -> Result<()> {
        self.call().await;
        if self.broke_user == Some(user_id) {
            return Err(LedgerError::InsufficientBalance { user: user_id });
        }
        Ok(())
    }

    async fn transfer(&self, _from: UserId, _to: UserId, _amount: Amount) -> Result<()> {
        self.call().await;
        Ok(())
    }
}

/// Collaborator that panics on every debit.
#[derive(Default)]
pub struct PanickingService {
    pub calls: AtomicUsize,
}

#[async_trait]
impl TransactionService for PanickingService {
    async fn credit(&self, _user_id: UserId, _amount: Amount) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn debit(&self, _user_id: UserId, _amount: Amount) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        panic!("ledger exploded");
    }

    async fn transfer(&self, _from: UserId, _to: UserId, _amount: Amount) -> Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub fn pool_config(workers: usize, queue_capacity: usize, submit_timeout_ms: u64) -> ProcessorConfig {
    ProcessorConfig {
        workers,
        queue_capacity,
        submit_timeout_ms,
    }
}

/// Waits until `check` holds, polling every few milliseconds.
pub async fn eventually<F: Fn() -> bool>(check: F, within: Duration) -> bool {
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    check()
}

pub fn generate_csv(path: &Path, rows: usize) -> std::result::Result<(), Error> {
    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);

    wtr.write_record(["type", "user", "counterparty", "amount"])?;

    for _ in 1..=rows {
        wtr.write_record(["credit", "1", "", "1.0"])?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn generate_mixed_csv(path: &Path, rows: usize, users: u32) -> std::result::Result<(), Error> {
    use rand::Rng;

    let file = File::create(path)?;
    let mut wtr = csv::WriterBuilder::new().from_writer(file);
    wtr.write_record(["type", "user", "counterparty", "amount"])?;

    let mut rng = rand::thread_rng();
    for _ in 0..rows {
        let user = rng.gen_range(1..=users).to_string();
        wtr.write_record(["credit", user.as_str(), "", "1.0"])?;
    }

    wtr.flush()?;
    Ok(())
}
