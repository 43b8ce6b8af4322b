use clap::Parser;
use ledger_pool::application::batch::BatchProcessor;
use ledger_pool::application::processor::TransactionProcessor;
use ledger_pool::config::AppConfig;
use ledger_pool::domain::ports::{
    BalanceStore, BalanceStoreRef, TransactionService, TransactionServiceRef,
};
use ledger_pool::domain::task::Task;
use ledger_pool::infrastructure::in_memory::InMemoryLedger;
use ledger_pool::infrastructure::metrics::InMemoryMetrics;
#[cfg(feature = "storage-rocksdb")]
use ledger_pool::infrastructure::rocksdb::RocksDbLedger;
use ledger_pool::interfaces::csv::balance_writer::BalanceWriter;
use ledger_pool::interfaces::csv::task_reader::TaskReader;
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Input tasks CSV file (type, user, counterparty, amount[, priority])
    input: PathBuf,

    /// JSON configuration file; command-line flags override its values
    #[arg(long)]
    config: Option<PathBuf>,

    /// Path to persistent ledger (optional). If provided, uses RocksDB.
    #[arg(long)]
    db_path: Option<PathBuf>,

    /// Number of pool workers
    #[arg(long)]
    workers: Option<usize>,

    /// Capacity of the task queue
    #[arg(long)]
    queue_capacity: Option<usize>,

    /// How long a submission may wait for queue space, in milliseconds
    #[arg(long)]
    submit_timeout_ms: Option<u64>,

    /// Submit tasks through the batch coordinator instead of one by one
    #[arg(long)]
    batch: bool,

    /// Concurrent batch workers per batch
    #[arg(long)]
    batch_concurrency: Option<usize>,

    /// Deadline for each batch, in milliseconds
    #[arg(long)]
    batch_timeout_ms: Option<u64>,

    /// Maximum number of tasks per batch
    #[arg(long)]
    max_batch_size: Option<usize>,
}

impl Cli {
    fn app_config(&self) -> ledger_pool::error::Result<AppConfig> {
        let mut config = match &self.config {
            Some(path) => AppConfig::from_file(path)?,
            None => AppConfig::default(),
        };
        if let Some(workers) = self.workers {
            config.processor.workers = workers;
        }
        if let Some(capacity) = self.queue_capacity {
            config.processor.queue_capacity = capacity;
        }
        if let Some(timeout) = self.submit_timeout_ms {
            config.processor.submit_timeout_ms = timeout;
        }
        if let Some(concurrency) = self.batch_concurrency {
            config.batch.max_concurrency = concurrency;
        }
        if let Some(timeout) = self.batch_timeout_ms {
            config.batch.timeout_ms = timeout;
        }
        if let Some(size) = self.max_batch_size {
            config.batch.max_batch_size = size;
        }
        config.validate()?;
        Ok(config)
    }
}

fn wire<L>(ledger: L) -> (TransactionServiceRef, BalanceStoreRef)
where
    L: TransactionService + BalanceStore + 'static,
{
    let ledger = Arc::new(ledger);
    let service: TransactionServiceRef = ledger.clone();
    let balances: BalanceStoreRef = ledger;
    (service, balances)
}

fn open_ledger(db_path: Option<&Path>) -> Result<(TransactionServiceRef, BalanceStoreRef)> {
    match db_path {
        #[cfg(feature = "storage-rocksdb")]
        Some(path) => Ok(wire(RocksDbLedger::open(path).into_diagnostic()?)),
        #[cfg(not(feature = "storage-rocksdb"))]
        Some(_) => {
            warn!(
                "WARNING: Persistent storage requested via --db-path, but 'storage-rocksdb' feature is not enabled. Falling back to In-Memory storage."
            );
            Ok(wire(InMemoryLedger::new()))
        }
        None => Ok(wire(InMemoryLedger::new())),
    }
}

/// Keeps only the rows that parse, reporting the others.
fn readable(tasks: impl Iterator<Item = ledger_pool::error::Result<Task>>) -> impl Iterator<Item = Task> {
    tasks.filter_map(|task| match task {
        Ok(task) => Some(task),
        Err(e) => {
            warn!(error = %e, "Error reading task");
            None
        }
    })
}

async fn submit_each(processor: &TransactionProcessor, tasks: impl Iterator<Item = Task>) {
    for task in tasks {
        let task_id = task.id.clone();
        if let Err(e) = processor.submit(task).await {
            warn!(task_id = %task_id, error = %e, "Error submitting task");
        }
    }
}

async fn submit_batches(batches: &BatchProcessor, tasks: impl Iterator<Item = Task>) {
    let size = batches.config().max_batch_size;
    let mut handles = Vec::new();
    let mut chunk = Vec::with_capacity(size);
    for task in tasks {
        chunk.push(task);
        if chunk.len() == size {
            handles.push(batches.spawn_batch(std::mem::replace(
                &mut chunk,
                Vec::with_capacity(size),
            )));
        }
    }
    if !chunk.is_empty() {
        handles.push(batches.spawn_batch(chunk));
    }
    for handle in handles {
        match handle.await {
            Ok(Ok(result)) if result.has_failures() => {
                for failure in &result.errors {
                    warn!(task_id = %failure.task_id, error = %failure.error, "Batch task failed");
                }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Batch task panicked"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.app_config().into_diagnostic()?;
    let (service, balances) = open_ledger(cli.db_path.as_deref())?;

    let metrics = Arc::new(InMemoryMetrics::new());
    let processor = TransactionProcessor::new(service, config.processor.clone(), metrics.clone());
    processor.start().into_diagnostic()?;

    let file = File::open(&cli.input).into_diagnostic()?;
    let tasks = readable(TaskReader::new(file).tasks());

    if cli.batch {
        let batches = BatchProcessor::new(processor.clone(), config.batch.clone(), metrics.clone());
        submit_batches(&batches, tasks).await;
    } else {
        submit_each(&processor, tasks).await;
    }

    processor.wait_idle().await;
    let stats = processor.stats();
    let health = stats.health(&config.health);
    info!(
        stats = %serde_json::to_string(&stats).into_diagnostic()?,
        metrics = %serde_json::to_string(&metrics.snapshot()).into_diagnostic()?,
        health = %health.message,
        "Processing finished"
    );
    processor.stop().await.into_diagnostic()?;

    let stdout = io::stdout();
    let mut writer = BalanceWriter::new(stdout.lock());
    writer
        .write_balances(balances.all_balances().await.into_diagnostic()?)
        .into_diagnostic()?;

    Ok(())
}
