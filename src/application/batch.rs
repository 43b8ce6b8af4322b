use super::processor::TransactionProcessor;
use crate::config::BatchConfig;
use crate::domain::batch::{BatchError, BatchResult, generate_batch_id};
use crate::domain::ports::ProcessingObserverRef;
use crate::domain::task::{Task, TaskResult};
use crate::error::{LedgerError, Result};
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, warn};

/// Stand-in deadline for durations that do not fit in an `Instant`.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

type IndexedTask = (usize, Task);
type IndexedResult = (usize, TaskResult);

/// Runs groups of tasks through a [`TransactionProcessor`] under one deadline.
///
/// Each call spins up its own short-lived batch workers, independent of the pool's workers. A
/// task only counts as successful once the pool has actually executed it; tasks that have not
/// reported when the deadline passes are counted as `timed_out` but keep running in the pool.
#[derive(Clone)]
pub struct BatchProcessor {
    processor: TransactionProcessor,
    config: BatchConfig,
    observer: ProcessingObserverRef,
}

impl BatchProcessor {
    /// Creates a new `BatchProcessor` that feeds `processor` and reports to `observer`.
    pub fn new(
        processor: TransactionProcessor,
        config: BatchConfig,
        observer: ProcessingObserverRef,
    ) -> Self {
        Self {
            processor,
            config,
            observer,
        }
    }

    /// Returns the batch settings this coordinator was built with.
    pub fn config(&self) -> &BatchConfig {
        &self.config
    }

    /// Processes a batch under the configured deadline.
    pub async fn process_batch(&self, tasks: Vec<Task>) -> Result<BatchResult> {
        self.process_batch_within(tasks, self.config.timeout()).await
    }

    /// Processes a batch, giving up on stragglers once `deadline` has elapsed.
    ///
    /// Only fails outright when the pool is not running or refused every task as closed.
    pub async fn process_batch_within(
        &self,
        tasks: Vec<Task>,
        deadline: Duration,
    ) -> Result<BatchResult> {
        let started = Instant::now();
        let batch_id = generate_batch_id();
        if tasks.is_empty() {
            return Ok(BatchResult::empty(batch_id));
        }
        if self.processor.is_stopped() {
            return Err(LedgerError::Closed);
        }
        if !self.processor.is_running() {
            return Err(LedgerError::NotRunning);
        }

        let total = tasks.len();
        let concurrency = self.config.max_concurrency.clamp(1, total);
        let deadline_at = started
            .checked_add(deadline)
            .unwrap_or_else(|| started + FAR_FUTURE);
        info!(batch_id = %batch_id, total, concurrency, ?deadline, "Processing batch");

        let task_ids: Vec<String> = tasks.iter().map(|t| t.id.clone()).collect();
        let (task_tx, task_rx) = mpsc::channel::<IndexedTask>(total);
        let task_rx = Arc::new(Mutex::new(task_rx));
        let (result_tx, mut result_rx) = mpsc::channel::<IndexedResult>(total);

        let mut workers = JoinSet::new();
        for worker_id in 0..concurrency {
            workers.spawn(batch_worker(
                worker_id,
                self.processor.clone(),
                task_rx.clone(),
                result_tx.clone(),
                deadline_at,
            ));
        }
        drop(result_tx);

        workers.spawn(async move {
            for indexed in tasks.into_iter().enumerate() {
                tokio::select! {
                    sent = task_tx.send(indexed) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                    _ = sleep_until(deadline_at) => break,
                }
            }
        });

        let mut result = BatchResult::empty(batch_id.clone());
        result.total = total;
        let mut reported = vec![false; total];
        let mut received = 0usize;
        let mut closed_rejections = 0usize;

        let expiry = sleep_until(deadline_at);
        tokio::pin!(expiry);

        while received < total {
            tokio::select! {
                biased;
                next = result_rx.recv() => {
                    let Some((index, outcome)) = next else { break };
                    if std::mem::replace(&mut reported[index], true) {
                        continue;
                    }
                    received += 1;
                    if outcome.success {
                        result.successful += 1;
                    } else {
                        result.failed += 1;
                        if let Some(error) = outcome.error {
                            if error == LedgerError::Closed {
                                closed_rejections += 1;
                            }
                            result.errors.push(BatchError {
                                task_id: outcome.task_id,
                                error,
                            });
                        }
                    }
                }
                _ = &mut expiry => {
                    warn!(batch_id = %batch_id, received, total, "Batch deadline reached before all tasks reported");
                    break;
                }
            }
        }
        // Stragglers keep running in the pool; their late results are simply not collected.
        workers.abort_all();

        for (index, done) in reported.iter().enumerate() {
            if !done {
                result.timed_out += 1;
                result.errors.push(BatchError {
                    task_id: task_ids[index].clone(),
                    error: LedgerError::Timeout,
                });
            }
        }
        result.elapsed = started.elapsed();
        result.completed_at = Utc::now();

        if closed_rejections == total {
            error!(batch_id = %batch_id, "Every task in the batch was rejected by a closed processor");
            return Err(LedgerError::Closed);
        }

        info!(
            batch_id = %result.batch_id,
            total = result.total,
            successful = result.successful,
            failed = result.failed,
            timed_out = result.timed_out,
            elapsed_ms = result.elapsed.as_millis() as u64,
            "Batch processing completed"
        );
        self.observer.batch_completed(&result);
        Ok(result)
    }

    /// Processes a batch and flags it when anything failed.
    ///
    /// No compensation is performed: tasks that succeeded stay applied.
    pub async fn process_batch_with_rollback(&self, tasks: Vec<Task>) -> Result<BatchResult> {
        let result = self.process_batch(tasks).await?;
        if result.has_failures() {
            warn!(
                batch_id = %result.batch_id,
                failed = result.failed,
                timed_out = result.timed_out,
                "Batch had failed tasks, successful tasks were not rolled back"
            );
        }
        Ok(result)
    }

    /// Runs a batch in the background; the outcome is only reported through logs and the observer.
    pub fn spawn_batch(&self, tasks: Vec<Task>) -> JoinHandle<Result<BatchResult>> {
        let coordinator = self.clone();
        tokio::spawn(async move {
            let task_count = tasks.len();
            info!(task_count, "Starting asynchronous batch processing");
            let outcome = coordinator.process_batch(tasks).await;
            match &outcome {
                Ok(result) => info!(
                    batch_id = %result.batch_id,
                    successful = result.successful,
                    failed = result.failed,
                    timed_out = result.timed_out,
                    "Asynchronous batch processing finished"
                ),
                Err(e) => error!(error = %e, "Asynchronous batch processing failed"),
            }
            outcome
        })
    }
}

async fn batch_worker(
    worker_id: usize,
    processor: TransactionProcessor,
    tasks: Arc<Mutex<mpsc::Receiver<IndexedTask>>>,
    results: mpsc::Sender<IndexedResult>,
    deadline_at: Instant,
) {
    debug!(worker_id, "Batch worker started");
    loop {
        let next = tasks.lock().await.recv().await;
        let Some((index, task)) = next else { break };
        let task_id = task.id.clone();

        let outcome = match processor
            .submit_tracked(task, sleep_until(deadline_at))
            .await
        {
            Ok(completion) => tokio::select! {
                result = completion.wait() => result,
                _ = sleep_until(deadline_at) => break,
            },
            Err(LedgerError::Cancelled) => break,
            Err(e) => TaskResult::failure(task_id, e),
        };

        if results.send((index, outcome)).await.is_err() {
            break;
        }
    }
    debug!(worker_id, "Batch worker finished");
}
