use super::stats::{HealthReport, StatsSnapshot, StatsTracker};
use crate::config::{HealthThresholds, ProcessorConfig};
use crate::domain::account::Amount;
use crate::domain::ports::{ProcessingObserverRef, TransactionServiceRef};
use crate::domain::task::{Task, TaskKind, TaskResult};
use crate::error::{LedgerError, Result};
use parking_lot::{Mutex, RwLock};
use std::any::Any;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{Notify, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const IDLE: u8 = 0;
const RUNNING: u8 = 1;
const STOPPED: u8 = 2;

/// A queued task plus the optional waiter interested in its outcome.
struct Job {
    task: Task,
    reply: Option<oneshot::Sender<TaskResult>>,
}

struct Shared {
    service: TransactionServiceRef,
    observer: ProcessingObserverRef,
    config: ProcessorConfig,
    task_tx: RwLock<Option<mpsc::Sender<Job>>>,
    task_rx: tokio::sync::Mutex<mpsc::Receiver<Job>>,
    result_tx: Mutex<Option<mpsc::Sender<TaskResult>>>,
    result_rx: Mutex<Option<mpsc::Receiver<TaskResult>>>,
    stats: StatsTracker,
    state: AtomicU8,
    shutdown: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    consumer: Mutex<Option<JoinHandle<()>>>,
    /// Tasks accepted into the queue that have not finished processing yet.
    pending: AtomicUsize,
    idle: Notify,
}

impl Shared {
    fn finish_one(&self) {
        if self.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }

    fn queue_depth(&self) -> usize {
        self.task_tx
            .read()
            .as_ref()
            .map(|tx| tx.max_capacity() - tx.capacity())
            .unwrap_or(0)
    }
}

/// Fixed-size worker pool that executes ledger tasks against a [`TransactionService`].
///
/// Cloning is cheap and every clone drives the same pool. Tasks are taken from a bounded queue by
/// `N` workers; no ordering is guaranteed between tasks. Business failures never surface from
/// `submit`, they are recorded in the statistics and published as [`TaskResult`]s.
///
/// [`TransactionService`]: crate::domain::ports::TransactionService
#[derive(Clone)]
pub struct TransactionProcessor {
    shared: Arc<Shared>,
}

impl TransactionProcessor {
    /// Creates a stopped pool. Call [`start`](Self::start) from within a tokio runtime.
    pub fn new(
        service: TransactionServiceRef,
        config: ProcessorConfig,
        observer: ProcessingObserverRef,
    ) -> Self {
        let capacity = config.queue_capacity.max(1);
        let (task_tx, task_rx) = mpsc::channel(capacity);
        let (result_tx, result_rx) = mpsc::channel(capacity);
        let (shutdown, _) = watch::channel(false);

        Self {
            shared: Arc::new(Shared {
                service,
                observer,
                config,
                task_tx: RwLock::new(Some(task_tx)),
                task_rx: tokio::sync::Mutex::new(task_rx),
                result_tx: Mutex::new(Some(result_tx)),
                result_rx: Mutex::new(Some(result_rx)),
                stats: StatsTracker::new(),
                state: AtomicU8::new(IDLE),
                shutdown,
                workers: Mutex::new(Vec::new()),
                consumer: Mutex::new(None),
                pending: AtomicUsize::new(0),
                idle: Notify::new(),
            }),
        }
    }

    /// Spawns the pool workers and the result consumer.
    pub fn start(&self) -> Result<()> {
        match self.shared.state.compare_exchange(
            IDLE,
            RUNNING,
            Ordering::SeqCst,
            Ordering::SeqCst,
        ) {
            Ok(_) => {}
            Err(RUNNING) => return Err(LedgerError::AlreadyRunning),
            Err(_) => return Err(LedgerError::Closed),
        }

        let workers = self.shared.config.workers.max(1);
        info!(
            workers,
            queue_capacity = self.shared.config.queue_capacity,
            "Starting transaction processor"
        );

        let results = self.shared.result_tx.lock().clone();
        let mut handles = self.shared.workers.lock();
        for id in 0..workers {
            let worker = Worker {
                id,
                shared: self.shared.clone(),
                results: results.clone(),
                shutdown: self.shared.shutdown.subscribe(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        if let Some(rx) = self.shared.result_rx.lock().take() {
            *self.shared.consumer.lock() = Some(tokio::spawn(consume_results(rx)));
        }

        info!("Transaction processor started");
        Ok(())
    }

    /// Stops the pool: workers finish their current task and exit, then both queues close.
    ///
    /// Tasks still waiting in the queue are not processed; tracked submitters receive a
    /// `Closed` failure for them. Calling `stop` again is a no-op.
    pub async fn stop(&self) -> Result<()> {
        if self.shared.state.swap(STOPPED, Ordering::SeqCst) == STOPPED {
            debug!("Transaction processor already stopped");
            return Ok(());
        }
        info!("Stopping transaction processor");

        self.shared.shutdown.send_replace(true);
        let workers = std::mem::take(&mut *self.shared.workers.lock());
        for handle in workers {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker terminated abnormally");
            }
        }

        self.shared.task_tx.write().take();
        let mut queue = self.shared.task_rx.lock().await;
        queue.close();
        let mut abandoned = 0usize;
        while let Ok(job) = queue.try_recv() {
            abandoned += 1;
            if let Some(reply) = job.reply {
                let _ = reply.send(TaskResult::failure(job.task.id, LedgerError::Closed));
            }
            self.shared.finish_one();
        }
        drop(queue);
        if abandoned > 0 {
            warn!(abandoned, "Discarded queued tasks on shutdown");
        }

        self.shared.result_tx.lock().take();
        self.shared.result_rx.lock().take();
        let consumer = self.shared.consumer.lock().take();
        if let Some(consumer) = consumer
            && let Err(e) = consumer.await
        {
            error!(error = %e, "Result consumer terminated abnormally");
        }

        info!("Transaction processor stopped");
        Ok(())
    }

    /// Returns `true` between a successful `start` and the first `stop`.
    pub fn is_running(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == RUNNING
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.shared.state.load(Ordering::SeqCst) == STOPPED
    }

    /// Submits a task, waiting at most the configured submission timeout for queue space.
    pub async fn submit(&self, task: Task) -> Result<()> {
        self.enqueue(task, None, std::future::pending()).await
    }

    /// Like [`submit`](Self::submit), but gives up with `Cancelled` once `cancelled` completes.
    pub async fn submit_with_cancel<C>(&self, task: Task, cancelled: C) -> Result<()>
    where
        C: Future<Output = ()>,
    {
        self.enqueue(task, None, cancelled).await
    }

    /// Submits a task and returns a handle that resolves to its result once a worker is done.
    pub async fn submit_tracked<C>(&self, task: Task, cancelled: C) -> Result<Completion>
    where
        C: Future<Output = ()>,
    {
        let task_id = task.id.clone();
        let (tx, rx) = oneshot::channel();
        self.enqueue(task, Some(tx), cancelled).await?;
        Ok(Completion { task_id, rx })
    }

    async fn enqueue<C>(
        &self,
        task: Task,
        reply: Option<oneshot::Sender<TaskResult>>,
        cancelled: C,
    ) -> Result<()>
    where
        C: Future<Output = ()>,
    {
        task.validate()?;
        let sender = self
            .shared
            .task_tx
            .read()
            .clone()
            .ok_or(LedgerError::Closed)?;

        let task_id = task.id.clone();
        let kind = task.kind;
        let admission = Admission::new(&self.shared);
        let job = Job { task, reply };

        let outcome = match sender.try_send(job) {
            Ok(()) => Ok(()),
            Err(TrySendError::Closed(_)) => Err(LedgerError::Closed),
            Err(TrySendError::Full(job)) => {
                debug!(task_id = %task_id, "Task queue full, waiting for space");
                let timeout = self.shared.config.submit_timeout();
                tokio::select! {
                    sent = tokio::time::timeout(timeout, sender.send(job)) => match sent {
                        Ok(Ok(())) => Ok(()),
                        Ok(Err(_)) => Err(LedgerError::Closed),
                        Err(_) => Err(LedgerError::QueueFull),
                    },
                    _ = cancelled => Err(LedgerError::Cancelled),
                }
            }
        };

        match outcome {
            Ok(()) => {
                admission.accept();
                let depth = self.shared.queue_depth();
                debug!(task_id = %task_id, queue_depth = depth, "Task submitted to queue");
                self.shared.observer.task_submitted(kind, depth);
                Ok(())
            }
            Err(e) => {
                warn!(task_id = %task_id, error = %e, "Task submission rejected");
                Err(e)
            }
        }
    }

    /// Consistent snapshot of the processing statistics.
    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot(self.shared.queue_depth())
    }

    /// Evaluates the current statistics against `thresholds`.
    pub fn health(&self, thresholds: &HealthThresholds) -> HealthReport {
        self.stats().health(thresholds)
    }

    /// Returns the settings the pool was created with.
    pub fn config(&self) -> &ProcessorConfig {
        &self.shared.config
    }

    /// Resolves once every accepted task has been processed or discarded.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.shared.idle.notified();
            if self.shared.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

/// Pending-count reservation for a submission in progress.
///
/// Dropping it without `accept` (rejection, or the submit future being dropped) releases the slot.
struct Admission<'a> {
    shared: &'a Shared,
    accepted: bool,
}

impl<'a> Admission<'a> {
    fn new(shared: &'a Shared) -> Self {
        shared.pending.fetch_add(1, Ordering::SeqCst);
        Self {
            shared,
            accepted: false,
        }
    }

    fn accept(mut self) {
        self.accepted = true;
    }
}

impl Drop for Admission<'_> {
    fn drop(&mut self) {
        if !self.accepted {
            self.shared.finish_one();
        }
    }
}

/// Handle to the eventual result of a tracked submission.
#[derive(Debug)]
pub struct Completion {
    task_id: String,
    rx: oneshot::Receiver<TaskResult>,
}

impl Completion {
    /// Identifier of the submitted task.
    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    /// Waits for the worker's result; a task discarded by `stop` resolves to a `Closed` failure.
    pub async fn wait(self) -> TaskResult {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => TaskResult::failure(self.task_id, LedgerError::Closed),
        }
    }
}

struct Worker {
    id: usize,
    shared: Arc<Shared>,
    results: Option<mpsc::Sender<TaskResult>>,
    shutdown: watch::Receiver<bool>,
}

impl Worker {
    async fn run(mut self) {
        debug!(worker_id = self.id, "Worker started");
        loop {
            if *self.shutdown.borrow() {
                break;
            }
            let job = tokio::select! {
                biased;
                _ = self.shutdown.changed() => break,
                job = next_job(&self.shared.task_rx) => job,
            };
            match job {
                Some(job) => self.process(job).await,
                None => break,
            }
        }
        debug!(worker_id = self.id, "Worker stopping");
    }

    async fn process(&self, job: Job) {
        let Job { task, reply } = job;
        let started = Instant::now();
        let outcome = {
            let _active = self.shared.stats.enter_worker();
            dispatch(&self.shared.service, &task).await
        };
        let elapsed = started.elapsed();

        let result = match outcome {
            Ok(()) => {
                debug!(task_id = %task.id, worker_id = self.id, "Task processed successfully");
                TaskResult::success(&task.id)
            }
            Err(e) => {
                debug!(task_id = %task.id, worker_id = self.id, error = %e, "Task processing failed");
                TaskResult::failure(&task.id, e)
            }
        };

        self.shared.stats.record(result.success, elapsed);
        self.shared
            .observer
            .task_processed(task.kind, elapsed, result.success);

        if let Some(reply) = reply {
            let _ = reply.send(result.clone());
        }
        if let Some(results) = &self.results {
            match results.try_send(result) {
                Ok(()) => {}
                Err(TrySendError::Full(result)) | Err(TrySendError::Closed(result)) => {
                    warn!(task_id = %result.task_id, "Result queue full, dropping result");
                    self.shared.observer.result_dropped(&result);
                }
            }
        }

        self.shared.finish_one();
    }
}

async fn next_job(queue: &tokio::sync::Mutex<mpsc::Receiver<Job>>) -> Option<Job> {
    queue.lock().await.recv().await
}

/// Routes a task to the collaborator.
///
/// The call runs on its own tokio task so that a panicking collaborator turns into a failed
/// result instead of taking the worker down.
async fn dispatch(service: &TransactionServiceRef, task: &Task) -> Result<()> {
    let amount = Amount::new(task.amount)?;
    let service = service.clone();
    let user = task.user_id;

    let call = match task.kind {
        TaskKind::Credit => tokio::spawn(async move { service.credit(user, amount).await }),
        TaskKind::Debit => tokio::spawn(async move { service.debit(user, amount).await }),
        TaskKind::Transfer => {
            let Some(to) = task.counterparty_id else {
                return Err(LedgerError::InvalidTask(
                    "transfer requires counterparty_id".to_string(),
                ));
            };
            tokio::spawn(async move { service.transfer(user, to, amount).await })
        }
    };

    match call.await {
        Ok(outcome) => outcome,
        Err(e) if e.is_panic() => Err(LedgerError::Panicked(panic_message(e.into_panic()))),
        Err(_) => Err(LedgerError::Panicked(
            "transaction service call was cancelled".to_string(),
        )),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

async fn consume_results(mut results: mpsc::Receiver<TaskResult>) {
    while let Some(result) = results.recv().await {
        if result.success {
            debug!(task_id = %result.task_id, "Task completed successfully");
        } else {
            warn!(task_id = %result.task_id, error = %result.message, "Task failed");
        }
    }
    debug!("Result consumer finished");
}
