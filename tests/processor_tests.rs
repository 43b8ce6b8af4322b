use common::{PanickingService, StubService, eventually, pool_config};
use ledger_pool::application::processor::TransactionProcessor;
use ledger_pool::domain::ports::NoopObserver;
use ledger_pool::domain::task::Task;
use ledger_pool::error::LedgerError;
use ledger_pool::infrastructure::metrics::InMemoryMetrics;
use rust_decimal_macros::dec;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

mod common;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_thousand_concurrent_credits() {
    let service = Arc::new(StubService::new());
    let pool = TransactionProcessor::new(
        service.clone(),
        pool_config(5, 100, 5_000),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    let mut submitters = Vec::new();
    for _ in 0..10 {
        let pool = pool.clone();
        submitters.push(tokio::spawn(async move {
            for _ in 0..100 {
                pool.submit(Task::credit(1, dec!(1))).await.unwrap();
            }
        }));
    }
    for submitter in submitters {
        submitter.await.unwrap();
    }

    tokio::time::timeout(Duration::from_secs(10), pool.wait_idle())
        .await
        .expect("pool did not drain");

    let stats = pool.stats();
    assert_eq!(stats.total_processed, 1000);
    assert_eq!(stats.successful, 1000);
    assert_eq!(stats.failed, 0);
    assert_eq!(stats.queue_depth, 0);
    assert_eq!(stats.active_workers, 0);
    assert_eq!(service.calls(), 1000);

    pool.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_active_workers_stay_within_pool_size() {
    let workers = 3;
    let pool = TransactionProcessor::new(
        Arc::new(StubService::slow(Duration::from_millis(2))),
        pool_config(workers, 50, 5_000),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    let done = Arc::new(AtomicBool::new(false));
    let sampler = {
        let pool = pool.clone();
        let done = done.clone();
        tokio::spawn(async move {
            let mut peak = 0;
            while !done.load(Ordering::SeqCst) {
                let stats = pool.stats();
                assert!(stats.active_workers <= workers);
                assert!(stats.successful + stats.failed <= stats.total_processed);
                peak = peak.max(stats.active_workers);
                tokio::task::yield_now().await;
            }
            peak
        })
    };

    for i in 0..200 {
        pool.submit(Task::credit(i, dec!(1))).await.unwrap();
    }
    pool.wait_idle().await;
    done.store(true, Ordering::SeqCst);

    let peak = sampler.await.unwrap();
    assert!(peak >= 1);
    let stats = pool.stats();
    assert_eq!(stats.successful + stats.failed, stats.total_processed);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_non_positive_amount_never_reaches_collaborator() {
    let service = Arc::new(StubService::new());
    let pool = TransactionProcessor::new(
        service.clone(),
        pool_config(2, 10, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    for amount in [dec!(0), dec!(-0.01), dec!(-100)] {
        let result = pool.submit(Task::credit(1, amount)).await;
        assert!(matches!(result, Err(LedgerError::InvalidTask(_))));
    }
    let result = pool.submit(Task::credit(1, dec!(1)).with_id("")).await;
    assert!(matches!(result, Err(LedgerError::InvalidTask(_))));

    pool.wait_idle().await;
    assert_eq!(service.calls(), 0);
    assert_eq!(pool.stats().total_processed, 0);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_transfer_without_counterparty_fails_in_worker() {
    let service = Arc::new(StubService::new());
    let pool = TransactionProcessor::new(
        service.clone(),
        pool_config(1, 10, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    let mut task = Task::transfer(1, 2, dec!(5));
    task.counterparty_id = None;

    let completion = pool
        .submit_tracked(task, std::future::pending())
        .await
        .expect("structurally valid submission");
    let result = completion.wait().await;

    assert!(!result.success);
    assert!(matches!(result.error, Some(LedgerError::InvalidTask(_))));
    assert_eq!(service.calls(), 0);
    let stats = pool.stats();
    assert_eq!(stats.failed, 1);
    assert_eq!(stats.total_processed, 1);

    pool.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_full_queue_times_out() {
    let pool = TransactionProcessor::new(
        Arc::new(StubService::slow(Duration::from_millis(800))),
        pool_config(1, 1, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    // Occupy the only worker, then the only queue slot.
    pool.submit(Task::credit(1, dec!(1))).await.unwrap();
    assert!(eventually(|| pool.stats().active_workers == 1, Duration::from_secs(2)).await);
    pool.submit(Task::credit(2, dec!(1))).await.unwrap();

    let started = Instant::now();
    let result = pool.submit(Task::credit(3, dec!(1))).await;
    let waited = started.elapsed();

    assert_eq!(result, Err(LedgerError::QueueFull));
    assert!(waited >= Duration::from_millis(90), "waited {:?}", waited);
    assert!(waited < Duration::from_millis(700), "waited {:?}", waited);

    pool.stop().await.unwrap();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_caller_cancellation_while_queue_full() {
    let pool = TransactionProcessor::new(
        Arc::new(StubService::slow(Duration::from_millis(500))),
        pool_config(1, 1, 5_000),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    pool.submit(Task::credit(1, dec!(1))).await.unwrap();
    assert!(eventually(|| pool.stats().active_workers == 1, Duration::from_secs(2)).await);
    pool.submit(Task::credit(2, dec!(1))).await.unwrap();

    let result = pool
        .submit_with_cancel(
            Task::credit(3, dec!(1)),
            tokio::time::sleep(Duration::from_millis(30)),
        )
        .await;
    assert_eq!(result, Err(LedgerError::Cancelled));

    pool.stop().await.unwrap();
    // The cancelled submission must not leave a phantom pending task behind.
    tokio::time::timeout(Duration::from_secs(1), pool.wait_idle())
        .await
        .unwrap();
}

#[tokio::test]
async fn test_stop_is_idempotent() {
    let pool = TransactionProcessor::new(
        Arc::new(StubService::new()),
        pool_config(3, 10, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();
    pool.submit(Task::credit(1, dec!(1))).await.unwrap();
    pool.wait_idle().await;

    pool.stop().await.unwrap();
    pool.stop().await.unwrap();

    assert!(!pool.is_running());
    assert_eq!(
        pool.submit(Task::credit(1, dec!(1))).await,
        Err(LedgerError::Closed)
    );
    assert_eq!(pool.stats().total_processed, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_stop_waits_for_in_flight_task() {
    let service = Arc::new(StubService::slow(Duration::from_millis(150)));
    let pool = TransactionProcessor::new(
        service.clone(),
        pool_config(1, 10, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    pool.submit(Task::credit(1, dec!(1))).await.unwrap();
    assert!(eventually(|| pool.stats().active_workers == 1, Duration::from_secs(2)).await);

    pool.stop().await.unwrap();
    let stats = pool.stats();
    assert_eq!(stats.total_processed, 1);
    assert_eq!(stats.successful, 1);
    assert_eq!(stats.active_workers, 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_panicking_collaborator_does_not_kill_worker() {
    let service = Arc::new(PanickingService::default());
    let pool = TransactionProcessor::new(
        service.clone(),
        pool_config(1, 10, 100),
        Arc::new(NoopObserver),
    );
    pool.start().unwrap();

    let boom = pool
        .submit_tracked(Task::debit(1, dec!(1)), std::future::pending())
        .await
        .unwrap();
    let fine = pool
        .submit_tracked(Task::credit(1, dec!(1)), std::future::pending())
        .await
        .unwrap();

    let boom = boom.wait().await;
    assert_eq!(
        boom.error,
        Some(LedgerError::Panicked("ledger exploded".to_string()))
    );
    assert!(fine.wait().await.success);

    let stats = pool.stats();
    assert_eq!(stats.total_processed, 2);
    assert_eq!(stats.failed, 1);

    pool.stop().await.unwrap();
}

#[tokio::test]
async fn test_observer_sees_submissions_and_outcomes() {
    let service = Arc::new(StubService {
        broke_user: Some(9),
        ..StubService::default()
    });
    let metrics = Arc::new(InMemoryMetrics::new());
    let pool = TransactionProcessor::new(service, pool_config(2, 10, 100), metrics.clone());
    pool.start().unwrap();

    pool.submit(Task::credit(1, dec!(3))).await.unwrap();
    pool.submit(Task::debit(9, dec!(1))).await.unwrap();
    pool.submit(Task::transfer(1, 2, dec!(1))).await.unwrap();
    pool.wait_idle().await;
    pool.stop().await.unwrap();

    let snapshot = metrics.snapshot();
    assert_eq!(snapshot.submitted, 3);
    assert_eq!(snapshot.by_kind["credit"].success, 1);
    assert_eq!(snapshot.by_kind["debit"].failure, 1);
    assert_eq!(snapshot.by_kind["transfer"].success, 1);
    assert_eq!(snapshot.dropped_results, 0);
}
