use std::sync::Arc;
use std::time::Duration;

use alerting_core::{config::ExecutorConfig, CheckDefinition, CheckEvalResult, SchedulerError};
use alerting_infrastructure::JobQueue;
use alerting_testing_utils::{eventually, JobBuilder, MockCheckEvaluator, StaticSeriesSource};
use alerting_worker::{ExecutionReport, ExecutorPool, ExpressionCheckEvaluator, ThresholdEngine};
use tokio::sync::{broadcast, mpsc};

fn config(worker_count: usize) -> ExecutorConfig {
    ExecutorConfig {
        worker_count,
        worker_queue_capacity: 16,
        evaluation_timeout_seconds: 5,
        ..ExecutorConfig::default()
    }
}

async fn collect_reports(rx: &mut mpsc::Receiver<ExecutionReport>, n: usize) -> Vec<ExecutionReport> {
    let mut reports = Vec::with_capacity(n);
    for _ in 0..n {
        let report = tokio::time::timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("timed out waiting for report")
            .expect("report channel closed");
        reports.push(report);
    }
    reports
}

#[tokio::test]
async fn test_duplicates_and_stale_jobs_are_not_evaluated() {
    let queue = JobQueue::new("executor", 16);
    for ts in [0, 1, 2, 2, 1, 0] {
        assert!(queue.put(JobBuilder::new().with_monitor_id(1).at(ts).build()));
    }

    let evaluator = MockCheckEvaluator::returning(CheckEvalResult::Ok);
    let pool = ExecutorPool::new(config(4), Arc::new(evaluator.clone()));
    let stats = pool.stats();

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.run(queue.clone(), shutdown_tx.subscribe()));

    let stats_ref = stats.clone();
    assert!(
        eventually(Duration::from_secs(5), || {
            let stats = stats_ref.clone();
            async move { stats.evaluated() + stats.dropped() == 6 }
        })
        .await
    );

    assert_eq!(evaluator.call_count(), 3);
    assert_eq!(evaluator.reference_times(), vec![0, 1, 2]);
    assert_eq!(stats.duplicates(), 2);
    assert_eq!(stats.stale(), 1);

    shutdown_tx.send(()).unwrap();
    let result = handle.await.unwrap();
    assert!(matches!(result, Err(SchedulerError::Cancelled)));
}

#[tokio::test]
async fn test_same_key_from_redundant_dispatchers_is_evaluated_once() {
    let queue = JobQueue::new("executor", 64);
    let evaluator = MockCheckEvaluator::returning(CheckEvalResult::Ok);
    let (report_tx, mut report_rx) = mpsc::channel(64);
    let pool = ExecutorPool::new(config(3), Arc::new(evaluator.clone())).with_reports(report_tx);

    // 两个调度节点为同一秒各产生一份作业
    for _dispatcher in 0..2 {
        for monitor_id in 1..=5 {
            queue.put(JobBuilder::new().with_monitor_id(monitor_id).at(100).build());
        }
    }

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.run(queue.clone(), shutdown_tx.subscribe()));

    let reports = collect_reports(&mut report_rx, 5).await;
    let mut keys: Vec<String> = reports.iter().map(|r| r.job.key.clone()).collect();
    keys.sort();
    assert_eq!(keys, vec!["1-1", "1-2", "1-3", "1-4", "1-5"]);

    assert!(
        eventually(Duration::from_secs(5), || {
            let queue = queue.clone();
            async move { queue.is_empty() }
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(evaluator.call_count(), 5);

    shutdown_tx.send(()).unwrap();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_invalid_expression_is_reported_and_worker_keeps_running() {
    let queue = JobQueue::new("executor", 16);
    let evaluator = MockCheckEvaluator::invalid_expression();
    let (report_tx, mut report_rx) = mpsc::channel(16);
    let pool = ExecutorPool::new(config(1), Arc::new(evaluator.clone())).with_reports(report_tx);
    let stats = pool.stats();

    queue.put(JobBuilder::new().with_monitor_id(1).at(10).build());
    queue.put(JobBuilder::new().with_monitor_id(2).at(10).build());

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.run(queue.clone(), shutdown_tx.subscribe()));

    let reports = collect_reports(&mut report_rx, 2).await;
    for report in &reports {
        assert_eq!(report.result, CheckEvalResult::Unknown);
        assert!(report.error.as_deref().unwrap().contains("bad("));
    }
    assert_eq!(stats.configuration_errors(), 2);
    assert_eq!(stats.unknown(), 2);

    shutdown_tx.send(()).unwrap();
    let _ = handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_evaluation_timeout_yields_unknown() {
    let queue = JobQueue::new("executor", 16);
    let evaluator = MockCheckEvaluator::returning(CheckEvalResult::Critical)
        .with_delay(Duration::from_secs(60));
    let (report_tx, mut report_rx) = mpsc::channel(16);
    let pool = ExecutorPool::new(config(1), Arc::new(evaluator)).with_reports(report_tx);

    queue.put(JobBuilder::new().at(10).build());

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.run(queue.clone(), shutdown_tx.subscribe()));

    let report = report_rx.recv().await.unwrap();
    assert_eq!(report.result, CheckEvalResult::Unknown);
    assert!(report.error.unwrap().contains("超时"));

    shutdown_tx.send(()).unwrap();
    let _ = handle.await.unwrap();
}

#[tokio::test]
async fn test_threshold_evaluation_through_the_pool() {
    let source = StaticSeriesSource::new().with_values("X", &[&[150.0]]);
    let evaluator = ExpressionCheckEvaluator::new(
        Arc::new(ThresholdEngine::default()),
        Arc::new(source.clone()),
    );
    let queue = JobQueue::new("executor", 16);
    let (report_tx, mut report_rx) = mpsc::channel(16);
    let pool = ExecutorPool::new(config(2), Arc::new(evaluator)).with_reports(report_tx);

    let job = JobBuilder::new()
        .with_check(CheckDefinition::critical_only("last(X) > 100"))
        .at(500)
        .build();
    queue.put(job.clone());
    queue.put(job);

    let (shutdown_tx, _) = broadcast::channel(1);
    let handle = tokio::spawn(pool.run(queue.clone(), shutdown_tx.subscribe()));

    let report = report_rx.recv().await.unwrap();
    assert_eq!(report.result, CheckEvalResult::Critical);
    assert!(report.error.is_none());

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(report_rx.try_recv().is_err());
    assert_eq!(source.fetch_count(), 1);

    shutdown_tx.send(()).unwrap();
    let _ = handle.await.unwrap();
}
