use std::sync::Arc;
use std::time::Duration;

use alerting_core::{InstantClock, SchedulerError, SchedulerOffset};
use alerting_dispatcher::{Dispatcher, Ticker};
use alerting_infrastructure::JobQueue;
use alerting_testing_utils::{at, eventually, MockScheduleRepository, ScheduleBuilder};
use tokio::sync::broadcast;

#[tokio::test(start_paused = true)]
async fn test_run_dispatches_every_tick_until_shutdown() {
    let repo = MockScheduleRepository::with_schedules(vec![
        ScheduleBuilder::new().with_monitor_id(1).with_frequency(1).build(),
        ScheduleBuilder::new().with_monitor_id(2).with_frequency(5).build(),
    ]);
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let queue = JobQueue::new("executor", 256);
    let (shutdown_tx, _) = broadcast::channel(1);

    let (_handle, ticks, _join) =
        Ticker::spawn(clock.clone(), at(990), SchedulerOffset::from_secs(0), 8);
    let dispatcher = Dispatcher::new(Arc::new(repo.clone()), queue.clone(), clock);
    let shutdown = shutdown_tx.subscribe();
    let run = tokio::spawn(async move { dispatcher.run(ticks, shutdown).await });

    let watched = repo.clone();
    assert!(eventually(Duration::from_secs(5), || {
        let watched = watched.clone();
        async move { watched.queried_timestamps().len() >= 10 }
    })
    .await);

    shutdown_tx.send(()).unwrap();
    let result = run.await.unwrap();
    assert!(matches!(result, Err(SchedulerError::Cancelled)));

    let queried = repo.queried_timestamps();
    assert_eq!(queried[..10], (991..=1_000i64).collect::<Vec<_>>()[..]);

    // 991..=1000：monitor 1 每秒一次，monitor 2 在 995 和 1000
    let mut first_ten = Vec::new();
    while let Some(job) = queue.try_recv().await {
        if job.timestamp() <= 1_000 {
            first_ten.push(job);
        }
    }
    assert_eq!(first_ten.len(), 12);
    assert_eq!(first_ten.iter().filter(|j| j.monitor_id == 2).count(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_query_failure_skips_tick_and_continues() {
    let repo = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::new()
        .with_frequency(1)
        .build()]);
    repo.set_failing(true);
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let queue = JobQueue::new("executor", 64);
    let (shutdown_tx, _) = broadcast::channel(1);

    let (_handle, ticks, _join) =
        Ticker::spawn(clock.clone(), at(1_000), SchedulerOffset::from_secs(0), 8);
    let dispatcher = Dispatcher::new(Arc::new(repo.clone()), queue.clone(), clock);
    let shutdown = shutdown_tx.subscribe();
    let run = tokio::spawn(async move { dispatcher.run(ticks, shutdown).await });

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    assert!(queue.is_empty());
    repo.set_failing(false);

    let watched = queue.clone();
    assert!(eventually(Duration::from_secs(5), || {
        let watched = watched.clone();
        async move { !watched.is_empty() }
    })
    .await);

    let job = queue.recv().await.unwrap();
    // 失败的 tick 不会重放
    assert!(job.timestamp() >= 1_004);

    shutdown_tx.send(()).unwrap();
    assert!(run.await.unwrap().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_run_returns_ok_when_ticker_stops() {
    let repo = MockScheduleRepository::new();
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (_shutdown_tx, shutdown) = broadcast::channel(1);

    let (handle, ticks, _join) =
        Ticker::spawn(clock.clone(), at(1_000), SchedulerOffset::from_secs(0), 8);
    drop(handle);

    let dispatcher = Dispatcher::new(Arc::new(repo), JobQueue::new("executor", 8), clock);
    assert!(dispatcher.run(ticks, shutdown).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_small_tick_buffer_keeps_backlog_in_order() {
    let repo = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::new()
        .with_frequency(1)
        .build()]);
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let queue = JobQueue::new("executor", 256);
    let (shutdown_tx, _) = broadcast::channel(1);

    let (_handle, ticks, _join) =
        Ticker::spawn(clock.clone(), at(970), SchedulerOffset::from_secs(0), 2);
    let dispatcher =
        Dispatcher::new(Arc::new(repo.clone()), queue.clone(), clock).with_tick_buffer(1);
    let shutdown = shutdown_tx.subscribe();
    let run = tokio::spawn(async move { dispatcher.run(ticks, shutdown).await });

    let watched = repo.clone();
    assert!(eventually(Duration::from_secs(5), || {
        let watched = watched.clone();
        async move { watched.queried_timestamps().len() >= 30 }
    })
    .await);

    shutdown_tx.send(()).unwrap();
    assert!(matches!(run.await.unwrap(), Err(SchedulerError::Cancelled)));

    // 缓冲只有一个 tick 时积压靠背压排队，不丢也不乱序
    let queried = repo.queried_timestamps();
    assert_eq!(queried[..30], (971..=1_000i64).collect::<Vec<_>>()[..]);
}
