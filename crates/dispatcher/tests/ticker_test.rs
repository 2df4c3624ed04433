use std::sync::Arc;
use std::time::Duration;

use alerting_core::{Clock, InstantClock, SchedulerOffset, Tick};
use alerting_dispatcher::Ticker;
use alerting_testing_utils::at;
use tokio::sync::mpsc;

async fn take(ticks: &mut mpsc::Receiver<Tick>, n: usize) -> Vec<i64> {
    let mut out = Vec::with_capacity(n);
    for _ in 0..n {
        out.push(ticks.recv().await.unwrap().data_until.timestamp());
    }
    out
}

fn assert_contiguous(timestamps: &[i64]) {
    for pair in timestamps.windows(2) {
        assert_eq!(pair[1], pair[0] + 1, "ticks not contiguous: {timestamps:?}");
    }
}

#[tokio::test(start_paused = true)]
async fn test_ticks_are_contiguous_and_catch_up() {
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (_handle, mut ticks, _join) =
        Ticker::spawn(clock.clone(), at(990), SchedulerOffset::from_secs(0), 4);

    let timestamps = take(&mut ticks, 15).await;
    assert_eq!(timestamps.first(), Some(&991));
    assert_eq!(timestamps.last(), Some(&1_005));
    assert_contiguous(&timestamps);
    // 10 个积压的 tick 立即补发，其余逐秒产生
    assert_eq!(clock.now().timestamp(), 1_005);
}

#[tokio::test(start_paused = true)]
async fn test_tick_not_emitted_before_deadline() {
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (_handle, mut ticks, _join) =
        Ticker::spawn(clock.clone(), at(1_000), SchedulerOffset::from_secs(3), 4);

    for expected in 1_001..=1_003 {
        let tick = ticks.recv().await.unwrap();
        assert_eq!(tick.data_until.timestamp(), expected);
        assert_eq!(tick.execute_at.timestamp(), expected + 3);
        assert!(clock.now() >= tick.execute_at);
    }
}

#[tokio::test(start_paused = true)]
async fn test_offset_change_never_skips_a_second() {
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (handle, mut ticks, _join) =
        Ticker::spawn(clock.clone(), at(1_000), SchedulerOffset::from_secs(0), 16);

    let first = ticks.recv().await.unwrap();
    assert_eq!(first.data_until.timestamp(), 1_001);

    // 增大偏移：下一个 tick 推迟，但仍然是 1002
    handle.set_offset(SchedulerOffset::from_secs(5));
    let delayed = ticks.recv().await.unwrap();
    assert_eq!(delayed.data_until.timestamp(), 1_002);
    assert_eq!(delayed.execute_at.timestamp(), 1_007);
    assert!(clock.now().timestamp() >= 1_007);

    // 减小偏移：落后的秒立即补发
    handle.set_offset(SchedulerOffset::from_secs(0));
    let mut seen = vec![1_001, 1_002];
    seen.extend(take(&mut ticks, 5).await);
    assert_contiguous(&seen);
    assert_eq!(clock.now().timestamp(), 1_007);
}

#[tokio::test(start_paused = true)]
async fn test_slow_consumer_loses_no_ticks() {
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (_handle, mut ticks, _join) =
        Ticker::spawn(clock.clone(), at(1_000), SchedulerOffset::from_secs(0), 1);

    tokio::time::sleep(Duration::from_secs(10)).await;

    let timestamps = take(&mut ticks, 12).await;
    assert_eq!(timestamps[0], 1_001);
    assert_contiguous(&timestamps);
}

#[tokio::test(start_paused = true)]
async fn test_stops_when_receiver_dropped() {
    let clock = Arc::new(InstantClock::starting_at_unix(1_000));
    let (_handle, ticks, join) =
        Ticker::spawn(clock, at(990), SchedulerOffset::from_secs(0), 1);

    drop(ticks);
    tokio::time::timeout(Duration::from_secs(5), join)
        .await
        .unwrap()
        .unwrap();
}
