//! 调度 Ticker
//!
//! 每秒产生一个 `Tick`，`data_until` 严格逐秒递增，从不跳过。
//! 截止时间按绝对时间戳计算；偏移更新通过 watch 通道打断睡眠。

use std::sync::Arc;
use std::time::Duration;

use alerting_core::{clock::truncate_to_second, Clock, SchedulerOffset, Tick};
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

/// 运行中的 Ticker 的控制端
#[derive(Debug, Clone)]
pub struct TickerHandle {
    offset: Arc<watch::Sender<SchedulerOffset>>,
}

impl TickerHandle {
    /// 更新偏移，立即唤醒正在睡眠的 Ticker
    pub fn set_offset(&self, offset: impl Into<SchedulerOffset>) {
        let offset = offset.into();
        self.offset.send_if_modified(|current| {
            if *current == offset {
                false
            } else {
                *current = offset;
                true
            }
        });
    }

    pub fn offset(&self) -> SchedulerOffset {
        *self.offset.borrow()
    }
}

pub struct Ticker;

impl Ticker {
    /// 启动 Ticker，从 `last_processed` 的下一秒开始产生 tick
    ///
    /// 所有 `TickerHandle` 被丢弃或接收端关闭后 Ticker 退出。
    pub fn spawn(
        clock: Arc<dyn Clock>,
        last_processed: DateTime<Utc>,
        offset: SchedulerOffset,
        capacity: usize,
    ) -> (TickerHandle, mpsc::Receiver<Tick>, JoinHandle<()>) {
        let (offset_tx, offset_rx) = watch::channel(offset);
        let (tick_tx, tick_rx) = mpsc::channel(capacity.max(1));

        let last_processed = truncate_to_second(last_processed);
        info!(
            "Ticker 启动: last_processed={}, offset={}",
            last_processed, offset
        );
        let join = tokio::spawn(run(clock, last_processed, offset_rx, tick_tx));

        (
            TickerHandle {
                offset: Arc::new(offset_tx),
            },
            tick_rx,
            join,
        )
    }
}

async fn run(
    clock: Arc<dyn Clock>,
    mut last: DateTime<Utc>,
    mut offset_rx: watch::Receiver<SchedulerOffset>,
    ticks: mpsc::Sender<Tick>,
) {
    let one_second = ChronoDuration::seconds(1);

    loop {
        let offset = *offset_rx.borrow_and_update();
        let next = last + one_second;
        let now = clock.now();

        if now - offset.as_chrono() >= next {
            // 消费端慢时在这里阻塞，不丢 tick
            if ticks.send(Tick::new(next, offset)).await.is_err() {
                debug!("Tick 接收端已关闭，Ticker 退出");
                return;
            }
            last = next;
            continue;
        }

        let deadline = next + offset.as_chrono();
        let wait = (deadline - now).to_std().unwrap_or(Duration::ZERO);

        tokio::select! {
            _ = tokio::time::sleep(wait) => {}
            changed = offset_rx.changed() => {
                if changed.is_err() {
                    debug!("Ticker 控制端已全部释放，Ticker 退出");
                    return;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_core::InstantClock;

    #[tokio::test(start_paused = true)]
    async fn test_first_tick_waits_for_offset() {
        let clock = Arc::new(InstantClock::starting_at_unix(1_000));
        let start = clock.now() - ChronoDuration::seconds(10);
        let (_handle, mut ticks, _join) =
            Ticker::spawn(clock.clone(), start, SchedulerOffset::from_secs(10), 4);

        let tick = ticks.recv().await.unwrap();
        assert_eq!(tick.data_until.timestamp(), 991);
        assert_eq!(tick.execute_at.timestamp(), 1_001);
        assert!(clock.now().timestamp() >= 1_001);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_when_handles_dropped() {
        let clock = Arc::new(InstantClock::starting_at_unix(1_000));
        let (handle, mut ticks, join) =
            Ticker::spawn(clock.clone(), clock.now(), SchedulerOffset::from_secs(0), 4);

        drop(handle);
        assert!(ticks.recv().await.is_none());
        join.await.unwrap();
    }
}
