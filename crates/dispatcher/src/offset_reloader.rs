use std::sync::Arc;
use std::time::Duration;

use alerting_core::{
    Clock, OffsetStore, SchedulerError, SchedulerOffset, SchedulerResult, StructuredLogger,
    SystemClock,
};
use alerting_infrastructure::MetricsCollector;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::ticker::TickerHandle;

/// 按固定周期从偏移存储重新加载调度偏移并推送给 Ticker
pub struct OffsetReloader {
    store: Arc<dyn OffsetStore>,
    ticker: TickerHandle,
    offset_id: String,
    interval: Duration,
    clock: Arc<dyn Clock>,
    metrics: MetricsCollector,
}

impl OffsetReloader {
    pub fn new(
        store: Arc<dyn OffsetStore>,
        ticker: TickerHandle,
        offset_id: impl Into<String>,
        interval: Duration,
    ) -> Self {
        Self {
            store,
            ticker,
            offset_id: offset_id.into(),
            interval,
            clock: Arc::new(SystemClock),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// 启动时读取持久化的偏移；不存在时写入 `default`
    pub async fn load_initial(
        store: &dyn OffsetStore,
        offset_id: &str,
        default: SchedulerOffset,
    ) -> SchedulerResult<SchedulerOffset> {
        match store.get_scheduler_offset(offset_id).await? {
            Some(raw) => raw.parse(),
            None => {
                store
                    .set_scheduler_offset(offset_id, &default.to_string())
                    .await?;
                Ok(default)
            }
        }
    }

    /// 持久化新的偏移并立即生效
    pub async fn update_offset(&self, offset: SchedulerOffset) -> SchedulerResult<()> {
        self.store
            .set_scheduler_offset(&self.offset_id, &offset.to_string())
            .await?;
        self.apply(offset);
        Ok(())
    }

    /// 读取一次并应用，返回当前生效的偏移
    pub async fn reload_once(&self) -> SchedulerResult<SchedulerOffset> {
        let Some(raw) = self.store.get_scheduler_offset(&self.offset_id).await? else {
            return Ok(self.ticker.offset());
        };
        let offset: SchedulerOffset = raw.parse()?;
        self.apply(offset);
        Ok(offset)
    }

    fn apply(&self, offset: SchedulerOffset) {
        let current = self.ticker.offset();
        if current != offset {
            StructuredLogger::log_offset_changed(
                &self.offset_id,
                current.as_secs(),
                offset.as_secs(),
                self.clock.now(),
            );
            self.ticker.set_offset(offset);
            self.metrics.record_offset(offset.as_secs());
        }
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!(
            "偏移重载已启动: id={}, 周期={:?}",
            self.offset_id, self.interval
        );
        let mut interval = tokio::time::interval(self.interval);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("偏移重载收到关闭信号");
                    return Err(SchedulerError::Cancelled);
                }
                _ = interval.tick() => {
                    if let Err(e) = self.reload_once().await {
                        warn!("重新加载调度偏移失败: {}", e);
                    }
                }
            }
        }
    }
}
