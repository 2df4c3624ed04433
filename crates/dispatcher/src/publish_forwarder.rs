use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alerting_core::{
    config::PublisherConfig, Job, JobPublisher, SchedulerError, SchedulerResult,
};
use alerting_infrastructure::{JobQueue, MetricsCollector};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

#[derive(Debug, Default)]
pub struct ForwarderStats {
    published: AtomicU64,
    dropped: AtomicU64,
}

impl ForwarderStats {
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// 重试耗尽后放弃的作业数
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// 路由键：`<prefix>.<monitor_id>`
pub fn routing_key(prefix: &str, monitor_id: i64) -> String {
    format!("{prefix}.{monitor_id}")
}

/// 从发布队列取作业，转发到外部消息总线
///
/// 失败按固定间隔重试，最多 `max_attempts` 次；生产者只经由非阻塞的作业队列与它交互。
pub struct PublishForwarder {
    publisher: Arc<dyn JobPublisher>,
    queue: JobQueue,
    routing_key_prefix: String,
    retry_backoff: Duration,
    max_attempts: u32,
    stats: Arc<ForwarderStats>,
    metrics: MetricsCollector,
}

impl PublishForwarder {
    pub fn new(publisher: Arc<dyn JobPublisher>, queue: JobQueue, config: &PublisherConfig) -> Self {
        Self {
            publisher,
            queue,
            routing_key_prefix: config.routing_key_prefix.clone(),
            retry_backoff: Duration::from_millis(config.retry_backoff_ms),
            max_attempts: config.max_attempts.max(1),
            stats: Arc::new(ForwarderStats::default()),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn stats(&self) -> Arc<ForwarderStats> {
        Arc::clone(&self.stats)
    }

    pub async fn forward(&self, job: &Job) -> SchedulerResult<()> {
        let key = routing_key(&self.routing_key_prefix, job.monitor_id);
        let mut last_error = None;

        for attempt in 1..=self.max_attempts {
            match self.publisher.publish(&key, job).await {
                Ok(()) => {
                    self.metrics.record_publish(true);
                    self.stats.published.fetch_add(1, Ordering::Relaxed);
                    debug!("作业 {} 已发布, routing_key={}", job.key, key);
                    return Ok(());
                }
                Err(e) => {
                    self.metrics.record_publish(false);
                    warn!(
                        "发布作业 {} 失败 (第 {}/{} 次): {}",
                        job.key, attempt, self.max_attempts, e
                    );
                    last_error = Some(e);
                    if attempt < self.max_attempts {
                        tokio::time::sleep(self.retry_backoff).await;
                    }
                }
            }
        }

        self.stats.dropped.fetch_add(1, Ordering::Relaxed);
        self.metrics.record_publish_dropped();
        let message = last_error.map_or_else(|| "unknown".to_string(), |e| e.to_string());
        error!(
            job.key = %job.key,
            routing_key = %key,
            attempts = self.max_attempts,
            error = %message,
            "发布重试耗尽，丢弃作业"
        );
        Err(SchedulerError::MessageBus(format!(
            "publish {} failed after {} attempts: {message}",
            job.key, self.max_attempts
        )))
    }

    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> SchedulerResult<()> {
        info!("发布转发器已启动, 队列 {}", self.queue.name());
        loop {
            tokio::select! {
                _ = shutdown.recv() => return Err(SchedulerError::Cancelled),
                job = self.queue.recv() => {
                    let Some(job) = job else { return Ok(()) };
                    // 错误已在 forward 内记录
                    let _ = self.forward(&job).await;
                }
            }
        }
    }
}
