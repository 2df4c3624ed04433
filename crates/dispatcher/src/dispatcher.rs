//! Tick 分发器
//!
//! 每个 tick 查询一次到期的调度定义，每个定义生成一个作业放入作业队列。
//! Ticker 输出先转入内部缓冲区，查询慢时 Ticker 本身不会错过 tick。

use std::sync::Arc;

use alerting_core::{
    Clock, Job, ScheduleRepository, SchedulerError, SchedulerResult, StructuredLogger, Tick,
};
use alerting_infrastructure::{JobQueue, MetricsCollector};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// 内部 tick 缓冲区默认容量，约一小时的积压；`scheduler.dispatch_buffer_capacity` 覆盖
pub const DEFAULT_TICK_BUFFER: usize = 3600;

pub struct Dispatcher {
    repository: Arc<dyn ScheduleRepository>,
    queue: JobQueue,
    publish_queue: Option<JobQueue>,
    clock: Arc<dyn Clock>,
    tick_buffer: usize,
    metrics: MetricsCollector,
}

impl Dispatcher {
    pub fn new(
        repository: Arc<dyn ScheduleRepository>,
        queue: JobQueue,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            repository,
            queue,
            publish_queue: None,
            clock,
            tick_buffer: DEFAULT_TICK_BUFFER,
            metrics: MetricsCollector::new(),
        }
    }

    /// 同时把作业放入发布队列，转发到外部消息总线
    pub fn with_publish_queue(mut self, queue: JobQueue) -> Self {
        self.publish_queue = Some(queue);
        self
    }

    pub fn with_tick_buffer(mut self, capacity: usize) -> Self {
        self.tick_buffer = capacity.max(1);
        self
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// 处理一个 tick，返回被执行队列接受的作业数
    pub async fn dispatch_tick(&self, tick: &Tick) -> SchedulerResult<usize> {
        let schedules = match self.repository.get_due_schedules(tick.data_until).await {
            Ok(schedules) => schedules,
            Err(e) => {
                self.metrics.record_schedule_query_failure();
                return Err(e);
            }
        };

        let now = self.clock.now();
        let mut enqueued = 0;
        for schedule in &schedules {
            let job = Job::from_schedule(schedule, tick.data_until, now);
            if let Some(publish_queue) = &self.publish_queue {
                publish_queue.put(job.clone());
            }
            if self.queue.put(job) {
                enqueued += 1;
            }
        }

        let lag = (now - tick.execute_at).to_std().unwrap_or_default();
        self.metrics.record_tick(lag);
        self.metrics.record_due_schedules(schedules.len());
        StructuredLogger::log_tick_dispatched(tick, schedules.len(), enqueued);
        Ok(enqueued)
    }

    /// 消费 tick 直到收到关闭信号（返回 `Cancelled`）或 Ticker 退出
    pub async fn run(
        &self,
        mut ticks: mpsc::Receiver<Tick>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let (buffer_tx, mut buffer) = mpsc::channel(self.tick_buffer);
        let relay = tokio::spawn(async move {
            while let Some(tick) = ticks.recv().await {
                if buffer_tx.send(tick).await.is_err() {
                    break;
                }
            }
        });
        info!("分发器已启动, 作业队列 {}", self.queue.name());

        let result = loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("分发器收到关闭信号");
                    break Err(SchedulerError::Cancelled);
                }
                tick = buffer.recv() => {
                    let Some(tick) = tick else {
                        info!("Ticker 已停止，分发器退出");
                        break Ok(());
                    };
                    // 查询失败只跳过当前 tick，下一个 tick 重新查询
                    if let Err(e) = self.dispatch_tick(&tick).await {
                        error!(
                            tick.data_until = %tick.data_until,
                            error = %e,
                            "查询到期调度失败，跳过该 tick"
                        );
                    }
                }
            }
        };

        relay.abort();
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_core::{InstantClock, SchedulerOffset};
    use alerting_testing_utils::{at, MockScheduleRepository, ScheduleBuilder};

    #[tokio::test]
    async fn test_dispatch_tick_stamps_jobs() {
        let repo = MockScheduleRepository::with_schedules(vec![
            ScheduleBuilder::new().with_monitor_id(1).with_frequency(10).build(),
            ScheduleBuilder::new().with_monitor_id(2).with_frequency(10).with_offset(5).build(),
        ]);
        let queue = JobQueue::new("executor", 8);
        let clock = Arc::new(InstantClock::starting_at_unix(1_030));
        let dispatcher = Dispatcher::new(Arc::new(repo.clone()), queue.clone(), clock);

        let tick = Tick::new(at(1_000), SchedulerOffset::from_secs(30));
        assert_eq!(dispatcher.dispatch_tick(&tick).await.unwrap(), 1);

        let job = queue.recv().await.unwrap();
        assert_eq!(job.key, "1-1");
        assert_eq!(job.timestamp(), 1_000);
        assert_eq!(job.generated_at.timestamp(), 1_030);
        assert_eq!(repo.queried_timestamps(), vec![1_000]);
    }

    #[tokio::test]
    async fn test_query_failure_is_returned_without_enqueueing() {
        let repo = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::new().build()]);
        repo.set_failing(true);
        let queue = JobQueue::new("executor", 8);
        let dispatcher = Dispatcher::new(
            Arc::new(repo),
            queue.clone(),
            Arc::new(InstantClock::starting_at_unix(0)),
        );

        let tick = Tick::new(at(60), SchedulerOffset::from_secs(0));
        assert!(dispatcher.dispatch_tick(&tick).await.is_err());
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_publish_queue_receives_copies() {
        let repo = MockScheduleRepository::with_schedules(vec![ScheduleBuilder::new().build()]);
        let queue = JobQueue::new("executor", 8);
        let publish = JobQueue::new("publish", 8);
        let dispatcher = Dispatcher::new(
            Arc::new(repo),
            queue.clone(),
            Arc::new(InstantClock::starting_at_unix(0)),
        )
        .with_publish_queue(publish.clone());

        dispatcher
            .dispatch_tick(&Tick::new(at(120), SchedulerOffset::from_secs(0)))
            .await
            .unwrap();
        assert_eq!(queue.len(), 1);
        assert_eq!(publish.len(), 1);
    }
}
