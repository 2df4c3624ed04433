use std::sync::Arc;

use alerting_core::{
    AlertEngine, Clock, DispatcherTask, DispatcherTaskKind, Job, RunType, ScheduleRepository,
    SchedulerError, SchedulerResult,
};
use alerting_infrastructure::JobQueue;
use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tracing::{debug, info};

/// 集群模式下按分区分发的告警引擎
///
/// 分区任务覆盖 `(interval - period, interval]` 内到期、且 `monitor_id % node_count == partition`
/// 的全部调度定义。
pub struct PartitionedAlertEngine {
    repository: Arc<dyn ScheduleRepository>,
    queue: JobQueue,
    publish_queue: Option<JobQueue>,
    clock: Arc<dyn Clock>,
    heartbeat_period: i64,
}

impl PartitionedAlertEngine {
    pub fn new(
        repository: Arc<dyn ScheduleRepository>,
        queue: JobQueue,
        clock: Arc<dyn Clock>,
        heartbeat_period: i64,
    ) -> Self {
        Self {
            repository,
            queue,
            publish_queue: None,
            clock,
            heartbeat_period: heartbeat_period.max(1),
        }
    }

    /// 同时把作业放入发布队列；`pending_jobs` 只统计执行队列
    pub fn with_publish_queue(mut self, queue: JobQueue) -> Self {
        self.publish_queue = Some(queue);
        self
    }

    async fn dispatch_partition(
        &self,
        partition_no: u32,
        node_count: u32,
        interval: i64,
        run_type: RunType,
    ) -> SchedulerResult<usize> {
        let now = self.clock.now();
        let mut enqueued = 0;

        for ts in (interval - self.heartbeat_period + 1)..=interval {
            let point = Utc.timestamp_opt(ts, 0).single().ok_or_else(|| {
                SchedulerError::InvariantViolated(format!("timestamp {ts} out of range"))
            })?;

            let schedules = self.repository.get_due_schedules(point).await?;
            for schedule in schedules
                .iter()
                .filter(|s| s.in_partition(partition_no, node_count))
            {
                let mut job = Job::from_schedule(schedule, point, now);
                if run_type == RunType::Missing {
                    job = job.replayed();
                }
                if let Some(publish_queue) = &self.publish_queue {
                    publish_queue.put(job.clone());
                }
                if self.queue.put(job) {
                    enqueued += 1;
                }
            }
        }

        debug!(
            "分区 {}/{} 区间 {} 入队 {} 个作业",
            partition_no, node_count, interval, enqueued
        );
        Ok(enqueued)
    }
}

#[async_trait]
impl AlertEngine for PartitionedAlertEngine {
    async fn dispatch(&self, task: &DispatcherTask) -> SchedulerResult<usize> {
        match &task.kind {
            DispatcherTaskKind::Partition {
                partition_no,
                node_count,
            } => {
                self.dispatch_partition(*partition_no, *node_count, task.interval, RunType::Normal)
                    .await
            }
            DispatcherTaskKind::MissingAlerts { records } => {
                let mut enqueued = 0;
                for record in records {
                    enqueued += self
                        .dispatch_partition(
                            record.partition_no,
                            record.node_count,
                            record.heartbeat,
                            RunType::Missing,
                        )
                        .await?;
                }
                info!(
                    "补发 {} 个缺失分区，入队 {} 个作业",
                    records.len(),
                    enqueued
                );
                Ok(enqueued)
            }
        }
    }

    fn pending_jobs(&self) -> usize {
        self.queue.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_core::{AlertRecord, InstantClock};
    use alerting_testing_utils::{MockScheduleRepository, ScheduleBuilder};

    fn engine(queue: &JobQueue) -> PartitionedAlertEngine {
        let schedules = (1..=4)
            .map(|id| ScheduleBuilder::new().with_monitor_id(id).with_frequency(30).build())
            .collect();
        PartitionedAlertEngine::new(
            Arc::new(MockScheduleRepository::with_schedules(schedules)),
            queue.clone(),
            Arc::new(InstantClock::starting_at_unix(200)),
            60,
        )
    }

    #[tokio::test]
    async fn test_partition_dispatch_filters_by_monitor_id() {
        let queue = JobQueue::new("executor", 64);
        let engine = engine(&queue);

        // (60, 120] 内到期的秒：90 和 120；分区 1/2 只含奇数 monitor
        let enqueued = engine
            .dispatch(&DispatcherTask::partition(1, 2, 120))
            .await
            .unwrap();
        assert_eq!(enqueued, 4);
        assert_eq!(engine.pending_jobs(), 4);

        let mut seen = Vec::new();
        while let Some(job) = queue.try_recv().await {
            seen.push((job.monitor_id, job.timestamp()));
        }
        seen.sort();
        assert_eq!(seen, vec![(1, 90), (1, 120), (3, 90), (3, 120)]);
    }

    #[tokio::test]
    async fn test_missing_alerts_redispatch_each_record() {
        let queue = JobQueue::new("executor", 64);
        let engine = engine(&queue);

        let records = vec![AlertRecord {
            node_id: "gone".to_string(),
            heartbeat: 60,
            partition_no: 0,
            node_count: 2,
        }];
        let enqueued = engine
            .dispatch(&DispatcherTask::missing_alerts(records, 180))
            .await
            .unwrap();
        // (0, 60] 内到期的秒：30 和 60；偶数 monitor
        assert_eq!(enqueued, 4);
        while let Some(job) = queue.try_recv().await {
            assert!(job.is_replay());
        }
    }

    #[tokio::test]
    async fn test_publish_queue_receives_copies() {
        let queue = JobQueue::new("executor", 64);
        let publish = JobQueue::new("publish", 64);
        let engine = engine(&queue).with_publish_queue(publish.clone());

        engine
            .dispatch(&DispatcherTask::partition(0, 1, 60))
            .await
            .unwrap();
        assert_eq!(queue.len(), 8);
        assert_eq!(publish.len(), 8);
        assert_eq!(engine.pending_jobs(), 8);
    }
}
