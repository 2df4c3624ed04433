use std::sync::Arc;

use alerting_core::{
    config::ClusterConfig, AlertEngine, AlertRecord, AlertingState, AlertingStatus, Clock,
    ClusterRegistry,
    DispatcherTask, DispatcherTaskStatus, MissingAlertsCheckIn, RunType, SchedulerError,
    SchedulerResult, StructuredLogger,
};
use alerting_infrastructure::MetricsCollector;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// 当前时间所在的心跳区间，对齐到 `period` 的整数倍
pub fn heartbeat_interval(now: i64, period: i64) -> i64 {
    now.div_euclid(period) * period
}

/// 协调器状态机
///
/// 由协调器的节拍循环独占持有，每个步骤都可以单独调用。
pub struct StateMachine {
    node_id: String,
    registry: Arc<dyn ClusterRegistry>,
    engine: Arc<dyn AlertEngine>,
    clock: Arc<dyn Clock>,
    config: ClusterConfig,
    tasks: mpsc::Sender<DispatcherTask>,
    metrics: MetricsCollector,
    state: AlertingState,
    /// 当前缺失告警运行认领的记录，任务失败时归还
    claimed: Vec<AlertRecord>,
}

impl StateMachine {
    pub fn new(
        node_id: impl Into<String>,
        registry: Arc<dyn ClusterRegistry>,
        engine: Arc<dyn AlertEngine>,
        clock: Arc<dyn Clock>,
        config: ClusterConfig,
        tasks: mpsc::Sender<DispatcherTask>,
    ) -> Self {
        let period = config.heartbeat_period_seconds.max(1);
        let current = heartbeat_interval(clock.now().timestamp(), period);
        let state = AlertingState {
            // 启动后从当前区间开始处理，不回溯更早的区间
            last_processed_interval: current - period,
            ..AlertingState::default()
        };

        Self {
            node_id: node_id.into(),
            registry,
            engine,
            clock,
            config,
            tasks,
            metrics: MetricsCollector::new(),
            state,
            claimed: Vec::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    pub fn state(&self) -> &AlertingState {
        &self.state
    }

    fn period(&self) -> i64 {
        self.config.heartbeat_period_seconds.max(1)
    }

    fn now(&self) -> i64 {
        self.clock.now().timestamp()
    }

    /// 在当前心跳区间登记本节点，返回该区间；同时清理保留期之前的注册表记录
    pub async fn register_heartbeat(&self) -> SchedulerResult<i64> {
        let interval = heartbeat_interval(self.now(), self.period());
        self.registry
            .register_heartbeat(&self.node_id, interval)
            .await?;

        let horizon = interval - self.config.history_retention_periods.max(1) * self.period();
        let pruned = self.registry.prune_history(horizon).await?;
        if pruned > 0 {
            debug!("清理了 {} 条早于 {} 的心跳记录", pruned, horizon);
        }

        let active = self
            .registry
            .get_active_node_count(interval - self.period())
            .await?;
        debug!(
            "节点 {} 心跳区间 {}，活跃节点 {}",
            self.node_id, interval, active
        );
        Ok(interval)
    }

    /// 调度决策
    ///
    /// READY 时发现更新的心跳区间则派发分区任务；PROCESSING 且作业队列清空时回到 READY。
    /// 其它状态下不做任何事，重复调用不会重复派发。
    pub async fn check_status(&mut self) -> SchedulerResult<()> {
        match self.state.status {
            AlertingStatus::Ready => self.schedule_latest_interval().await,
            AlertingStatus::Scheduling => Ok(()),
            AlertingStatus::Processing => {
                let pending = self.engine.pending_jobs();
                if pending > 0 {
                    debug!("节点 {} 仍有 {} 个作业待执行", self.node_id, pending);
                    return Ok(());
                }
                self.finish_processing().await
            }
        }
    }

    async fn schedule_latest_interval(&mut self) -> SchedulerResult<()> {
        let Some(last_heartbeat) = self.registry.get_last_heartbeat().await? else {
            return Ok(());
        };
        if last_heartbeat <= self.state.last_processed_interval {
            return Ok(());
        }

        let Some(info) = self
            .registry
            .get_node_for_partition(&self.node_id, last_heartbeat)
            .await?
        else {
            debug!(
                "节点 {} 未在心跳区间 {} 登记，等待下一次心跳",
                self.node_id, last_heartbeat
            );
            return Ok(());
        };

        let task = DispatcherTask::partition(info.partition_no, info.node_count, last_heartbeat);
        self.begin(RunType::Normal, last_heartbeat, task).await
    }

    async fn finish_processing(&mut self) -> SchedulerResult<()> {
        let run_type = self.state.run_type;
        let interval = self.state.finish_processing()?;

        if let (RunType::Normal, Some(interval)) = (run_type, interval) {
            self.registry
                .mark_partition_processed(&self.node_id, interval)
                .await?;
        }
        self.transitioned(AlertingStatus::Processing, interval);
        Ok(())
    }

    /// 缺失告警检查，只在 READY 时执行
    pub async fn check_missing_alerts(&mut self) -> SchedulerResult<()> {
        if !self.state.is_ready() {
            return Ok(());
        }

        let now = self.now();
        let records = self
            .registry
            .get_missing_alerts(now - self.config.missing_alert_grace_seconds)
            .await?;
        if records.is_empty() {
            return Ok(());
        }

        let interval = heartbeat_interval(now, self.period());
        info!(
            "节点 {} 认领 {} 个缺失的分区运行",
            self.node_id,
            records.len()
        );
        self.registry
            .check_in_node_processing_missing_alerts(&MissingAlertsCheckIn {
                node_id: self.node_id.clone(),
                run_type: RunType::Missing,
                interval,
                records: records.clone(),
            })
            .await?;
        self.claimed = records.clone();

        let task = DispatcherTask::missing_alerts(records, interval);
        if let Err(e) = self.begin(RunType::Missing, interval, task).await {
            self.release_claimed().await;
            return Err(e);
        }
        Ok(())
    }

    /// 归还本节点认领的缺失告警，下一次缺失检查会重新发现它们
    async fn release_claimed(&mut self) {
        if self.claimed.is_empty() {
            return;
        }
        let records = std::mem::take(&mut self.claimed);
        match self
            .registry
            .release_missing_alerts(&self.node_id, &records)
            .await
        {
            Ok(()) => info!(
                "节点 {} 归还 {} 条缺失告警认领",
                self.node_id,
                records.len()
            ),
            Err(e) => {
                StructuredLogger::log_component_error("cluster", "release_missing_alerts", &e)
            }
        }
    }

    async fn begin(
        &mut self,
        run_type: RunType,
        interval: i64,
        task: DispatcherTask,
    ) -> SchedulerResult<()> {
        self.state.begin_scheduling(run_type, interval)?;
        self.transitioned(AlertingStatus::Ready, Some(interval));

        if self.tasks.send(task).await.is_err() {
            return Err(SchedulerError::Internal(
                "dispatcher task channel closed".to_string(),
            ));
        }
        Ok(())
    }

    /// 处理任务执行回报；缺失告警任务失败时归还认领
    pub async fn handle_task_status(
        &mut self,
        status: &DispatcherTaskStatus,
    ) -> SchedulerResult<()> {
        self.metrics
            .record_dispatch_task(status.task_type.as_str(), status.success);
        if let Some(message) = &status.error_message {
            warn!(
                "节点 {} 的 {} 分发任务失败 (区间 {}): {}",
                self.node_id, status.task_type, status.interval, message
            );
        }

        let from = self.state.status;
        self.state.apply_task_status(status)?;
        self.transitioned(from, Some(status.interval));

        if status.task_type == RunType::Missing {
            if status.success {
                self.claimed.clear();
            } else {
                self.release_claimed().await;
            }
        }
        Ok(())
    }

    fn transitioned(&self, from: AlertingStatus, interval: Option<i64>) {
        StructuredLogger::log_state_transition(
            &self.node_id,
            from,
            self.state.status,
            self.state.run_type,
            interval,
        );
        self.metrics.record_alerting_status(self.state.status);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heartbeat_interval_alignment() {
        assert_eq!(heartbeat_interval(0, 60), 0);
        assert_eq!(heartbeat_interval(59, 60), 0);
        assert_eq!(heartbeat_interval(60, 60), 60);
        assert_eq!(heartbeat_interval(1_000, 60), 960);
        assert_eq!(heartbeat_interval(-1, 60), -60);
    }
}
