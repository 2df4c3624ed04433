//! 告警调度的指标采集
//!
//! 只通过 `metrics` 门面记录，导出器由宿主进程决定；未安装 recorder 时所有调用都是空操作。

use std::sync::Arc;
use std::time::Duration;

use alerting_core::{AlertingStatus, CheckEvalResult};
use metrics::{counter, gauge, histogram};

#[derive(Debug, Clone)]
pub struct MetricsCollector {
    node_id: Arc<str>,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsCollector {
    pub fn new() -> Self {
        Self::for_node("local")
    }

    pub fn for_node(node_id: impl Into<String>) -> Self {
        let node_id: String = node_id.into();
        Self {
            node_id: node_id.into(),
        }
    }

    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    // Ticker / Dispatcher

    pub fn record_tick(&self, lag: Duration) {
        counter!("alerting_ticks_total", "node" => self.node_id.to_string()).increment(1);
        histogram!("alerting_tick_lag_seconds", "node" => self.node_id.to_string())
            .record(lag.as_secs_f64());
    }

    pub fn record_due_schedules(&self, count: usize) {
        counter!("alerting_due_schedules_total", "node" => self.node_id.to_string())
            .increment(count as u64);
    }

    pub fn record_schedule_query_failure(&self) {
        counter!("alerting_schedule_query_failures_total", "node" => self.node_id.to_string())
            .increment(1);
    }

    pub fn record_offset(&self, offset_seconds: u64) {
        gauge!("alerting_scheduler_offset_seconds", "node" => self.node_id.to_string())
            .set(offset_seconds as f64);
    }

    // Job queues

    pub fn record_job_enqueued(&self, queue: &str) {
        counter!(
            "alerting_jobs_enqueued_total",
            "node" => self.node_id.to_string(),
            "queue" => queue.to_string()
        )
        .increment(1);
    }

    pub fn record_job_dropped(&self, queue: &str) {
        counter!(
            "alerting_jobs_dropped_total",
            "node" => self.node_id.to_string(),
            "queue" => queue.to_string()
        )
        .increment(1);
    }

    // Executor

    pub fn record_duplicate(&self) {
        counter!("alerting_jobs_duplicate_total", "node" => self.node_id.to_string()).increment(1);
    }

    pub fn record_stale(&self) {
        counter!("alerting_jobs_stale_total", "node" => self.node_id.to_string()).increment(1);
    }

    pub fn record_evaluation(&self, result: CheckEvalResult, duration: Duration) {
        counter!(
            "alerting_evaluations_total",
            "node" => self.node_id.to_string(),
            "result" => result.as_str()
        )
        .increment(1);
        histogram!("alerting_evaluation_duration_seconds", "node" => self.node_id.to_string())
            .record(duration.as_secs_f64());
    }

    pub fn record_configuration_error(&self) {
        counter!("alerting_configuration_errors_total", "node" => self.node_id.to_string())
            .increment(1);
    }

    // Publisher

    pub fn record_publish(&self, success: bool) {
        let status = if success { "success" } else { "failure" };
        counter!(
            "alerting_publish_attempts_total",
            "node" => self.node_id.to_string(),
            "status" => status
        )
        .increment(1);
    }

    pub fn record_publish_dropped(&self) {
        counter!("alerting_publish_dropped_total", "node" => self.node_id.to_string())
            .increment(1);
    }

    // Cluster

    pub fn record_alerting_status(&self, status: AlertingStatus) {
        let value = match status {
            AlertingStatus::Ready => 0.0,
            AlertingStatus::Scheduling => 1.0,
            AlertingStatus::Processing => 2.0,
        };
        gauge!("alerting_cluster_status", "node" => self.node_id.to_string()).set(value);
    }

    pub fn record_dispatch_task(&self, task_type: &str, success: bool) {
        let status = if success { "success" } else { "failure" };
        counter!(
            "alerting_dispatch_tasks_total",
            "node" => self.node_id.to_string(),
            "type" => task_type.to_string(),
            "status" => status
        )
        .increment(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = MetricsCollector::for_node("node-a");
        assert_eq!(metrics.node_id(), "node-a");
        metrics.record_tick(Duration::from_millis(5));
        metrics.record_job_dropped("executor");
        metrics.record_evaluation(CheckEvalResult::Critical, Duration::from_millis(3));
        metrics.record_alerting_status(AlertingStatus::Processing);
    }
}
