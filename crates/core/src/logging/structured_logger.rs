//! Structured logging utilities
//!
//! 调度链路上的关键事件统一从这里输出，字段名保持一致便于检索。

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use crate::models::{AlertingStatus, CheckEvalResult, Job, RunType, Tick};

pub struct StructuredLogger;

impl StructuredLogger {
    /// Log tick dispatch
    pub fn log_tick_dispatched(tick: &Tick, due: usize, enqueued: usize) {
        debug!(
            event = "tick_dispatched",
            tick.data_until = %tick.data_until,
            tick.execute_at = %tick.execute_at,
            schedules.due = due,
            jobs.enqueued = enqueued,
            "Tick dispatched"
        );
    }

    /// Log a job dropped by a full queue
    pub fn log_job_dropped(queue: &str, job: &Job, overflow_total: u64) {
        warn!(
            event = "job_dropped",
            queue = queue,
            job.key = %job.key,
            job.last_point = %job.last_point_timestamp,
            queue.overflow_total = overflow_total,
            "Job queue full, job dropped"
        );
    }

    /// Log a job skipped by the dedup window
    pub fn log_job_skipped(worker_id: usize, job: &Job, reason: &str) {
        debug!(
            event = "job_skipped",
            worker.id = worker_id,
            job.key = %job.key,
            job.last_point = job.timestamp(),
            reason = reason,
            "Job skipped"
        );
    }

    /// Log job evaluation result
    pub fn log_job_evaluated(
        worker_id: usize,
        job: &Job,
        result: CheckEvalResult,
        duration_ms: u128,
    ) {
        info!(
            event = "job_evaluated",
            worker.id = worker_id,
            job.key = %job.key,
            job.monitor_id = job.monitor_id,
            job.last_point = %job.last_point_timestamp,
            result = %result,
            duration_ms = duration_ms as u64,
            "Job evaluated"
        );
    }

    /// Log coordinator state transition
    pub fn log_state_transition(
        node_id: &str,
        from: AlertingStatus,
        to: AlertingStatus,
        run_type: RunType,
        interval: Option<i64>,
    ) {
        info!(
            event = "alerting_state_transition",
            node.id = node_id,
            state.from = %from,
            state.to = %to,
            run_type = %run_type,
            interval = ?interval,
            "Alerting state changed"
        );
    }

    /// Log offset change
    pub fn log_offset_changed(offset_id: &str, old_seconds: u64, new_seconds: u64, at: DateTime<Utc>) {
        info!(
            event = "scheduler_offset_changed",
            offset.id = offset_id,
            offset.old_seconds = old_seconds,
            offset.new_seconds = new_seconds,
            changed_at = %at,
            "Scheduler offset changed"
        );
    }

    /// Log a component error that the loop recovers from
    pub fn log_component_error(component: &str, operation: &str, error: &dyn std::error::Error) {
        error!(
            event = "component_error",
            component = component,
            operation = operation,
            error = %error,
            "Component operation failed"
        );
    }
}
