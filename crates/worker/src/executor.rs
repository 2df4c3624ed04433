//! 执行器池
//!
//! 一个路由任务从作业队列取作业，按 `hash(key) % N` 转发给固定的 worker。
//! 每个 worker 独占自己的去重窗口，同一个键的重复作业总会到达见过原作业的窗口。

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use alerting_core::{
    config::ExecutorConfig, evaluation::CheckEvaluator, CheckEvalResult, Job, SchedulerError,
    SchedulerResult, StructuredLogger,
};
use alerting_infrastructure::{JobQueue, MetricsCollector};
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};

use crate::dedup::{Admission, DedupWindow};

/// 单个作业的评估结果
#[derive(Debug, Clone)]
pub struct ExecutionReport {
    pub worker_id: usize,
    pub job: Job,
    pub result: CheckEvalResult,
    pub error: Option<String>,
    pub duration: Duration,
}

/// 执行器计数
#[derive(Debug, Default)]
pub struct ExecutorStats {
    evaluated: AtomicU64,
    duplicates: AtomicU64,
    stale: AtomicU64,
    unknown: AtomicU64,
    configuration_errors: AtomicU64,
}

impl ExecutorStats {
    pub fn evaluated(&self) -> u64 {
        self.evaluated.load(Ordering::Relaxed)
    }

    pub fn duplicates(&self) -> u64 {
        self.duplicates.load(Ordering::Relaxed)
    }

    pub fn stale(&self) -> u64 {
        self.stale.load(Ordering::Relaxed)
    }

    pub fn unknown(&self) -> u64 {
        self.unknown.load(Ordering::Relaxed)
    }

    pub fn configuration_errors(&self) -> u64 {
        self.configuration_errors.load(Ordering::Relaxed)
    }

    /// 去重与过期丢弃的总数
    pub fn dropped(&self) -> u64 {
        self.duplicates() + self.stale()
    }
}

struct WorkerContext {
    evaluator: Arc<dyn CheckEvaluator>,
    timeout: Duration,
    stats: Arc<ExecutorStats>,
    metrics: MetricsCollector,
    reports: Option<mpsc::Sender<ExecutionReport>>,
}

pub struct ExecutorPool {
    config: ExecutorConfig,
    evaluator: Arc<dyn CheckEvaluator>,
    stats: Arc<ExecutorStats>,
    metrics: MetricsCollector,
    reports: Option<mpsc::Sender<ExecutionReport>>,
}

impl ExecutorPool {
    pub fn new(config: ExecutorConfig, evaluator: Arc<dyn CheckEvaluator>) -> Self {
        Self {
            config,
            evaluator,
            stats: Arc::new(ExecutorStats::default()),
            metrics: MetricsCollector::new(),
            reports: None,
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    /// 每个评估过的作业都会在这里产生一条报告
    pub fn with_reports(mut self, reports: mpsc::Sender<ExecutionReport>) -> Self {
        self.reports = Some(reports);
        self
    }

    pub fn stats(&self) -> Arc<ExecutorStats> {
        Arc::clone(&self.stats)
    }

    /// 消费作业直到收到关闭信号，返回 `Cancelled`；未处理的作业被放弃
    pub async fn run(
        self,
        queue: JobQueue,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let worker_count = self.config.worker_count.max(1);
        let context = Arc::new(WorkerContext {
            evaluator: self.evaluator,
            timeout: Duration::from_secs(self.config.evaluation_timeout_seconds),
            stats: self.stats,
            metrics: self.metrics,
            reports: self.reports,
        });

        let mut senders = Vec::with_capacity(worker_count);
        let mut handles = Vec::with_capacity(worker_count);
        for worker_id in 0..worker_count {
            let (tx, rx) = mpsc::channel(self.config.worker_queue_capacity.max(1));
            senders.push(tx);
            handles.push(tokio::spawn(run_worker(worker_id, rx, Arc::clone(&context))));
        }
        info!(
            "执行器池已启动: {} 个 worker, 作业队列 {}",
            worker_count,
            queue.name()
        );

        loop {
            tokio::select! {
                _ = shutdown.recv() => break,
                job = queue.recv() => {
                    let Some(job) = job else { break };
                    let target = route(&job.key, worker_count);
                    tokio::select! {
                        sent = senders[target].send(job) => {
                            if sent.is_err() {
                                error!("执行器 worker {} 已退出", target);
                                break;
                            }
                        }
                        _ = shutdown.recv() => break,
                    }
                }
            }
        }

        drop(senders);
        for handle in handles {
            handle.abort();
        }
        info!("执行器池已停止");
        Err(SchedulerError::Cancelled)
    }
}

/// 作业键到 worker 的固定映射
pub fn route(key: &str, worker_count: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % worker_count.max(1) as u64) as usize
}

async fn run_worker(
    worker_id: usize,
    mut jobs: mpsc::Receiver<Job>,
    context: Arc<WorkerContext>,
) {
    let mut window = DedupWindow::new();

    while let Some(job) = jobs.recv().await {
        let admission = if job.is_replay() {
            window.admit_replay(&job.key, job.timestamp())
        } else {
            window.admit(&job.key, job.timestamp())
        };
        match admission {
            Admission::Evaluate => {}
            Admission::Duplicate => {
                context.stats.duplicates.fetch_add(1, Ordering::Relaxed);
                context.metrics.record_duplicate();
                StructuredLogger::log_job_skipped(worker_id, &job, Admission::Duplicate.as_str());
                continue;
            }
            Admission::Stale => {
                context.stats.stale.fetch_add(1, Ordering::Relaxed);
                context.metrics.record_stale();
                StructuredLogger::log_job_skipped(worker_id, &job, Admission::Stale.as_str());
                continue;
            }
        }

        let report = execute_job(worker_id, job, &context).await;
        if let Some(reports) = &context.reports {
            if reports.send(report).await.is_err() {
                warn!("执行报告接收端已关闭");
            }
        }
    }
}

async fn execute_job(worker_id: usize, job: Job, context: &WorkerContext) -> ExecutionReport {
    let started = Instant::now();
    let evaluation = AssertUnwindSafe(tokio::time::timeout(
        context.timeout,
        context
            .evaluator
            .evaluate(&job.definition, job.last_point_timestamp),
    ))
    .catch_unwind()
    .await;

    let (result, error) = match evaluation {
        Ok(Ok(Ok(result))) => (result, None),
        Ok(Ok(Err(e))) => {
            if e.is_configuration_error() {
                context
                    .stats
                    .configuration_errors
                    .fetch_add(1, Ordering::Relaxed);
                context.metrics.record_configuration_error();
                error!(
                    job.key = %job.key,
                    job.monitor_id = job.monitor_id,
                    error = %e,
                    "检查定义无效，表达式应在入库前完成校验"
                );
            } else {
                warn!(job.key = %job.key, error = %e, "检查评估失败");
            }
            (CheckEvalResult::Unknown, Some(e.to_string()))
        }
        Ok(Err(_)) => {
            let e = SchedulerError::EvaluationTimeout {
                seconds: context.timeout.as_secs(),
            };
            warn!(job.key = %job.key, error = %e, "检查评估超时");
            (CheckEvalResult::Unknown, Some(e.to_string()))
        }
        Err(panic) => {
            let message = panic_message(panic.as_ref());
            error!(job.key = %job.key, panic = %message, "检查评估发生panic");
            (CheckEvalResult::Unknown, Some(format!("panic: {message}")))
        }
    };

    let duration = started.elapsed();
    context.stats.evaluated.fetch_add(1, Ordering::Relaxed);
    if result == CheckEvalResult::Unknown {
        context.stats.unknown.fetch_add(1, Ordering::Relaxed);
    }
    context.metrics.record_evaluation(result, duration);
    StructuredLogger::log_job_evaluated(worker_id, &job, result, duration.as_millis());

    ExecutionReport {
        worker_id,
        job,
        result,
        error,
        duration,
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_is_stable_and_in_range() {
        for key in ["1-1", "1-2", "7-42", "org-monitor"] {
            let first = route(key, 8);
            assert!(first < 8);
            assert_eq!(first, route(key, 8));
        }
        assert_eq!(route("anything", 1), 0);
        assert_eq!(route("anything", 0), 0);
    }

    #[test]
    fn test_panic_message() {
        let boxed: Box<dyn std::any::Any + Send> = Box::new("boom");
        assert_eq!(panic_message(boxed.as_ref()), "boom");
        let boxed: Box<dyn std::any::Any + Send> = Box::new(String::from("bang"));
        assert_eq!(panic_message(boxed.as_ref()), "bang");
    }
}
