//! 集群协调器
//!
//! 两个循环：节拍循环每秒推进一次状态机，任务循环执行分发任务并把结果回报给节拍循环。
//! 两者都包在 panic 保护里，panic 时记录堆栈后以 `CoordinatorPanic` 结束，由上层决定是否重启。
//! 堆栈在 panic hook 中采集，指向 panic 发生处而不是保护层。

mod state_machine;

pub use state_machine::{heartbeat_interval, StateMachine};

use std::any::Any;
use std::backtrace::Backtrace;
use std::cell::RefCell;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Once};
use std::time::Duration;

use alerting_core::{
    config::ClusterConfig, AlertEngine, AlertingState, Clock, ClusterRegistry, DispatcherTask,
    DispatcherTaskStatus, SchedulerError, SchedulerResult, StructuredLogger,
};
use alerting_infrastructure::MetricsCollector;
use futures::FutureExt;
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

pub const TICKER_LOOP: &str = "ticker";
pub const TASK_LOOP: &str = "dispatcher_task";

pub struct ClusterCoordinator {
    node_id: String,
    registry: Arc<dyn ClusterRegistry>,
    engine: Arc<dyn AlertEngine>,
    clock: Arc<dyn Clock>,
    config: ClusterConfig,
    tick_period: Duration,
    metrics: MetricsCollector,
}

/// 运行中协调器的两个循环及状态快照
pub struct CoordinatorHandle {
    pub ticker_loop: JoinHandle<SchedulerResult<()>>,
    pub task_loop: JoinHandle<SchedulerResult<()>>,
    state: watch::Receiver<AlertingState>,
}

impl CoordinatorHandle {
    pub fn state(&self) -> AlertingState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<AlertingState> {
        self.state.clone()
    }
}

impl ClusterCoordinator {
    pub fn new(
        node_id: impl Into<String>,
        registry: Arc<dyn ClusterRegistry>,
        engine: Arc<dyn AlertEngine>,
        clock: Arc<dyn Clock>,
        config: ClusterConfig,
    ) -> Self {
        Self {
            node_id: node_id.into(),
            registry,
            engine,
            clock,
            config,
            tick_period: Duration::from_secs(1),
            metrics: MetricsCollector::new(),
        }
    }

    pub fn with_metrics(mut self, metrics: MetricsCollector) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_tick_period(mut self, period: Duration) -> Self {
        self.tick_period = period;
        self
    }

    pub fn spawn(self, shutdown: &broadcast::Receiver<()>) -> CoordinatorHandle {
        let (task_tx, task_rx) = mpsc::channel(self.config.task_queue_capacity.max(1));
        let (status_tx, status_rx) = mpsc::channel(self.config.task_queue_capacity.max(1));

        let machine = StateMachine::new(
            self.node_id.clone(),
            self.registry,
            Arc::clone(&self.engine),
            self.clock,
            self.config.clone(),
            task_tx,
        )
        .with_metrics(self.metrics);
        let (state_tx, state_rx) = watch::channel(machine.state().clone());

        info!(
            "集群协调器启动: node={}, 心跳周期={}s",
            self.node_id, self.config.heartbeat_period_seconds
        );

        let ticker_loop = tokio::spawn(guarded(
            TICKER_LOOP,
            ticker_loop(
                machine,
                self.config,
                self.tick_period,
                status_rx,
                state_tx,
                shutdown.resubscribe(),
            ),
        ));
        let task_loop = tokio::spawn(guarded(
            TASK_LOOP,
            task_loop(self.engine, task_rx, status_tx, shutdown.resubscribe()),
        ));

        CoordinatorHandle {
            ticker_loop,
            task_loop,
            state: state_rx,
        }
    }
}

async fn ticker_loop(
    mut machine: StateMachine,
    config: ClusterConfig,
    tick_period: Duration,
    mut statuses: mpsc::Receiver<DispatcherTaskStatus>,
    state_tx: watch::Sender<AlertingState>,
    mut shutdown: broadcast::Receiver<()>,
) -> SchedulerResult<()> {
    let mut interval = tokio::time::interval(tick_period);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("协调器节拍循环收到关闭信号");
                return Err(SchedulerError::Cancelled);
            }
            status = statuses.recv() => {
                let Some(status) = status else {
                    if shutdown.try_recv().is_ok() {
                        return Err(SchedulerError::Cancelled);
                    }
                    return Err(SchedulerError::Internal("dispatcher task loop exited".to_string()));
                };
                if let Err(e) = machine.handle_task_status(&status).await {
                    error!("节点 {} 丢弃无效的任务回报: {}", machine.node_id(), e);
                }
            }
            _ = interval.tick() => {
                if ticks % config.heartbeat_ticks.max(1) == 0 {
                    if let Err(e) = machine.register_heartbeat().await {
                        StructuredLogger::log_component_error("cluster", "register_heartbeat", &e);
                    }
                }
                if ticks % config.status_check_ticks.max(1) == 0 {
                    if let Err(e) = machine.check_status().await {
                        StructuredLogger::log_component_error("cluster", "check_status", &e);
                    }
                }
                if ticks % config.missing_alert_check_ticks.max(1) == 0 {
                    if let Err(e) = machine.check_missing_alerts().await {
                        StructuredLogger::log_component_error("cluster", "check_missing_alerts", &e);
                    }
                }
                ticks = ticks.wrapping_add(1);
            }
        }

        state_tx.send_if_modified(|current| {
            if current == machine.state() {
                false
            } else {
                *current = machine.state().clone();
                true
            }
        });
    }
}

async fn task_loop(
    engine: Arc<dyn AlertEngine>,
    mut tasks: mpsc::Receiver<DispatcherTask>,
    statuses: mpsc::Sender<DispatcherTaskStatus>,
    mut shutdown: broadcast::Receiver<()>,
) -> SchedulerResult<()> {
    loop {
        tokio::select! {
            _ = shutdown.recv() => {
                debug!("协调器任务循环收到关闭信号");
                return Err(SchedulerError::Cancelled);
            }
            task = tasks.recv() => {
                let Some(task) = task else { return Ok(()) };
                let status = match engine.dispatch(&task).await {
                    Ok(enqueued) => {
                        debug!("{} 任务 (区间 {}) 入队 {} 个作业", task.task_type(), task.interval, enqueued);
                        DispatcherTaskStatus::succeeded(&task)
                    }
                    Err(e) => DispatcherTaskStatus::failed(&task, e.to_string()),
                };
                if statuses.send(status).await.is_err() {
                    return Ok(());
                }
            }
        }
    }
}

static PANIC_HOOK: Once = Once::new();

thread_local! {
    static PANIC_TRACE: RefCell<Option<String>> = const { RefCell::new(None) };
}

/// 安装记录 panic 位置和堆栈的 hook，保留原有 hook 的输出
fn install_panic_hook() {
    PANIC_HOOK.call_once(|| {
        let previous = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            let location = info
                .location()
                .map(|l| l.to_string())
                .unwrap_or_else(|| "<unknown>".to_string());
            let trace = format!("{location}\n{}", Backtrace::force_capture());
            PANIC_TRACE.with(|slot| *slot.borrow_mut() = Some(trace));
            previous(info);
        }));
    });
}

/// 取出当前线程最近一次 panic 的位置和堆栈
fn take_panic_trace() -> Option<String> {
    PANIC_TRACE.with(|slot| slot.borrow_mut().take())
}

/// 运行一个协调器循环，把 panic 转换为 `CoordinatorPanic`
pub async fn guarded<F>(loop_name: &'static str, fut: F) -> SchedulerResult<()>
where
    F: Future<Output = SchedulerResult<()>>,
{
    install_panic_hook();
    match AssertUnwindSafe(fut).catch_unwind().await {
        Ok(result) => result,
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            let backtrace = take_panic_trace().unwrap_or_else(|| "<unavailable>".to_string());
            error!(
                loop_name = loop_name,
                panic = %message,
                backtrace = %backtrace,
                "协调器循环发生panic，循环终止"
            );
            Err(SchedulerError::CoordinatorPanic {
                loop_name: loop_name.to_string(),
                message,
            })
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_panic_trace_points_at_panic_site() {
        install_panic_hook();
        let result = AssertUnwindSafe(async { panic!("partition table corrupted") })
            .catch_unwind()
            .await;
        assert!(result.is_err());

        let trace = take_panic_trace().unwrap();
        assert!(trace.starts_with(file!()));
        assert!(take_panic_trace().is_none());
    }
}
