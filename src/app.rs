use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use alerting_core::{
    config::AppConfig, CheckEvaluator, Clock, ClusterRegistry, JobPublisher, OffsetStore,
    ScheduleRepository, SchedulerError, SchedulerOffset, SchedulerResult, SystemClock,
};
use alerting_dispatcher::{
    ClusterCoordinator, Dispatcher, OffsetReloader, PartitionedAlertEngine, PublishForwarder,
    Ticker,
};
use alerting_infrastructure::{
    DatabaseManager, HttpSeriesSource, JobQueue, MemoryClusterRegistry, MemoryOffsetStore,
    MemoryScheduleRepository, MetricsCollector, RedisStreamConsumer, RedisStreamPublisher,
    SqliteClusterRegistry, SqliteOffsetStore,
};
use alerting_worker::{ExecutionReport, ExecutorPool, ExpressionCheckEvaluator, ThresholdEngine};
use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{error, info, warn};

/// 应用运行模式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppMode {
    /// Ticker + Dispatcher（或集群协调器），作业发布到消息总线
    Scheduler,
    /// 只运行执行器池，作业从消息总线读取
    Executor,
    /// 同一进程内运行所有组件
    All,
}

impl AppMode {
    pub fn runs_scheduler(&self) -> bool {
        matches!(self, AppMode::Scheduler | AppMode::All)
    }

    pub fn runs_executor(&self) -> bool {
        matches!(self, AppMode::Executor | AppMode::All)
    }
}

/// 本进程是否运行执行器池消费执行队列
fn executes_locally(config: &AppConfig, mode: AppMode) -> bool {
    mode.runs_executor() && config.executor.enabled
}

impl FromStr for AppMode {
    type Err = SchedulerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduler" => Ok(AppMode::Scheduler),
            "executor" => Ok(AppMode::Executor),
            "all" => Ok(AppMode::All),
            other => Err(SchedulerError::Configuration(format!(
                "不支持的运行模式: {other}"
            ))),
        }
    }
}

impl fmt::Display for AppMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AppMode::Scheduler => "scheduler",
            AppMode::Executor => "executor",
            AppMode::All => "all",
        };
        f.write_str(s)
    }
}

/// 应用依赖的外部协作者
pub struct Components {
    pub clock: Arc<dyn Clock>,
    pub schedules: Arc<dyn ScheduleRepository>,
    pub offsets: Arc<dyn OffsetStore>,
    pub registry: Arc<dyn ClusterRegistry>,
    pub evaluator: Arc<dyn CheckEvaluator>,
    pub publisher: Option<Arc<dyn JobPublisher>>,
    pub consumer: Option<RedisStreamConsumer>,
    pub reports: Option<mpsc::Sender<ExecutionReport>>,
}

/// 主应用程序
pub struct Application {
    config: AppConfig,
    mode: AppMode,
    components: Components,
    database: Option<DatabaseManager>,
    metrics: MetricsCollector,
}

impl Application {
    /// 按配置创建生产环境的各个组件
    pub async fn new(config: AppConfig, mode: AppMode) -> Result<Self> {
        info!("初始化应用程序，模式: {}", mode);

        let engine = Arc::new(ThresholdEngine::new(Duration::from_secs(
            config.query.lookback_seconds,
        )));

        let schedules = match &config.schedules.file {
            Some(path) => MemoryScheduleRepository::load_from_file(path, engine.as_ref())
                .await
                .with_context(|| format!("加载调度定义失败: {path}"))?,
            None => {
                warn!("未配置调度定义文件，调度器不会产生作业");
                MemoryScheduleRepository::new()
            }
        };

        let (database, offsets, registry): (
            Option<DatabaseManager>,
            Arc<dyn OffsetStore>,
            Arc<dyn ClusterRegistry>,
        ) = if config.database.is_persistent() {
            let database = DatabaseManager::new(&config.database)
                .await
                .context("连接数据库失败")?;
            database.migrate().await.context("初始化数据库表结构失败")?;
            let pool = database.pool().clone();
            (
                Some(database),
                Arc::new(SqliteOffsetStore::new(pool.clone())),
                Arc::new(SqliteClusterRegistry::new(pool)),
            )
        } else {
            if config.cluster.enabled {
                warn!("集群模式使用内存注册表，节点之间不会共享心跳");
            }
            (
                None,
                Arc::new(MemoryOffsetStore::new()),
                Arc::new(MemoryClusterRegistry::new()),
            )
        };

        let source = HttpSeriesSource::new(&config.query).context("创建时序查询客户端失败")?;
        let evaluator = Arc::new(ExpressionCheckEvaluator::new(engine, Arc::new(source)));

        let publisher: Option<Arc<dyn JobPublisher>> =
            if config.publisher.enabled && mode.runs_scheduler() {
                let publisher =
                    RedisStreamPublisher::connect(&config.publisher.redis_url, &config.publisher.stream)
                        .await
                        .context("连接消息总线失败")?;
                Some(Arc::new(publisher))
            } else {
                None
            };

        let consumer = if mode == AppMode::Executor {
            if !config.publisher.enabled {
                return Err(anyhow::anyhow!(
                    "executor 模式需要启用 publisher，从消息总线读取作业"
                ));
            }
            Some(
                RedisStreamConsumer::connect(&config.publisher.redis_url, &config.publisher.stream)
                    .await
                    .context("连接消息总线失败")?,
            )
        } else {
            None
        };

        let components = Components {
            clock: Arc::new(SystemClock),
            schedules: Arc::new(schedules),
            offsets,
            registry,
            evaluator,
            publisher,
            consumer,
            reports: None,
        };

        let mut app = Self::with_components(config, mode, components)?;
        app.database = database;
        Ok(app)
    }

    /// 使用给定的协作者组装应用
    pub fn with_components(config: AppConfig, mode: AppMode, components: Components) -> Result<Self> {
        let schedules_jobs = mode.runs_scheduler() && config.scheduler.enabled;
        if schedules_jobs && !executes_locally(&config, mode) && components.publisher.is_none() {
            return Err(anyhow::anyhow!(
                "调度器产生的作业既没有本地执行器池也没有 publisher 可去"
            ));
        }

        let metrics = MetricsCollector::for_node(&config.scheduler.node_id);
        Ok(Self {
            config,
            mode,
            components,
            database: None,
            metrics,
        })
    }

    pub fn mode(&self) -> AppMode {
        self.mode
    }

    /// 运行直到收到关闭信号；任一组件提前以错误退出时返回错误
    pub async fn run(mut self, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        info!(
            "启动应用程序，模式: {}, 节点: {}",
            self.mode, self.config.scheduler.node_id
        );

        let consumer = self.components.consumer.take();
        let mut running = JoinSet::new();
        self.start_components(&mut running, &shutdown_rx, consumer)
            .await?;

        let mut failure = None;
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => break,
                joined = running.join_next() => {
                    let Some(joined) = joined else { break };
                    let (name, result) = flatten(joined);
                    if let Err(e) = result {
                        if !e.is_cancelled() {
                            error!("组件 {} 异常退出: {}", name, e);
                            failure = Some(anyhow::anyhow!("组件 {name} 异常退出: {e}"));
                            break;
                        }
                    }
                }
            }
        }

        // 各组件自行观察关闭信号；异常退出时其余组件直接中止
        if failure.is_some() {
            running.abort_all();
        }
        while let Some(joined) = running.join_next().await {
            let (name, result) = flatten(joined);
            match result {
                Err(e) if !e.is_cancelled() => warn!("组件 {} 关闭时返回错误: {}", name, e),
                _ => {}
            }
        }

        if let Some(database) = &self.database {
            database.close().await;
        }
        info!("应用程序已停止");

        match failure {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn start_components(
        &self,
        running: &mut JoinSet<(&'static str, SchedulerResult<()>)>,
        shutdown_rx: &broadcast::Receiver<()>,
        consumer: Option<RedisStreamConsumer>,
    ) -> Result<()> {
        let config = &self.config;
        let c = &self.components;

        let executor_queue = JobQueue::with_metrics(
            "executor",
            config.job_queue.executor_capacity,
            self.metrics.clone(),
        );
        let publish_queue = c.publisher.as_ref().map(|_| {
            JobQueue::with_metrics(
                "publish",
                config.job_queue.publish_capacity,
                self.metrics.clone(),
            )
        });

        let local = executes_locally(config, self.mode);
        if local {
            let mut pool = ExecutorPool::new(config.executor.clone(), Arc::clone(&c.evaluator))
                .with_metrics(self.metrics.clone());
            if let Some(reports) = &c.reports {
                pool = pool.with_reports(reports.clone());
            }
            let queue = executor_queue.clone();
            let shutdown = shutdown_rx.resubscribe();
            running.spawn(async move { ("executor_pool", pool.run(queue, shutdown).await) });
        }

        if let Some(consumer) = consumer {
            let queue = executor_queue.clone();
            let shutdown = shutdown_rx.resubscribe();
            running.spawn(async move { ("stream_consumer", consumer.run(queue, shutdown).await) });
        }

        if !(self.mode.runs_scheduler() && config.scheduler.enabled) {
            return Ok(());
        }

        if let (Some(publisher), Some(queue)) = (&c.publisher, &publish_queue) {
            let forwarder = PublishForwarder::new(Arc::clone(publisher), queue.clone(), &config.publisher)
                .with_metrics(self.metrics.clone());
            let shutdown = shutdown_rx.resubscribe();
            running.spawn(async move { ("publish_forwarder", forwarder.run(shutdown).await) });
        }

        // 本进程没有执行器池时，作业只去消息总线，执行队列无人消费
        let (primary, copy) = if local {
            (executor_queue, publish_queue)
        } else {
            let queue = publish_queue
                .ok_or_else(|| anyhow::anyhow!("没有本地执行器池时需要启用 publisher"))?;
            (queue, None)
        };

        if config.cluster.enabled {
            let mut engine = PartitionedAlertEngine::new(
                Arc::clone(&c.schedules),
                primary,
                Arc::clone(&c.clock),
                config.cluster.heartbeat_period_seconds,
            );
            if let Some(queue) = copy {
                engine = engine.with_publish_queue(queue);
            }
            let handle = ClusterCoordinator::new(
                config.scheduler.node_id.clone(),
                Arc::clone(&c.registry),
                Arc::new(engine),
                Arc::clone(&c.clock),
                config.cluster.clone(),
            )
            .with_metrics(self.metrics.clone())
            .spawn(shutdown_rx);

            running.spawn(supervise("coordinator_ticker", handle.ticker_loop));
            running.spawn(supervise("coordinator_tasks", handle.task_loop));
            return Ok(());
        }

        let default_offset = SchedulerOffset::from_secs(config.scheduler.initial_offset_seconds);
        let offset = OffsetReloader::load_initial(
            c.offsets.as_ref(),
            &config.scheduler.offset_id,
            default_offset,
        )
        .await
        .context("读取调度偏移失败")?;

        let last_processed = c.clock.now() - offset.as_chrono();
        let (ticker, ticks, _ticker_join) = Ticker::spawn(
            Arc::clone(&c.clock),
            last_processed,
            offset,
            config.scheduler.tick_queue_capacity,
        );

        let mut dispatcher = Dispatcher::new(Arc::clone(&c.schedules), primary, Arc::clone(&c.clock))
            .with_tick_buffer(config.scheduler.dispatch_buffer_capacity)
            .with_metrics(self.metrics.clone());
        if let Some(queue) = copy {
            dispatcher = dispatcher.with_publish_queue(queue);
        }
        let shutdown = shutdown_rx.resubscribe();
        running.spawn(async move { ("dispatcher", dispatcher.run(ticks, shutdown).await) });

        let reloader = OffsetReloader::new(
            Arc::clone(&c.offsets),
            ticker,
            config.scheduler.offset_id.clone(),
            Duration::from_secs(config.scheduler.offset_reload_interval_seconds),
        )
        .with_clock(Arc::clone(&c.clock))
        .with_metrics(self.metrics.clone());
        let shutdown = shutdown_rx.resubscribe();
        running.spawn(async move { ("offset_reloader", reloader.run(shutdown).await) });

        Ok(())
    }
}

async fn supervise(
    name: &'static str,
    handle: JoinHandle<SchedulerResult<()>>,
) -> (&'static str, SchedulerResult<()>) {
    let result = match handle.await {
        Ok(result) => result,
        Err(e) => Err(SchedulerError::Internal(format!("task join failed: {e}"))),
    };
    (name, result)
}

fn flatten(
    joined: Result<(&'static str, SchedulerResult<()>), tokio::task::JoinError>,
) -> (&'static str, SchedulerResult<()>) {
    match joined {
        Ok(pair) => pair,
        Err(e) if e.is_cancelled() => ("unknown", Err(SchedulerError::Cancelled)),
        Err(e) => (
            "unknown",
            Err(SchedulerError::Internal(format!("task join failed: {e}"))),
        ),
    }
}
