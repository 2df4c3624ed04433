//! 调度侧组件
//!
//! Ticker 逐秒产生 tick，Dispatcher 把到期的调度定义转换为作业放入队列；
//! 集群模式下由协调器按心跳区间派发分区任务。

pub mod cluster;
pub mod dispatcher;
pub mod offset_reloader;
pub mod partition_engine;
pub mod publish_forwarder;
pub mod ticker;

pub use cluster::{heartbeat_interval, ClusterCoordinator, CoordinatorHandle, StateMachine};
pub use dispatcher::{Dispatcher, DEFAULT_TICK_BUFFER};
pub use offset_reloader::OffsetReloader;
pub use partition_engine::PartitionedAlertEngine;
pub use publish_forwarder::{routing_key, ForwarderStats, PublishForwarder};
pub use ticker::{Ticker, TickerHandle};
