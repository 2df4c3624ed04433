//! 告警调度的基础设施：作业队列、存储实现、消息总线与时序后端

pub mod database;
pub mod http_series_source;
pub mod job_queue;
pub mod memory;
pub mod observability;
pub mod redis_stream;

pub use database::{DatabaseManager, SqliteClusterRegistry, SqliteOffsetStore};
pub use http_series_source::HttpSeriesSource;
pub use job_queue::JobQueue;
pub use memory::{MemoryClusterRegistry, MemoryOffsetStore, MemoryScheduleRepository};
pub use observability::MetricsCollector;
pub use redis_stream::{RedisStreamConsumer, RedisStreamPublisher};
