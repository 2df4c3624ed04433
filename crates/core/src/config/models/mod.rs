pub mod app_config;
pub mod cluster;
pub mod database;
pub mod executor;
pub mod observability;
pub mod publisher;
pub mod scheduler;

pub use app_config::AppConfig;
pub use cluster::ClusterConfig;
pub use database::{DatabaseConfig, SchedulesConfig};
pub use executor::{ExecutorConfig, QueryConfig};
pub use observability::ObservabilityConfig;
pub use publisher::PublisherConfig;
pub use scheduler::{JobQueueConfig, SchedulerConfig};
