pub mod alert_engine;
pub mod cluster_registry;
pub mod job_publisher;
pub mod offset_store;
pub mod schedule_repository;

pub use alert_engine::AlertEngine;
pub use cluster_registry::ClusterRegistry;
pub use job_publisher::JobPublisher;
pub use offset_store::OffsetStore;
pub use schedule_repository::ScheduleRepository;
