//! 单进程部署与测试使用的内存实现

pub mod cluster_registry;
pub mod offset_store;
pub mod schedule_repository;

pub use cluster_registry::MemoryClusterRegistry;
pub use offset_store::MemoryOffsetStore;
pub use schedule_repository::{validate_schedule, MemoryScheduleRepository, ScheduleFile};
