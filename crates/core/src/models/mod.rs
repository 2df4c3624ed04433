pub mod check;
pub mod cluster;
pub mod job;
pub mod schedule;
pub mod tick;

pub use check::{CheckDefinition, CheckEvalResult};
pub use cluster::{
    AlertRecord, AlertingState, AlertingStatus, DispatcherTask, DispatcherTaskKind,
    DispatcherTaskStatus, MissingAlertsCheckIn, NodeInfo, RunType,
};
pub use job::Job;
pub use schedule::ScheduleDefinition;
pub use tick::{SchedulerOffset, Tick};
