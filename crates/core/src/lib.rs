//! 告警调度的核心模型、配置、错误类型与组件边界

pub mod clock;
pub mod config;
pub mod errors;
pub mod evaluation;
pub mod logging;
pub mod models;
pub mod traits;

pub use clock::{Clock, InstantClock, SystemClock};
pub use errors::{SchedulerError, SchedulerResult};
pub use evaluation::{CheckEvaluator, ExpressionEngine, QueryCache, Series, SeriesResult, SeriesSource};
pub use logging::StructuredLogger;
pub use models::*;
pub use traits::*;
