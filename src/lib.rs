//! 告警调度系统的进程装配：按运行模式组装组件，统一处理关闭信号。

pub mod app;
pub mod shutdown;

pub use app::{AppMode, Application, Components};
pub use shutdown::ShutdownManager;
