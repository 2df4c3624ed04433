pub mod log_config;
pub mod log_level;
pub mod structured_logger;

pub use log_config::{LogConfig, OutputFormat};
pub use log_level::LogLevel;
pub use structured_logger::StructuredLogger;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// 初始化全局 tracing 订阅者，`RUST_LOG` 优先于配置的级别
pub fn init_tracing(config: &LogConfig) -> crate::SchedulerResult<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_filter()));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match config.format {
        OutputFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json().with_target(true))
            .try_init(),
        OutputFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    result.map_err(|e| crate::SchedulerError::Configuration(format!("初始化日志失败: {e}")))
}
