use crate::logging::log_level::LogLevel;
use crate::{SchedulerError, SchedulerResult};

/// Logging configuration
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct LogConfig {
    pub level: LogLevel,
    pub format: OutputFormat,
}

/// Output format for log entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum OutputFormat {
    Json,
    Pretty,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: LogLevel::Info,
            format: OutputFormat::Pretty,
        }
    }
}

impl LogConfig {
    /// 由命令行/配置文件中的字符串构造
    pub fn parse(level: &str, format: &str) -> SchedulerResult<Self> {
        let format = match format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "pretty" | "text" => OutputFormat::Pretty,
            other => {
                return Err(SchedulerError::Configuration(format!(
                    "Invalid log format: {other}"
                )))
            }
        };

        Ok(Self {
            level: level.parse()?,
            format,
        })
    }
}
