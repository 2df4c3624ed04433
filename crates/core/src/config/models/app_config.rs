use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    cluster::ClusterConfig,
    database::{DatabaseConfig, SchedulesConfig},
    executor::{ExecutorConfig, QueryConfig},
    observability::ObservabilityConfig,
    publisher::PublisherConfig,
    scheduler::{JobQueueConfig, SchedulerConfig},
};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub scheduler: SchedulerConfig,
    pub job_queue: JobQueueConfig,
    pub executor: ExecutorConfig,
    pub cluster: ClusterConfig,
    pub publisher: PublisherConfig,
    pub database: DatabaseConfig,
    pub query: QueryConfig,
    pub schedules: SchedulesConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: ALERTING_, nested keys joined by `__`)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else {
            let default_paths = [
                "config/alert-scheduler.toml",
                "alert-scheduler.toml",
                "/etc/alert-scheduler/config.toml",
            ];

            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("ALERTING")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    /// Validate configuration effectiveness
    pub fn validate(&self) -> Result<()> {
        self.scheduler.validate().context("调度器配置验证失败")?;

        self.job_queue.validate().context("作业队列配置验证失败")?;

        self.executor.validate().context("执行器配置验证失败")?;

        self.cluster.validate().context("集群配置验证失败")?;

        self.publisher.validate().context("发布器配置验证失败")?;

        self.database.validate().context("数据库配置验证失败")?;

        self.query.validate().context("查询后端配置验证失败")?;

        self.observability
            .validate()
            .context("可观测性配置验证失败")?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scheduler.initial_offset_seconds, 30);
        assert!(!config.cluster.enabled);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AppConfig::from_toml(
            r#"
            [scheduler]
            dispatch_buffer_capacity = 120

            [executor]
            worker_count = 2

            [cluster]
            enabled = true
            "#,
        )
        .unwrap();

        assert_eq!(config.scheduler.dispatch_buffer_capacity, 120);
        assert_eq!(config.scheduler.tick_queue_capacity, 30);
        assert_eq!(config.executor.worker_count, 2);
        assert_eq!(config.executor.evaluation_timeout_seconds, 30);
        assert!(config.cluster.enabled);
        assert_eq!(config.job_queue.executor_capacity, 1000);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        assert!(AppConfig::from_toml("[executor]\nworker_count = 0\n").is_err());
        assert!(AppConfig::from_toml("[database]\nurl = \"postgres://x\"\n").is_err());
        assert!(AppConfig::from_toml("[observability]\nlog_format = \"xml\"\n").is_err());
        assert!(AppConfig::from_toml(
            "[cluster]\nheartbeat_period_seconds = 60\nmissing_alert_grace_seconds = 10\n"
        )
        .is_err());
        assert!(AppConfig::from_toml("[cluster]\nhistory_retention_periods = 2\n").is_err());
        assert!(AppConfig::from_toml("[scheduler]\ndispatch_buffer_capacity = 0\n").is_err());
    }

    #[test]
    fn test_toml_round_trip() {
        let mut config = AppConfig::default();
        config.scheduler.node_id = "node-7".to_string();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.scheduler.node_id, "node-7");
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[scheduler]\nnode_id = \"file-node\"\ninitial_offset_seconds = 10\n"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.scheduler.node_id, "file-node");
        assert_eq!(config.scheduler.initial_offset_seconds, 10);
    }

    #[test]
    fn test_load_missing_file_fails() {
        assert!(AppConfig::load(Some("/definitely/not/here.toml")).is_err());
    }
}
