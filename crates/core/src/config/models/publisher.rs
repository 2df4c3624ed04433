use serde::{Deserialize, Serialize};

/// 作业转发到外部消息总线（Redis Stream）的配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherConfig {
    pub enabled: bool,
    pub redis_url: String,
    pub stream: String,
    pub routing_key_prefix: String,
    pub retry_backoff_ms: u64,
    pub max_attempts: u32,
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            stream: "alert-jobs".to_string(),
            routing_key_prefix: "monitor".to_string(),
            retry_backoff_ms: 1000,
            max_attempts: 5,
        }
    }
}

impl PublisherConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.enabled {
            return Ok(());
        }

        if !self.redis_url.starts_with("redis://") && !self.redis_url.starts_with("rediss://") {
            return Err(anyhow::anyhow!("Redis URL格式无效: {}", self.redis_url));
        }

        if self.stream.is_empty() {
            return Err(anyhow::anyhow!("Stream名称不能为空"));
        }

        if self.max_attempts == 0 {
            return Err(anyhow::anyhow!("最大发布尝试次数必须大于0"));
        }

        Ok(())
    }
}
