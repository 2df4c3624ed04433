use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub enabled: bool,
    pub worker_count: usize,
    pub worker_queue_capacity: usize,
    pub evaluation_timeout_seconds: u64,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            worker_count: 8,
            worker_queue_capacity: 64,
            evaluation_timeout_seconds: 30,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.worker_count == 0 {
            return Err(anyhow::anyhow!("执行器数量必须大于0"));
        }

        if self.worker_queue_capacity == 0 {
            return Err(anyhow::anyhow!("执行器队列容量必须大于0"));
        }

        if self.evaluation_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("评估超时时间必须大于0"));
        }

        Ok(())
    }
}

/// 时序查询后端
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub base_url: String,
    pub request_timeout_seconds: u64,
    pub lookback_seconds: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8080".to_string(),
            request_timeout_seconds: 10,
            lookback_seconds: 300,
        }
    }
}

impl QueryConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if !self.base_url.starts_with("http://") && !self.base_url.starts_with("https://") {
            return Err(anyhow::anyhow!("查询后端URL必须是HTTP格式: {}", self.base_url));
        }

        if self.request_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("查询超时时间必须大于0"));
        }

        if self.lookback_seconds == 0 {
            return Err(anyhow::anyhow!("查询回看窗口必须大于0"));
        }

        Ok(())
    }
}
