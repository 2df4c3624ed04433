use serde::{Deserialize, Serialize};

/// 调度器（Ticker + Dispatcher）配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    pub enabled: bool,
    pub node_id: String,
    pub initial_offset_seconds: u64,
    pub offset_id: String,
    pub offset_reload_interval_seconds: u64,
    pub tick_queue_capacity: usize,
    /// 分发器内部 tick 缓冲区，查询变慢时在这里积压
    pub dispatch_buffer_capacity: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            node_id: default_node_id(),
            initial_offset_seconds: 30,
            offset_id: "default".to_string(),
            offset_reload_interval_seconds: 1,
            tick_queue_capacity: 30,
            dispatch_buffer_capacity: 3600,
        }
    }
}

/// 默认使用主机名作为节点ID
fn default_node_id() -> String {
    hostname::get()
        .ok()
        .and_then(|name| name.into_string().ok())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "node-1".to_string())
}

impl SchedulerConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.node_id.is_empty() {
            return Err(anyhow::anyhow!("节点ID不能为空"));
        }

        if self.offset_id.is_empty() {
            return Err(anyhow::anyhow!("偏移ID不能为空"));
        }

        if self.offset_reload_interval_seconds == 0 {
            return Err(anyhow::anyhow!("偏移重载间隔必须大于0"));
        }

        if self.tick_queue_capacity == 0 || self.dispatch_buffer_capacity == 0 {
            return Err(anyhow::anyhow!("tick队列容量必须大于0"));
        }

        Ok(())
    }
}

/// 两个作业队列的容量
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobQueueConfig {
    pub executor_capacity: usize,
    pub publish_capacity: usize,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            executor_capacity: 1000,
            publish_capacity: 1000,
        }
    }
}

impl JobQueueConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.executor_capacity == 0 {
            return Err(anyhow::anyhow!("执行队列容量必须大于0"));
        }

        if self.publish_capacity == 0 {
            return Err(anyhow::anyhow!("发布队列容量必须大于0"));
        }

        Ok(())
    }
}
