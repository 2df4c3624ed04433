use serde::{Deserialize, Serialize};

/// 集群协调器配置，tick 单位为协调器内部的 1 秒节拍
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterConfig {
    pub enabled: bool,
    pub status_check_ticks: u64,
    pub heartbeat_ticks: u64,
    pub missing_alert_check_ticks: u64,
    pub heartbeat_period_seconds: i64,
    pub missing_alert_grace_seconds: i64,
    /// 注册表保留的心跳区间数，更早的记录在登记心跳时删除
    pub history_retention_periods: i64,
    pub task_queue_capacity: usize,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            status_check_ticks: 10,
            heartbeat_ticks: 60,
            missing_alert_check_ticks: 60,
            heartbeat_period_seconds: 60,
            missing_alert_grace_seconds: 120,
            history_retention_periods: 60,
            task_queue_capacity: 16,
        }
    }
}

impl ClusterConfig {
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.status_check_ticks == 0
            || self.heartbeat_ticks == 0
            || self.missing_alert_check_ticks == 0
        {
            return Err(anyhow::anyhow!("协调器节拍间隔必须大于0"));
        }

        if self.heartbeat_period_seconds <= 0 {
            return Err(anyhow::anyhow!("心跳周期必须大于0"));
        }

        if self.missing_alert_grace_seconds < self.heartbeat_period_seconds {
            return Err(anyhow::anyhow!("缺失告警宽限期不能小于心跳周期"));
        }

        if self.history_retention_periods * self.heartbeat_period_seconds
            <= self.missing_alert_grace_seconds
        {
            return Err(anyhow::anyhow!("注册表保留时长必须大于缺失告警宽限期"));
        }

        if self.task_queue_capacity == 0 {
            return Err(anyhow::anyhow!("分发任务队列容量必须大于0"));
        }

        Ok(())
    }
}
