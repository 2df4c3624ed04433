use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{models::ScheduleDefinition, SchedulerResult};

/// 调度定义来源
#[async_trait]
pub trait ScheduleRepository: Send + Sync {
    /// 返回在 `timestamp` 到期的全部检查
    async fn get_due_schedules(
        &self,
        timestamp: DateTime<Utc>,
    ) -> SchedulerResult<Vec<ScheduleDefinition>>;
}
