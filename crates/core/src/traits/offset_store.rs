use async_trait::async_trait;

use crate::SchedulerResult;

/// 调度偏移的外部持久化
#[async_trait]
pub trait OffsetStore: Send + Sync {
    async fn get_scheduler_offset(&self, id: &str) -> SchedulerResult<Option<String>>;

    async fn set_scheduler_offset(&self, id: &str, value: &str) -> SchedulerResult<()>;
}
