use async_trait::async_trait;

use crate::{models::Job, SchedulerResult};

/// 外部消息总线发布端
#[async_trait]
pub trait JobPublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, job: &Job) -> SchedulerResult<()>;
}
