use async_trait::async_trait;

use crate::{models::DispatcherTask, SchedulerResult};

/// 集群协调器委派分区分发的告警引擎
#[async_trait]
pub trait AlertEngine: Send + Sync {
    /// 执行一个分发任务，返回入队的作业数
    async fn dispatch(&self, task: &DispatcherTask) -> SchedulerResult<usize>;

    /// 仍在等待执行的作业数
    fn pending_jobs(&self) -> usize;
}
