use async_trait::async_trait;

use crate::{
    models::{AlertRecord, MissingAlertsCheckIn, NodeInfo},
    SchedulerResult,
};

/// 集群节点注册表
///
/// 所有调用都是请求-响应式的，调用方负责重试；不提供分布式锁。
#[async_trait]
pub trait ClusterRegistry: Send + Sync {
    /// 在 `heartbeat` 区间登记节点
    async fn register_heartbeat(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()>;

    /// 集群范围内最新的心跳区间
    async fn get_last_heartbeat(&self) -> SchedulerResult<Option<i64>>;

    /// 自 `since` 起仍有心跳的节点数
    async fn get_active_node_count(&self, since: i64) -> SchedulerResult<u32>;

    /// 节点在某个心跳区间上的分区号
    async fn get_node_for_partition(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> SchedulerResult<Option<NodeInfo>>;

    /// 标记分区运行已完成
    async fn mark_partition_processed(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()>;

    /// 早于 `before` 且未完成、未被认领的分区运行
    async fn get_missing_alerts(&self, before: i64) -> SchedulerResult<Vec<AlertRecord>>;

    /// 认领缺失告警，之后其他节点不会再看到这些记录
    async fn check_in_node_processing_missing_alerts(
        &self,
        check_in: &MissingAlertsCheckIn,
    ) -> SchedulerResult<()>;

    /// 撤销 `node_id` 对这些记录的认领，记录重新出现在 `get_missing_alerts` 中
    async fn release_missing_alerts(
        &self,
        node_id: &str,
        records: &[AlertRecord],
    ) -> SchedulerResult<()>;

    /// 删除早于 `before` 的心跳、完成标记、认领和登记记录，返回删除的心跳条数
    async fn prune_history(&self, before: i64) -> SchedulerResult<u64>;
}
