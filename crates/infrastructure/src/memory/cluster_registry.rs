use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use alerting_core::{
    AlertRecord, ClusterRegistry, MissingAlertsCheckIn, NodeInfo, SchedulerResult,
};
use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::debug;

#[derive(Debug, Default)]
struct RegistryState {
    /// heartbeat -> 该区间登记的节点，按 node_id 有序
    heartbeats: BTreeMap<i64, BTreeSet<String>>,
    processed: HashSet<(String, i64)>,
    /// (node_id, heartbeat) -> 认领该记录的节点
    claimed: HashMap<(String, i64), String>,
    check_ins: Vec<MissingAlertsCheckIn>,
}

impl RegistryState {
    fn node_info(&self, node_id: &str, heartbeat: i64) -> Option<NodeInfo> {
        let nodes = self.heartbeats.get(&heartbeat)?;
        let rank = nodes.iter().position(|n| n == node_id)?;
        Some(NodeInfo {
            node_id: node_id.to_string(),
            heartbeat,
            partition_no: rank as u32,
            node_count: nodes.len() as u32,
        })
    }
}

/// 进程内的集群节点注册表
#[derive(Debug, Default)]
pub struct MemoryClusterRegistry {
    state: RwLock<RegistryState>,
}

impl MemoryClusterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 缺失告警认领记录
    pub async fn check_ins(&self) -> Vec<MissingAlertsCheckIn> {
        self.state.read().await.check_ins.clone()
    }

    pub async fn is_processed(&self, node_id: &str, heartbeat: i64) -> bool {
        self.state
            .read()
            .await
            .processed
            .contains(&(node_id.to_string(), heartbeat))
    }
}

#[async_trait]
impl ClusterRegistry for MemoryClusterRegistry {
    async fn register_heartbeat(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        state
            .heartbeats
            .entry(heartbeat)
            .or_default()
            .insert(node_id.to_string());
        debug!("节点 {} 登记心跳 {}", node_id, heartbeat);
        Ok(())
    }

    async fn get_last_heartbeat(&self) -> SchedulerResult<Option<i64>> {
        Ok(self.state.read().await.heartbeats.keys().next_back().copied())
    }

    async fn get_active_node_count(&self, since: i64) -> SchedulerResult<u32> {
        let state = self.state.read().await;
        let nodes: HashSet<&String> = state
            .heartbeats
            .range(since..)
            .flat_map(|(_, nodes)| nodes.iter())
            .collect();
        Ok(nodes.len() as u32)
    }

    async fn get_node_for_partition(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> SchedulerResult<Option<NodeInfo>> {
        Ok(self.state.read().await.node_info(node_id, heartbeat))
    }

    async fn mark_partition_processed(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()> {
        self.state
            .write()
            .await
            .processed
            .insert((node_id.to_string(), heartbeat));
        Ok(())
    }

    async fn get_missing_alerts(&self, before: i64) -> SchedulerResult<Vec<AlertRecord>> {
        let state = self.state.read().await;
        let mut records = Vec::new();

        for (heartbeat, nodes) in state.heartbeats.range(..before) {
            for (rank, node_id) in nodes.iter().enumerate() {
                let key = (node_id.clone(), *heartbeat);
                if state.processed.contains(&key) || state.claimed.contains_key(&key) {
                    continue;
                }
                records.push(AlertRecord {
                    node_id: node_id.clone(),
                    heartbeat: *heartbeat,
                    partition_no: rank as u32,
                    node_count: nodes.len() as u32,
                });
            }
        }
        Ok(records)
    }

    async fn check_in_node_processing_missing_alerts(
        &self,
        check_in: &MissingAlertsCheckIn,
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        for record in &check_in.records {
            state
                .claimed
                .entry((record.node_id.clone(), record.heartbeat))
                .or_insert_with(|| check_in.node_id.clone());
        }
        state.check_ins.push(check_in.clone());
        Ok(())
    }

    async fn release_missing_alerts(
        &self,
        node_id: &str,
        records: &[AlertRecord],
    ) -> SchedulerResult<()> {
        let mut state = self.state.write().await;
        for record in records {
            let key = (record.node_id.clone(), record.heartbeat);
            if state.claimed.get(&key).is_some_and(|owner| owner == node_id) {
                state.claimed.remove(&key);
            }
        }
        Ok(())
    }

    async fn prune_history(&self, before: i64) -> SchedulerResult<u64> {
        let mut state = self.state.write().await;
        let retained = state.heartbeats.split_off(&before);
        let removed: usize = std::mem::replace(&mut state.heartbeats, retained)
            .values()
            .map(BTreeSet::len)
            .sum();

        state.processed.retain(|(_, heartbeat)| *heartbeat >= before);
        state.claimed.retain(|(_, heartbeat), _| *heartbeat >= before);
        state.check_ins.retain(|check_in| check_in.interval >= before);
        Ok(removed as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_core::RunType;

    #[tokio::test]
    async fn test_partition_rank_by_node_id() {
        let registry = MemoryClusterRegistry::new();
        registry.register_heartbeat("node-b", 60).await.unwrap();
        registry.register_heartbeat("node-a", 60).await.unwrap();
        registry.register_heartbeat("node-c", 120).await.unwrap();

        let info = registry
            .get_node_for_partition("node-b", 60)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(info.partition_no, 1);
        assert_eq!(info.node_count, 2);

        assert!(registry
            .get_node_for_partition("node-c", 60)
            .await
            .unwrap()
            .is_none());
        assert_eq!(registry.get_last_heartbeat().await.unwrap(), Some(120));
        assert_eq!(registry.get_active_node_count(60).await.unwrap(), 3);
        assert_eq!(registry.get_active_node_count(120).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_missing_alerts_exclude_processed_and_claimed() {
        let registry = MemoryClusterRegistry::new();
        for node in ["a", "b"] {
            registry.register_heartbeat(node, 60).await.unwrap();
        }
        registry.register_heartbeat("a", 120).await.unwrap();
        registry.mark_partition_processed("a", 60).await.unwrap();

        let missing = registry.get_missing_alerts(120).await.unwrap();
        assert_eq!(
            missing,
            vec![AlertRecord {
                node_id: "b".to_string(),
                heartbeat: 60,
                partition_no: 1,
                node_count: 2,
            }]
        );

        registry
            .check_in_node_processing_missing_alerts(&MissingAlertsCheckIn {
                node_id: "a".to_string(),
                run_type: RunType::Missing,
                interval: 120,
                records: missing,
            })
            .await
            .unwrap();

        assert!(registry.get_missing_alerts(120).await.unwrap().is_empty());
        assert_eq!(registry.check_ins().await.len(), 1);
        assert!(registry.is_processed("a", 60).await);
    }

    #[tokio::test]
    async fn test_release_only_own_claims() {
        let registry = MemoryClusterRegistry::new();
        registry.register_heartbeat("gone", 60).await.unwrap();
        let missing = registry.get_missing_alerts(120).await.unwrap();
        registry
            .check_in_node_processing_missing_alerts(&MissingAlertsCheckIn {
                node_id: "a".to_string(),
                run_type: RunType::Missing,
                interval: 120,
                records: missing.clone(),
            })
            .await
            .unwrap();

        registry.release_missing_alerts("b", &missing).await.unwrap();
        assert!(registry.get_missing_alerts(120).await.unwrap().is_empty());

        registry.release_missing_alerts("a", &missing).await.unwrap();
        assert_eq!(registry.get_missing_alerts(120).await.unwrap(), missing);
    }

    #[tokio::test]
    async fn test_prune_history_drops_old_intervals() {
        let registry = MemoryClusterRegistry::new();
        for heartbeat in [0, 60, 120, 180] {
            registry.register_heartbeat("a", heartbeat).await.unwrap();
            registry.register_heartbeat("b", heartbeat).await.unwrap();
        }
        registry.mark_partition_processed("a", 60).await.unwrap();
        registry
            .check_in_node_processing_missing_alerts(&MissingAlertsCheckIn {
                node_id: "a".to_string(),
                run_type: RunType::Missing,
                interval: 60,
                records: Vec::new(),
            })
            .await
            .unwrap();

        assert_eq!(registry.prune_history(120).await.unwrap(), 4);
        assert!(!registry.is_processed("a", 60).await);
        assert!(registry.check_ins().await.is_empty());

        let heartbeats: Vec<i64> = registry
            .get_missing_alerts(200)
            .await
            .unwrap()
            .iter()
            .map(|r| r.heartbeat)
            .collect();
        assert_eq!(heartbeats, vec![120, 120, 180, 180]);
        assert_eq!(registry.prune_history(120).await.unwrap(), 0);
    }
}
