use alerting_core::{
    AlertRecord, ClusterRegistry, MissingAlertsCheckIn, NodeInfo, SchedulerResult,
};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

/// 分区号是节点在同一心跳区间内按 node_id 排序的名次
///
/// 窗口按心跳区间划分，`filter` 只能按 heartbeat 过滤，否则名次会变。
fn ranked_heartbeats(filter: &str) -> String {
    format!(
        "SELECT node_id, heartbeat, processed, claimed_by, \
                ROW_NUMBER() OVER (PARTITION BY heartbeat ORDER BY node_id) - 1 AS partition_no, \
                COUNT(*) OVER (PARTITION BY heartbeat) AS node_count \
         FROM node_heartbeats WHERE {filter}"
    )
}

pub struct SqliteClusterRegistry {
    pool: SqlitePool,
}

impl SqliteClusterRegistry {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_record(row: &sqlx::sqlite::SqliteRow) -> SchedulerResult<AlertRecord> {
        Ok(AlertRecord {
            node_id: row.try_get("node_id")?,
            heartbeat: row.try_get("heartbeat")?,
            partition_no: row.try_get::<i64, _>("partition_no")? as u32,
            node_count: row.try_get::<i64, _>("node_count")? as u32,
        })
    }
}

#[async_trait]
impl ClusterRegistry for SqliteClusterRegistry {
    async fn register_heartbeat(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()> {
        sqlx::query(
            "INSERT INTO node_heartbeats (node_id, heartbeat) VALUES (?, ?) ON CONFLICT(node_id, heartbeat) DO NOTHING",
        )
        .bind(node_id)
        .bind(heartbeat)
        .execute(&self.pool)
        .await?;

        debug!("节点 {} 登记心跳 {}", node_id, heartbeat);
        Ok(())
    }

    async fn get_last_heartbeat(&self) -> SchedulerResult<Option<i64>> {
        let row = sqlx::query("SELECT MAX(heartbeat) AS heartbeat FROM node_heartbeats")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.try_get::<Option<i64>, _>("heartbeat")?)
    }

    async fn get_active_node_count(&self, since: i64) -> SchedulerResult<u32> {
        let row = sqlx::query(
            "SELECT COUNT(DISTINCT node_id) AS nodes FROM node_heartbeats WHERE heartbeat >= ?",
        )
        .bind(since)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.try_get::<i64, _>("nodes")? as u32)
    }

    async fn get_node_for_partition(
        &self,
        node_id: &str,
        heartbeat: i64,
    ) -> SchedulerResult<Option<NodeInfo>> {
        let sql = format!(
            "SELECT node_id, heartbeat, partition_no, node_count FROM ({}) WHERE node_id = ?",
            ranked_heartbeats("heartbeat = ?")
        );
        let row = sqlx::query(&sql)
            .bind(heartbeat)
            .bind(node_id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => {
                let record = Self::row_to_record(&row)?;
                Ok(Some(NodeInfo {
                    node_id: record.node_id,
                    heartbeat: record.heartbeat,
                    partition_no: record.partition_no,
                    node_count: record.node_count,
                }))
            }
            None => Ok(None),
        }
    }

    async fn mark_partition_processed(&self, node_id: &str, heartbeat: i64) -> SchedulerResult<()> {
        sqlx::query("UPDATE node_heartbeats SET processed = 1 WHERE node_id = ? AND heartbeat = ?")
            .bind(node_id)
            .bind(heartbeat)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_missing_alerts(&self, before: i64) -> SchedulerResult<Vec<AlertRecord>> {
        let sql = format!(
            "SELECT node_id, heartbeat, partition_no, node_count FROM ({}) \
             WHERE processed = 0 AND claimed_by IS NULL \
             ORDER BY heartbeat, node_id",
            ranked_heartbeats("heartbeat < ?")
        );
        let rows = sqlx::query(&sql).bind(before).fetch_all(&self.pool).await?;

        rows.iter().map(Self::row_to_record).collect()
    }

    async fn check_in_node_processing_missing_alerts(
        &self,
        check_in: &MissingAlertsCheckIn,
    ) -> SchedulerResult<()> {
        let records = serde_json::to_string(&check_in.records)?;
        let mut tx = self.pool.begin().await?;

        for record in &check_in.records {
            sqlx::query(
                "UPDATE node_heartbeats SET claimed_by = ? WHERE node_id = ? AND heartbeat = ? AND claimed_by IS NULL",
            )
            .bind(&check_in.node_id)
            .bind(&record.node_id)
            .bind(record.heartbeat)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            r#"
            INSERT INTO missing_alert_check_ins (node_id, run_type, interval, records, checked_in_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(&check_in.node_id)
        .bind(check_in.run_type.as_str())
        .bind(check_in.interval)
        .bind(records)
        .bind(Utc::now().timestamp())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        debug!(
            "节点 {} 认领了 {} 条缺失告警记录",
            check_in.node_id,
            check_in.records.len()
        );
        Ok(())
    }

    async fn release_missing_alerts(
        &self,
        node_id: &str,
        records: &[AlertRecord],
    ) -> SchedulerResult<()> {
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                "UPDATE node_heartbeats SET claimed_by = NULL WHERE node_id = ? AND heartbeat = ? AND claimed_by = ?",
            )
            .bind(&record.node_id)
            .bind(record.heartbeat)
            .bind(node_id)
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn prune_history(&self, before: i64) -> SchedulerResult<u64> {
        let mut tx = self.pool.begin().await?;
        let removed = sqlx::query("DELETE FROM node_heartbeats WHERE heartbeat < ?")
            .bind(before)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM missing_alert_check_ins WHERE interval < ?")
            .bind(before)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(removed)
    }
}
