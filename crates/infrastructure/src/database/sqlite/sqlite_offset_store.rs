use alerting_core::{OffsetStore, SchedulerResult};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, SqlitePool};
use tracing::debug;

pub struct SqliteOffsetStore {
    pool: SqlitePool,
}

impl SqliteOffsetStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn get_scheduler_offset(&self, id: &str) -> SchedulerResult<Option<String>> {
        let row = sqlx::query("SELECT value FROM scheduler_offsets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set_scheduler_offset(&self, id: &str, value: &str) -> SchedulerResult<()> {
        sqlx::query(
            r#"
            INSERT INTO scheduler_offsets (id, value, updated_at)
            VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                value = excluded.value,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(id)
        .bind(value)
        .bind(Utc::now().timestamp())
        .execute(&self.pool)
        .await?;

        debug!("保存调度偏移 {} = {}", id, value);
        Ok(())
    }
}
