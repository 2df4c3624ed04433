pub mod sqlite_cluster_registry;
pub mod sqlite_offset_store;

pub use sqlite_cluster_registry::SqliteClusterRegistry;
pub use sqlite_offset_store::SqliteOffsetStore;

use std::str::FromStr;
use std::time::Duration;

use alerting_core::{config::DatabaseConfig, SchedulerResult};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite, SqlitePool};
use tracing::info;

const SCHEMA: &[&str] = &[
    r#"
    CREATE TABLE IF NOT EXISTS scheduler_offsets (
        id TEXT PRIMARY KEY,
        value TEXT NOT NULL,
        updated_at INTEGER NOT NULL
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS node_heartbeats (
        node_id TEXT NOT NULL,
        heartbeat INTEGER NOT NULL,
        processed INTEGER NOT NULL DEFAULT 0,
        claimed_by TEXT,
        PRIMARY KEY (node_id, heartbeat)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_node_heartbeats_heartbeat ON node_heartbeats (heartbeat)",
    r#"
    CREATE TABLE IF NOT EXISTS missing_alert_check_ins (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        node_id TEXT NOT NULL,
        run_type TEXT NOT NULL,
        interval INTEGER NOT NULL,
        records TEXT NOT NULL,
        checked_in_at INTEGER NOT NULL
    )
    "#,
];

pub struct DatabaseManager {
    pool: SqlitePool,
}

impl DatabaseManager {
    pub async fn new(config: &DatabaseConfig) -> SchedulerResult<Self> {
        let url = if config.url.is_empty() {
            "sqlite::memory:"
        } else {
            config.url.as_str()
        };
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);

        // 内存库每个连接都是独立的数据库，只能用单连接且不能回收
        let in_memory = url.contains(":memory:");
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new()
                .max_connections(config.max_connections)
                .min_connections(config.min_connections)
                .max_lifetime(Duration::from_secs(1800))
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.connection_timeout_seconds))
            .connect_with(options)
            .await?;

        Ok(Self { pool })
    }

    /// 单连接的内存库，测试使用
    pub async fn in_memory() -> SchedulerResult<Self> {
        let config = DatabaseConfig {
            url: "sqlite::memory:".to_string(),
            ..DatabaseConfig::default()
        };
        let manager = Self::new(&config).await?;
        manager.migrate().await?;
        Ok(manager)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn migrate(&self) -> SchedulerResult<()> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        info!("SQLite 表结构已就绪");
        Ok(())
    }

    pub async fn health_check(&self) -> SchedulerResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
    }
}

pub type DbPool = Pool<Sqlite>;
