use std::collections::HashSet;
use std::path::Path;

use alerting_core::{
    evaluation::ExpressionEngine, ScheduleDefinition, ScheduleRepository, SchedulerError,
    SchedulerResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

/// 调度定义文件格式
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ScheduleFile {
    #[serde(default)]
    pub monitors: Vec<ScheduleDefinition>,
}

/// 内存中的调度定义仓库
///
/// 入库前校验每个定义，表达式无法解析的定义不会到达执行器。
#[derive(Debug, Default)]
pub struct MemoryScheduleRepository {
    schedules: RwLock<Vec<ScheduleDefinition>>,
}

impl MemoryScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// 由已校验的定义构造
    pub fn with_schedules(
        schedules: Vec<ScheduleDefinition>,
        engine: &dyn ExpressionEngine,
    ) -> SchedulerResult<Self> {
        validate_all(&schedules, engine)?;
        Ok(Self {
            schedules: RwLock::new(schedules),
        })
    }

    /// 从 TOML 或 JSON 文件加载，按扩展名区分格式
    pub async fn load_from_file(
        path: impl AsRef<Path>,
        engine: &dyn ExpressionEngine,
    ) -> SchedulerResult<Self> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            SchedulerError::ScheduleStore(format!("读取调度定义文件 {} 失败: {e}", path.display()))
        })?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let file: ScheduleFile = if is_json {
            serde_json::from_str(&content)?
        } else {
            toml::from_str(&content).map_err(|e| {
                SchedulerError::Configuration(format!(
                    "解析调度定义文件 {} 失败: {e}",
                    path.display()
                ))
            })?
        };

        info!(
            "从 {} 加载了 {} 个调度定义",
            path.display(),
            file.monitors.len()
        );
        Self::with_schedules(file.monitors, engine)
    }

    /// 新增或替换一个定义
    pub async fn upsert(
        &self,
        schedule: ScheduleDefinition,
        engine: &dyn ExpressionEngine,
    ) -> SchedulerResult<()> {
        validate_schedule(&schedule, engine)?;

        let mut schedules = self.schedules.write().await;
        match schedules
            .iter_mut()
            .find(|s| s.monitor_id == schedule.monitor_id)
        {
            Some(existing) => *existing = schedule,
            None => schedules.push(schedule),
        }
        Ok(())
    }

    pub async fn remove(&self, monitor_id: i64) -> bool {
        let mut schedules = self.schedules.write().await;
        let before = schedules.len();
        schedules.retain(|s| s.monitor_id != monitor_id);
        schedules.len() != before
    }

    pub async fn len(&self) -> usize {
        self.schedules.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.schedules.read().await.is_empty()
    }
}

#[async_trait]
impl ScheduleRepository for MemoryScheduleRepository {
    async fn get_due_schedules(
        &self,
        timestamp: DateTime<Utc>,
    ) -> SchedulerResult<Vec<ScheduleDefinition>> {
        let ts = timestamp.timestamp();
        let due: Vec<ScheduleDefinition> = self
            .schedules
            .read()
            .await
            .iter()
            .filter(|s| s.is_due(ts))
            .cloned()
            .collect();

        debug!("时间戳 {} 到期的调度定义: {}", ts, due.len());
        Ok(due)
    }
}

/// 结构与表达式语法校验
pub fn validate_schedule(
    schedule: &ScheduleDefinition,
    engine: &dyn ExpressionEngine,
) -> SchedulerResult<()> {
    schedule.validate()?;
    for expression in schedule.check.expressions() {
        engine.validate(expression)?;
    }
    Ok(())
}

fn validate_all(
    schedules: &[ScheduleDefinition],
    engine: &dyn ExpressionEngine,
) -> SchedulerResult<()> {
    let mut seen = HashSet::new();
    for schedule in schedules {
        if !seen.insert(schedule.monitor_id) {
            return Err(SchedulerError::Configuration(format!(
                "重复的 monitor_id: {}",
                schedule.monitor_id
            )));
        }
        validate_schedule(schedule, engine)?;
    }
    Ok(())
}
