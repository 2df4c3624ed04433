//! 表达式/时序查询引擎的边界
//!
//! 引擎本身是外部协作者；核心只负责为每次评估构造一个共享的 [`QueryCache`]，
//! 使严重与警告表达式引用同一个查询时只执行一次，两次读取看到同一份数据快照。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::models::{CheckDefinition, CheckEvalResult};
use crate::SchedulerResult;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DataPoint {
    pub timestamp: i64,
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Series {
    pub target: String,
    pub datapoints: Vec<DataPoint>,
}

impl Series {
    pub fn new(target: impl Into<String>, values: &[f64]) -> Self {
        Self {
            target: target.into(),
            datapoints: values
                .iter()
                .enumerate()
                .map(|(i, v)| DataPoint {
                    timestamp: i as i64,
                    value: Some(*v),
                })
                .collect(),
        }
    }

    pub fn values(&self) -> impl Iterator<Item = f64> + '_ {
        self.datapoints.iter().filter_map(|p| p.value)
    }
}

/// 表达式在单个序列上的结果，非零表示触发
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesResult {
    pub target: String,
    pub value: f64,
}

impl SeriesResult {
    pub fn fired(&self) -> bool {
        self.value != 0.0 && !self.value.is_nan()
    }
}

/// 时序数据后端
#[async_trait]
pub trait SeriesSource: Send + Sync {
    async fn fetch(
        &self,
        query: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Series>>;
}

/// 表达式引擎
#[async_trait]
pub trait ExpressionEngine: Send + Sync {
    /// 仅做语法检查，调度定义入库前调用
    fn validate(&self, expression: &str) -> SchedulerResult<()>;

    async fn evaluate(
        &self,
        expression: &str,
        reference_time: DateTime<Utc>,
        cache: &QueryCache,
    ) -> SchedulerResult<Vec<SeriesResult>>;
}

/// 检查评估器：执行器只通过它得到三态结论
///
/// 返回错误时执行器把结果记为 `Unknown`。
#[async_trait]
pub trait CheckEvaluator: Send + Sync {
    async fn evaluate(
        &self,
        definition: &CheckDefinition,
        reference_time: DateTime<Utc>,
    ) -> SchedulerResult<CheckEvalResult>;
}

type CacheKey = (String, i64, i64);

/// 单次评估内共享的查询缓存
pub struct QueryCache {
    source: Arc<dyn SeriesSource>,
    entries: Mutex<HashMap<CacheKey, Arc<Vec<Series>>>>,
    fetches: AtomicU64,
}

impl QueryCache {
    pub fn new(source: Arc<dyn SeriesSource>) -> Self {
        Self {
            source,
            entries: Mutex::new(HashMap::new()),
            fetches: AtomicU64::new(0),
        }
    }

    pub async fn fetch(
        &self,
        query: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Arc<Vec<Series>>> {
        let key = (query.to_string(), from.timestamp(), until.timestamp());
        // 锁跨越后端调用，保证同一个查询只执行一次
        let mut entries = self.entries.lock().await;
        if let Some(hit) = entries.get(&key) {
            return Ok(Arc::clone(hit));
        }

        let series = Arc::new(self.source.fetch(query, from, until).await?);
        self.fetches.fetch_add(1, Ordering::Relaxed);
        entries.insert(key, Arc::clone(&series));
        Ok(series)
    }

    /// 实际发往后端的查询次数
    pub fn backend_fetches(&self) -> u64 {
        self.fetches.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for QueryCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryCache")
            .field("backend_fetches", &self.backend_fetches())
            .finish()
    }
}
