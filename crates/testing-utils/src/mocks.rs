//! Mock implementations of the collaborator traits
//!
//! In-memory doubles with call recording and failure injection, usable
//! without databases, message buses or a time-series backend.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use alerting_core::{
    evaluation::{CheckEvaluator, Series, SeriesSource},
    AlertEngine, CheckDefinition, CheckEvalResult, DispatcherTask, Job, JobPublisher,
    ScheduleDefinition, ScheduleRepository, SchedulerError, SchedulerResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Mock schedule source with failure injection
#[derive(Debug, Clone, Default)]
pub struct MockScheduleRepository {
    schedules: Arc<Mutex<Vec<ScheduleDefinition>>>,
    queried: Arc<Mutex<Vec<i64>>>,
    failing: Arc<AtomicBool>,
}

impl MockScheduleRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_schedules(schedules: Vec<ScheduleDefinition>) -> Self {
        let repo = Self::new();
        *repo.schedules.lock().unwrap() = schedules;
        repo
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Timestamps passed to `get_due_schedules`, in call order
    pub fn queried_timestamps(&self) -> Vec<i64> {
        self.queried.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScheduleRepository for MockScheduleRepository {
    async fn get_due_schedules(
        &self,
        timestamp: DateTime<Utc>,
    ) -> SchedulerResult<Vec<ScheduleDefinition>> {
        let ts = timestamp.timestamp();
        self.queried.lock().unwrap().push(ts);

        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::ScheduleStore(
                "mock schedule store unavailable".to_string(),
            ));
        }

        Ok(self
            .schedules
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.is_due(ts))
            .cloned()
            .collect())
    }
}

/// Series source answering from a fixed table, counting backend fetches
#[derive(Debug, Clone, Default)]
pub struct StaticSeriesSource {
    series: Arc<Mutex<HashMap<String, Vec<Series>>>>,
    fetches: Arc<Mutex<Vec<String>>>,
    delay: Option<Duration>,
}

impl StaticSeriesSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// One series per inner slice
    pub fn with_values(self, query: &str, series: &[&[f64]]) -> Self {
        let series = series
            .iter()
            .enumerate()
            .map(|(i, values)| Series::new(format!("{query}.{i}"), values))
            .collect();
        self.series.lock().unwrap().insert(query.to_string(), series);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetches.lock().unwrap().len()
    }

    pub fn fetches_for(&self, query: &str) -> usize {
        self.fetches
            .lock()
            .unwrap()
            .iter()
            .filter(|q| q.as_str() == query)
            .count()
    }
}

#[async_trait]
impl SeriesSource for StaticSeriesSource {
    async fn fetch(
        &self,
        query: &str,
        _from: DateTime<Utc>,
        _until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Series>> {
        self.fetches.lock().unwrap().push(query.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.series
            .lock()
            .unwrap()
            .get(query)
            .cloned()
            .ok_or_else(|| SchedulerError::Query {
                query: query.to_string(),
                message: "unknown query".to_string(),
            })
    }
}

/// Evaluator returning a fixed verdict and recording every call
#[derive(Debug, Clone)]
pub struct MockCheckEvaluator {
    result: Arc<Mutex<SchedulerResult<CheckEvalResult>>>,
    calls: Arc<Mutex<Vec<(CheckDefinition, i64)>>>,
    delay: Option<Duration>,
}

impl MockCheckEvaluator {
    pub fn returning(result: CheckEvalResult) -> Self {
        Self {
            result: Arc::new(Mutex::new(Ok(result))),
            calls: Arc::new(Mutex::new(Vec::new())),
            delay: None,
        }
    }

    /// Every evaluation fails with an invalid-expression error
    pub fn invalid_expression() -> Self {
        let evaluator = Self::returning(CheckEvalResult::Ok);
        *evaluator.result.lock().unwrap() = Err(SchedulerError::invalid_expression(
            "bad(",
            "unexpected end of input",
        ));
        evaluator
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Reference times (unix seconds) of every call, in call order
    pub fn reference_times(&self) -> Vec<i64> {
        self.calls.lock().unwrap().iter().map(|(_, ts)| *ts).collect()
    }
}

#[async_trait]
impl CheckEvaluator for MockCheckEvaluator {
    async fn evaluate(
        &self,
        definition: &CheckDefinition,
        reference_time: DateTime<Utc>,
    ) -> SchedulerResult<CheckEvalResult> {
        self.calls
            .lock()
            .unwrap()
            .push((definition.clone(), reference_time.timestamp()));
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match &*self.result.lock().unwrap() {
            Ok(result) => Ok(*result),
            Err(SchedulerError::InvalidExpression { expr, message }) => {
                Err(SchedulerError::invalid_expression(expr.clone(), message.clone()))
            }
            Err(e) => Err(SchedulerError::Internal(e.to_string())),
        }
    }
}

/// Alert engine recording dispatched tasks, with settable pending depth
#[derive(Debug, Clone, Default)]
pub struct MockAlertEngine {
    dispatched: Arc<Mutex<Vec<DispatcherTask>>>,
    pending: Arc<AtomicUsize>,
    failing: Arc<AtomicBool>,
}

impl MockAlertEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pending(&self, pending: usize) {
        self.pending.store(pending, Ordering::SeqCst);
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub fn dispatched(&self) -> Vec<DispatcherTask> {
        self.dispatched.lock().unwrap().clone()
    }
}

#[async_trait]
impl AlertEngine for MockAlertEngine {
    async fn dispatch(&self, task: &DispatcherTask) -> SchedulerResult<usize> {
        self.dispatched.lock().unwrap().push(task.clone());
        if self.failing.load(Ordering::SeqCst) {
            return Err(SchedulerError::ScheduleStore(
                "mock dispatch failure".to_string(),
            ));
        }
        Ok(0)
    }

    fn pending_jobs(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}

/// Publisher recording every successful publish; the first `fail_first`
/// attempts fail
#[derive(Debug, Clone, Default)]
pub struct RecordingPublisher {
    published: Arc<Mutex<Vec<(String, Job)>>>,
    attempts: Arc<AtomicUsize>,
    fail_first: usize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_first(attempts: usize) -> Self {
        Self {
            fail_first: attempts,
            ..Self::default()
        }
    }

    pub fn published(&self) -> Vec<(String, Job)> {
        self.published.lock().unwrap().clone()
    }

    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl JobPublisher for RecordingPublisher {
    async fn publish(&self, routing_key: &str, job: &Job) -> SchedulerResult<()> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst);
        if attempt < self.fail_first {
            return Err(SchedulerError::MessageBus(format!(
                "mock publish failure #{}",
                attempt + 1
            )));
        }
        self.published
            .lock()
            .unwrap()
            .push((routing_key.to_string(), job.clone()));
        Ok(())
    }
}
