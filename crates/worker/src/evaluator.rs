use std::sync::Arc;

use alerting_core::{
    evaluation::{CheckEvaluator, ExpressionEngine, QueryCache, SeriesSource},
    CheckDefinition, CheckEvalResult, SchedulerResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

/// 基于表达式引擎的检查评估器
///
/// 每次评估新建一个 [`QueryCache`]，严重与警告表达式共享；先评估严重表达式，
/// 任一序列触发即返回 `Critical`，不再评估警告表达式。
pub struct ExpressionCheckEvaluator {
    engine: Arc<dyn ExpressionEngine>,
    source: Arc<dyn SeriesSource>,
}

impl ExpressionCheckEvaluator {
    pub fn new(engine: Arc<dyn ExpressionEngine>, source: Arc<dyn SeriesSource>) -> Self {
        Self { engine, source }
    }

    /// 单个表达式在所有序列上取最坏结果
    async fn evaluate_expression(
        &self,
        expression: &str,
        verdict: CheckEvalResult,
        reference_time: DateTime<Utc>,
        cache: &QueryCache,
    ) -> SchedulerResult<CheckEvalResult> {
        let results = self
            .engine
            .evaluate(expression, reference_time, cache)
            .await?;

        Ok(CheckEvalResult::worst_of(results.iter().map(|r| {
            if r.fired() {
                verdict
            } else {
                CheckEvalResult::Ok
            }
        })))
    }
}

#[async_trait]
impl CheckEvaluator for ExpressionCheckEvaluator {
    async fn evaluate(
        &self,
        definition: &CheckDefinition,
        reference_time: DateTime<Utc>,
    ) -> SchedulerResult<CheckEvalResult> {
        let cache = QueryCache::new(Arc::clone(&self.source));

        if let Some(critical) = definition.critical() {
            let result = self
                .evaluate_expression(critical, CheckEvalResult::Critical, reference_time, &cache)
                .await?;
            if result == CheckEvalResult::Critical {
                debug!("严重表达式触发: {}", critical);
                return Ok(result);
            }
        }

        if let Some(warning) = definition.warning() {
            return self
                .evaluate_expression(warning, CheckEvalResult::Warning, reference_time, &cache)
                .await;
        }

        Ok(CheckEvalResult::Ok)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expression::ThresholdEngine;
    use alerting_testing_utils::{at, StaticSeriesSource};

    fn evaluator(source: &StaticSeriesSource) -> ExpressionCheckEvaluator {
        ExpressionCheckEvaluator::new(
            Arc::new(ThresholdEngine::default()),
            Arc::new(source.clone()),
        )
    }

    #[tokio::test]
    async fn test_worst_of_severity_across_series() {
        let source = StaticSeriesSource::new()
            .with_values("high", &[&[150.0], &[200.0]])
            .with_values("low", &[&[10.0], &[10.0], &[60.0]])
            .with_values("mixed", &[&[100.0], &[150.0], &[200.0]]);
        let evaluator = evaluator(&source);

        let high = CheckDefinition::critical_only("median(high) > 100");
        assert_eq!(
            evaluator.evaluate(&high, at(1_000)).await.unwrap(),
            CheckEvalResult::Critical
        );

        let low = CheckDefinition::critical_only("median(low) > 100");
        assert_eq!(
            evaluator.evaluate(&low, at(1_000)).await.unwrap(),
            CheckEvalResult::Ok
        );

        let mixed = CheckDefinition::new("median(mixed) > 200", "median(mixed) < 150");
        assert_eq!(
            evaluator.evaluate(&mixed, at(1_000)).await.unwrap(),
            CheckEvalResult::Warning
        );
    }

    #[tokio::test]
    async fn test_critical_short_circuits_warning() {
        let source = StaticSeriesSource::new()
            .with_values("a", &[&[500.0]])
            .with_values("b", &[&[500.0]]);
        let evaluator = evaluator(&source);

        let check = CheckDefinition::new("max(a) > 100", "max(b) > 10");
        assert_eq!(
            evaluator.evaluate(&check, at(1_000)).await.unwrap(),
            CheckEvalResult::Critical
        );
        assert_eq!(source.fetches_for("b"), 0);
    }

    #[tokio::test]
    async fn test_shared_query_is_fetched_once() {
        let source = StaticSeriesSource::new().with_values("x", &[&[40.0, 60.0]]);
        let evaluator = evaluator(&source);

        let check = CheckDefinition::new("max(x) > 500", "min(x) > 0");
        assert_eq!(
            evaluator.evaluate(&check, at(1_000)).await.unwrap(),
            CheckEvalResult::Warning
        );
        assert_eq!(source.fetches_for("x"), 1);

        // 下一次评估使用新的缓存
        evaluator.evaluate(&check, at(1_001)).await.unwrap();
        assert_eq!(source.fetches_for("x"), 2);
    }

    #[tokio::test]
    async fn test_empty_definition_is_ok_and_errors_propagate() {
        let source = StaticSeriesSource::new();
        let evaluator = evaluator(&source);

        assert_eq!(
            evaluator
                .evaluate(&CheckDefinition::new("", ""), at(0))
                .await
                .unwrap(),
            CheckEvalResult::Ok
        );

        let err = evaluator
            .evaluate(&CheckDefinition::critical_only("nonsense"), at(0))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());

        // 查询后端失败不是配置错误
        let err = evaluator
            .evaluate(&CheckDefinition::critical_only("max(missing) > 1"), at(0))
            .await
            .unwrap_err();
        assert!(!err.is_configuration_error());
    }
}
