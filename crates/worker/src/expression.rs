//! 阈值表达式：`<reducer>(<query>) <op> <number>`
//!
//! 每条返回的序列产生一个结果，比较成立为 `1`，否则为 `0`。

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use alerting_core::{
    evaluation::{ExpressionEngine, QueryCache, SeriesResult},
    SchedulerError, SchedulerResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reducer {
    Avg,
    Median,
    Min,
    Max,
    Sum,
    Last,
    Count,
}

impl Reducer {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "avg" => Some(Reducer::Avg),
            "median" => Some(Reducer::Median),
            "min" => Some(Reducer::Min),
            "max" => Some(Reducer::Max),
            "sum" => Some(Reducer::Sum),
            "last" => Some(Reducer::Last),
            "count" => Some(Reducer::Count),
            _ => None,
        }
    }

    /// 空序列除 `count` 外都归约为 NaN，任何比较都不成立
    pub fn reduce(&self, values: &[f64]) -> f64 {
        if values.is_empty() {
            return match self {
                Reducer::Count => 0.0,
                _ => f64::NAN,
            };
        }

        match self {
            Reducer::Avg => values.iter().sum::<f64>() / values.len() as f64,
            Reducer::Median => {
                let mut sorted = values.to_vec();
                sorted.sort_by(|a, b| a.total_cmp(b));
                let mid = sorted.len() / 2;
                if sorted.len() % 2 == 0 {
                    (sorted[mid - 1] + sorted[mid]) / 2.0
                } else {
                    sorted[mid]
                }
            }
            Reducer::Min => values.iter().copied().fold(f64::INFINITY, f64::min),
            Reducer::Max => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Reducer::Sum => values.iter().sum(),
            Reducer::Last => values[values.len() - 1],
            Reducer::Count => values.len() as f64,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Reducer::Avg => "avg",
            Reducer::Median => "median",
            Reducer::Min => "min",
            Reducer::Max => "max",
            Reducer::Sum => "sum",
            Reducer::Last => "last",
            Reducer::Count => "count",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Comparison {
    Gt,
    Ge,
    Lt,
    Le,
    Eq,
    Ne,
}

impl Comparison {
    pub fn holds(&self, left: f64, right: f64) -> bool {
        if left.is_nan() {
            return false;
        }
        match self {
            Comparison::Gt => left > right,
            Comparison::Ge => left >= right,
            Comparison::Lt => left < right,
            Comparison::Le => left <= right,
            Comparison::Eq => left == right,
            Comparison::Ne => left != right,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Comparison::Gt => ">",
            Comparison::Ge => ">=",
            Comparison::Lt => "<",
            Comparison::Le => "<=",
            Comparison::Eq => "==",
            Comparison::Ne => "!=",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdExpression {
    pub reducer: Reducer,
    pub query: String,
    pub comparison: Comparison,
    pub threshold: f64,
}

impl fmt::Display for ThresholdExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}({}) {} {}",
            self.reducer.as_str(),
            self.query,
            self.comparison.as_str(),
            self.threshold
        )
    }
}

impl FromStr for ThresholdExpression {
    type Err = SchedulerError;

    fn from_str(expr: &str) -> Result<Self, Self::Err> {
        let invalid = |message: &str| SchedulerError::invalid_expression(expr, message);
        let trimmed = expr.trim();

        let open = trimmed
            .find('(')
            .ok_or_else(|| invalid("expected <reducer>(<query>)"))?;
        let reducer_name = trimmed[..open].trim();
        let reducer = Reducer::parse(reducer_name)
            .ok_or_else(|| invalid(&format!("unknown reducer '{reducer_name}'")))?;

        // 查询本身可以带括号，例如 sumSeries(a.*)
        let mut depth = 0usize;
        let mut close = None;
        for (i, c) in trimmed[open..].char_indices() {
            match c {
                '(' => depth += 1,
                ')' => {
                    depth -= 1;
                    if depth == 0 {
                        close = Some(open + i);
                        break;
                    }
                }
                _ => {}
            }
        }
        let close = close.ok_or_else(|| invalid("unbalanced parentheses"))?;

        let query = trimmed[open + 1..close].trim();
        if query.is_empty() {
            return Err(invalid("empty query"));
        }

        let rest = trimmed[close + 1..].trim();
        let (comparison, operand) = [
            (">=", Comparison::Ge),
            ("<=", Comparison::Le),
            ("==", Comparison::Eq),
            ("!=", Comparison::Ne),
            (">", Comparison::Gt),
            ("<", Comparison::Lt),
        ]
        .iter()
        .find_map(|(token, op)| rest.strip_prefix(token).map(|operand| (*op, operand)))
        .ok_or_else(|| invalid("expected comparison operator"))?;

        let threshold: f64 = operand
            .trim()
            .parse()
            .map_err(|_| invalid(&format!("invalid threshold '{}'", operand.trim())))?;

        Ok(Self {
            reducer,
            query: query.to_string(),
            comparison,
            threshold,
        })
    }
}

/// 阈值表达式引擎
#[derive(Debug, Clone)]
pub struct ThresholdEngine {
    lookback: Duration,
}

impl Default for ThresholdEngine {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

impl ThresholdEngine {
    pub fn new(lookback: Duration) -> Self {
        Self { lookback }
    }
}

#[async_trait]
impl ExpressionEngine for ThresholdEngine {
    fn validate(&self, expression: &str) -> SchedulerResult<()> {
        expression.parse::<ThresholdExpression>().map(|_| ())
    }

    async fn evaluate(
        &self,
        expression: &str,
        reference_time: DateTime<Utc>,
        cache: &QueryCache,
    ) -> SchedulerResult<Vec<SeriesResult>> {
        let parsed: ThresholdExpression = expression.parse()?;
        let lookback = chrono::Duration::from_std(self.lookback)
            .map_err(|e| SchedulerError::Configuration(format!("无效的查询回溯窗口: {e}")))?;

        let series = cache
            .fetch(&parsed.query, reference_time - lookback, reference_time)
            .await?;

        Ok(series
            .iter()
            .map(|s| {
                let values: Vec<f64> = s.values().collect();
                let reduced = parsed.reducer.reduce(&values);
                let fired = parsed.comparison.holds(reduced, parsed.threshold);
                SeriesResult {
                    target: s.target.clone(),
                    value: if fired { 1.0 } else { 0.0 },
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_testing_utils::{at, StaticSeriesSource};
    use std::sync::Arc;

    #[test]
    fn test_parse_expressions() {
        let expr: ThresholdExpression = "median(servers.*.cpu) > 100".parse().unwrap();
        assert_eq!(expr.reducer, Reducer::Median);
        assert_eq!(expr.query, "servers.*.cpu");
        assert_eq!(expr.comparison, Comparison::Gt);
        assert_eq!(expr.threshold, 100.0);

        let expr: ThresholdExpression = "max(sumSeries(a.*, b.*)) <= -2.5".parse().unwrap();
        assert_eq!(expr.query, "sumSeries(a.*, b.*)");
        assert_eq!(expr.comparison, Comparison::Le);
        assert_eq!(expr.threshold, -2.5);

        assert_eq!(expr.to_string(), "max(sumSeries(a.*, b.*)) <= -2.5");
    }

    #[test]
    fn test_parse_errors_are_invalid_expressions() {
        for bad in [
            "X > 100",
            "mode(x) > 1",
            "max(x > 1",
            "max() > 1",
            "max(x) ~ 1",
            "max(x) > abc",
            "",
        ] {
            let err = bad.parse::<ThresholdExpression>().unwrap_err();
            assert!(err.is_configuration_error(), "{bad}");
        }
    }

    #[test]
    fn test_reducers() {
        let values = [4.0, 1.0, 3.0, 2.0];
        assert_eq!(Reducer::Avg.reduce(&values), 2.5);
        assert_eq!(Reducer::Median.reduce(&values), 2.5);
        assert_eq!(Reducer::Median.reduce(&[5.0, 1.0, 3.0]), 3.0);
        assert_eq!(Reducer::Min.reduce(&values), 1.0);
        assert_eq!(Reducer::Max.reduce(&values), 4.0);
        assert_eq!(Reducer::Sum.reduce(&values), 10.0);
        assert_eq!(Reducer::Last.reduce(&values), 2.0);
        assert_eq!(Reducer::Count.reduce(&values), 4.0);
        assert_eq!(Reducer::Count.reduce(&[]), 0.0);
        assert!(!Comparison::Lt.holds(Reducer::Max.reduce(&[]), 1.0));
    }

    #[tokio::test]
    async fn test_evaluate_produces_one_result_per_series() {
        let source = StaticSeriesSource::new().with_values("x", &[&[150.0], &[50.0]]);
        let cache = QueryCache::new(Arc::new(source));
        let engine = ThresholdEngine::default();

        let results = engine
            .evaluate("median(x) > 100", at(1_000), &cache)
            .await
            .unwrap();
        assert_eq!(results.len(), 2);
        assert!(results[0].fired());
        assert!(!results[1].fired());
    }
}
