//! Graphite 兼容的 `/render` 时序数据后端

use std::time::Duration;

use alerting_core::{
    config::QueryConfig,
    evaluation::{DataPoint, Series, SeriesSource},
    SchedulerError, SchedulerResult,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct RenderSeries {
    target: String,
    datapoints: Vec<(Option<f64>, i64)>,
}

/// 解析 `/render?format=json` 的响应体
pub fn parse_render_response(body: &str) -> SchedulerResult<Vec<Series>> {
    let raw: Vec<RenderSeries> = serde_json::from_str(body)?;
    Ok(raw
        .into_iter()
        .map(|s| Series {
            target: s.target,
            datapoints: s
                .datapoints
                .into_iter()
                .map(|(value, timestamp)| DataPoint { timestamp, value })
                .collect(),
        })
        .collect())
}

#[derive(Debug, Clone)]
pub struct HttpSeriesSource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpSeriesSource {
    pub fn new(config: &QueryConfig) -> SchedulerResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| SchedulerError::Configuration(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }
}

#[async_trait]
impl SeriesSource for HttpSeriesSource {
    async fn fetch(
        &self,
        query: &str,
        from: DateTime<Utc>,
        until: DateTime<Utc>,
    ) -> SchedulerResult<Vec<Series>> {
        let query_error = |message: String| SchedulerError::Query {
            query: query.to_string(),
            message,
        };

        let url = format!("{}/render", self.base_url);
        let response = self
            .client
            .get(&url)
            .query(&[
                ("target", query.to_string()),
                ("from", from.timestamp().to_string()),
                ("until", until.timestamp().to_string()),
                ("format", "json".to_string()),
            ])
            .send()
            .await
            .map_err(|e| query_error(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(query_error(format!("HTTP {status}")));
        }

        let body = response.text().await.map_err(|e| query_error(e.to_string()))?;
        let series = parse_render_response(&body).map_err(|e| query_error(e.to_string()))?;

        debug!("查询 {} 返回 {} 条序列", query, series.len());
        Ok(series)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_render_response() {
        let body = r#"[
            {"target": "servers.a.cpu", "datapoints": [[1.5, 100], [null, 110], [3.0, 120]]},
            {"target": "servers.b.cpu", "datapoints": []}
        ]"#;

        let series = parse_render_response(body).unwrap();
        assert_eq!(series.len(), 2);
        assert_eq!(series[0].target, "servers.a.cpu");
        assert_eq!(series[0].datapoints[1], DataPoint { timestamp: 110, value: None });
        assert_eq!(series[0].values().collect::<Vec<_>>(), vec![1.5, 3.0]);
        assert!(series[1].datapoints.is_empty());
    }

    #[test]
    fn test_parse_rejects_malformed_body() {
        assert!(parse_render_response("{\"error\": true}").is_err());
    }

    #[test]
    fn test_base_url_is_normalized() {
        let config = QueryConfig {
            base_url: "http://graphite:8080/".to_string(),
            ..QueryConfig::default()
        };
        let source = HttpSeriesSource::new(&config).unwrap();
        assert_eq!(source.base_url, "http://graphite:8080");
    }
}
