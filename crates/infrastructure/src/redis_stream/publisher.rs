use alerting_core::{Job, JobPublisher, SchedulerError, SchedulerResult};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::Client;
use tracing::{debug, info};

/// 以 `XADD` 把作业写入 Redis Stream
///
/// 连接由 `ConnectionManager` 自动重连；失败重试由调用方负责。
#[derive(Clone)]
pub struct RedisStreamPublisher {
    connection: ConnectionManager,
    stream: String,
}

impl RedisStreamPublisher {
    pub async fn connect(redis_url: &str, stream: impl Into<String>) -> SchedulerResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            SchedulerError::MessageBus(format!("Failed to create Redis client: {e}"))
        })?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            SchedulerError::MessageBus(format!("Failed to connect to Redis at {redis_url}: {e}"))
        })?;

        let stream = stream.into();
        info!("Redis Stream 发布端已连接, stream={}", stream);
        Ok(Self { connection, stream })
    }

    pub fn stream(&self) -> &str {
        &self.stream
    }
}

impl std::fmt::Debug for RedisStreamPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStreamPublisher")
            .field("stream", &self.stream)
            .finish()
    }
}

/// 流条目的字段：路由键、作业键和 JSON 负载
pub fn stream_entry_fields(routing_key: &str, job: &Job) -> SchedulerResult<Vec<(String, String)>> {
    let payload = serde_json::to_string(job)?;
    Ok(vec![
        ("routing_key".to_string(), routing_key.to_string()),
        ("job_key".to_string(), job.key.clone()),
        ("payload".to_string(), payload),
    ])
}

#[async_trait]
impl JobPublisher for RedisStreamPublisher {
    async fn publish(&self, routing_key: &str, job: &Job) -> SchedulerResult<()> {
        let fields = stream_entry_fields(routing_key, job)?;

        let mut cmd = redis::cmd("XADD");
        cmd.arg(&self.stream).arg("*");
        for (field, value) in &fields {
            cmd.arg(field).arg(value);
        }

        let mut connection = self.connection.clone();
        let entry_id: String = cmd.query_async(&mut connection).await.map_err(|e| {
            SchedulerError::MessageBus(format!("XADD {} failed: {e}", self.stream))
        })?;

        debug!("作业 {} 已发布到 {} ({})", job.key, self.stream, entry_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alerting_core::{CheckDefinition, ScheduleDefinition};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_stream_entry_fields() {
        let schedule = ScheduleDefinition {
            monitor_id: 9,
            org_id: 4,
            frequency: 60,
            offset: 0,
            check: CheckDefinition::critical_only("max(a) > 1"),
        };
        let ts = Utc.timestamp_opt(600, 0).single().unwrap();
        let job = Job::from_schedule(&schedule, ts, ts);

        let fields = stream_entry_fields("monitor.9", &job).unwrap();
        assert_eq!(fields[0], ("routing_key".to_string(), "monitor.9".to_string()));
        assert_eq!(fields[1].1, "4-9");

        let decoded: Job = serde_json::from_str(&fields[2].1).unwrap();
        assert_eq!(decoded, job);
    }
}
