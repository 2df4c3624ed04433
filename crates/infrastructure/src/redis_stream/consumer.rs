use std::collections::HashMap;
use std::time::Duration;

use alerting_core::{Job, SchedulerError, SchedulerResult};
use redis::aio::ConnectionManager;
use redis::streams::{StreamReadOptions, StreamReadReply};
use redis::{AsyncCommands, Client, Value};
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

use crate::JobQueue;

const DEFAULT_BLOCK: Duration = Duration::from_secs(1);
const DEFAULT_BATCH: usize = 100;

/// 从 Redis Stream 读取作业放入执行队列
///
/// 只读取启动之后写入的条目；读取位置保存在进程内，重启后不会重放。
pub struct RedisStreamConsumer {
    connection: ConnectionManager,
    stream: String,
    last_id: String,
    block: Duration,
    batch: usize,
}

impl RedisStreamConsumer {
    pub async fn connect(redis_url: &str, stream: impl Into<String>) -> SchedulerResult<Self> {
        let client = Client::open(redis_url).map_err(|e| {
            SchedulerError::MessageBus(format!("Failed to create Redis client: {e}"))
        })?;
        let connection = ConnectionManager::new(client).await.map_err(|e| {
            SchedulerError::MessageBus(format!("Failed to connect to Redis at {redis_url}: {e}"))
        })?;

        let stream = stream.into();
        info!("Redis Stream 消费端已连接, stream={}", stream);
        Ok(Self {
            connection,
            stream,
            last_id: "$".to_string(),
            block: DEFAULT_BLOCK,
            batch: DEFAULT_BATCH,
        })
    }

    /// 读取一批条目，返回被执行队列接受的作业数
    pub async fn poll(&mut self, queue: &JobQueue) -> SchedulerResult<usize> {
        let options = StreamReadOptions::default()
            .block(self.block.as_millis() as usize)
            .count(self.batch);

        let reply: Option<StreamReadReply> = self
            .connection
            .xread_options(&[&self.stream], &[&self.last_id], &options)
            .await
            .map_err(|e| SchedulerError::MessageBus(format!("XREAD {} failed: {e}", self.stream)))?;

        let Some(reply) = reply else { return Ok(0) };
        let mut accepted = 0;
        for entry in reply.keys.iter().flat_map(|key| key.ids.iter()) {
            self.last_id = entry.id.clone();
            match decode_entry(&entry.id, &entry.map) {
                Ok(job) => {
                    if queue.put(job) {
                        accepted += 1;
                    }
                }
                Err(e) => warn!("跳过无法解析的流条目 {}: {}", entry.id, e),
            }
        }
        Ok(accepted)
    }

    pub async fn run(
        mut self,
        queue: JobQueue,
        mut shutdown: broadcast::Receiver<()>,
    ) -> SchedulerResult<()> {
        let backoff = self.block;
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!("流消费端收到关闭信号");
                    return Err(SchedulerError::Cancelled);
                }
                polled = self.poll(&queue) => {
                    if let Err(e) = polled {
                        warn!("读取作业流失败: {}", e);
                        tokio::time::sleep(backoff).await;
                    }
                }
            }
        }
    }
}

/// 从流条目的 `payload` 字段解出作业
pub fn decode_entry(id: &str, fields: &HashMap<String, Value>) -> SchedulerResult<Job> {
    let value = fields.get("payload").ok_or_else(|| {
        SchedulerError::Serialization(format!("stream entry {id} has no payload"))
    })?;
    let payload: String = redis::from_redis_value(value)
        .map_err(|e| SchedulerError::Serialization(format!("stream entry {id}: {e}")))?;
    Ok(serde_json::from_str(&payload)?)
}
