//! Redis Stream 消息总线：调度侧 `XADD` 发布，执行侧 `XREAD` 消费

pub mod consumer;
pub mod publisher;

pub use consumer::{decode_entry, RedisStreamConsumer};
pub use publisher::{stream_entry_fields, RedisStreamPublisher};
