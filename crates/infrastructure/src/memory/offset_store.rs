use std::collections::HashMap;

use alerting_core::{OffsetStore, SchedulerResult};
use async_trait::async_trait;
use tokio::sync::RwLock;

/// 进程内的调度偏移存储
#[derive(Debug, Default)]
pub struct MemoryOffsetStore {
    offsets: RwLock<HashMap<String, String>>,
}

impl MemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OffsetStore for MemoryOffsetStore {
    async fn get_scheduler_offset(&self, id: &str) -> SchedulerResult<Option<String>> {
        Ok(self.offsets.read().await.get(id).cloned())
    }

    async fn set_scheduler_offset(&self, id: &str, value: &str) -> SchedulerResult<()> {
        self.offsets
            .write()
            .await
            .insert(id.to_string(), value.to_string());
        Ok(())
    }
}
