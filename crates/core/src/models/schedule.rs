use serde::{Deserialize, Serialize};

use super::CheckDefinition;
use crate::{SchedulerError, SchedulerResult};

/// 监控检查的调度定义
///
/// 在时间戳 `ts` 上到期的条件：`(ts - offset) mod frequency == 0`。
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleDefinition {
    pub monitor_id: i64,
    pub org_id: i64,
    /// 执行频率（秒）
    pub frequency: u32,
    /// 频率窗口内的偏移（秒）
    #[serde(default)]
    pub offset: u32,
    pub check: CheckDefinition,
}

impl ScheduleDefinition {
    pub fn is_due(&self, unix_seconds: i64) -> bool {
        if self.frequency == 0 {
            return false;
        }
        (unix_seconds - self.offset as i64).rem_euclid(self.frequency as i64) == 0
    }

    /// 分区归属：monitor_id 对节点数取模
    pub fn in_partition(&self, partition_no: u32, node_count: u32) -> bool {
        if node_count == 0 {
            return false;
        }
        self.monitor_id.rem_euclid(node_count as i64) == partition_no as i64
    }

    pub fn validate(&self) -> SchedulerResult<()> {
        if self.frequency == 0 {
            return Err(SchedulerError::Configuration(format!(
                "monitor {} 的执行频率必须大于0",
                self.monitor_id
            )));
        }
        if self.offset >= self.frequency {
            return Err(SchedulerError::Configuration(format!(
                "monitor {} 的偏移 {} 必须小于频率 {}",
                self.monitor_id, self.offset, self.frequency
            )));
        }
        if self.check.is_empty() {
            return Err(SchedulerError::Configuration(format!(
                "monitor {} 没有配置任何检查表达式",
                self.monitor_id
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schedule(frequency: u32, offset: u32) -> ScheduleDefinition {
        ScheduleDefinition {
            monitor_id: 7,
            org_id: 1,
            frequency,
            offset,
            check: CheckDefinition::critical_only("max(a) > 1"),
        }
    }

    #[test]
    fn test_due_respects_frequency_and_offset() {
        let s = schedule(60, 15);
        assert!(s.is_due(15));
        assert!(s.is_due(75));
        assert!(!s.is_due(60));
        assert!(!s.is_due(16));
    }

    #[test]
    fn test_partition_membership() {
        let s = schedule(60, 0);
        assert!(s.in_partition(1, 3));
        assert!(!s.in_partition(0, 3));
        assert!(!s.in_partition(0, 0));
    }

    #[test]
    fn test_validate() {
        assert!(schedule(60, 0).validate().is_ok());
        assert!(schedule(0, 0).validate().is_err());
        assert!(schedule(60, 60).validate().is_err());

        let mut empty = schedule(60, 0);
        empty.check = CheckDefinition::new("", "");
        assert!(empty.validate().is_err());
    }
}
