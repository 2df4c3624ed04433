use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{CheckDefinition, RunType, ScheduleDefinition};

/// 一次待执行的检查，创建后不再修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub key: String,
    pub monitor_id: i64,
    pub org_id: i64,
    pub definition: CheckDefinition,
    pub last_point_timestamp: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    /// 缺失告警补发的作业为 `Missing`，执行器对它们不做过期判定
    #[serde(default)]
    pub run_type: RunType,
}

impl Job {
    pub fn from_schedule(
        schedule: &ScheduleDefinition,
        last_point_timestamp: DateTime<Utc>,
        generated_at: DateTime<Utc>,
    ) -> Self {
        Self {
            key: Self::key_for(schedule.org_id, schedule.monitor_id),
            monitor_id: schedule.monitor_id,
            org_id: schedule.org_id,
            definition: schedule.check.clone(),
            last_point_timestamp,
            generated_at,
            run_type: RunType::Normal,
        }
    }

    /// 标记为缺失告警补发的作业
    pub fn replayed(mut self) -> Self {
        self.run_type = RunType::Missing;
        self
    }

    pub fn is_replay(&self) -> bool {
        self.run_type == RunType::Missing
    }

    pub fn key_for(org_id: i64, monitor_id: i64) -> String {
        format!("{org_id}-{monitor_id}")
    }

    /// 去重窗口使用的秒级时间戳
    pub fn timestamp(&self) -> i64 {
        self.last_point_timestamp.timestamp()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_job_from_schedule() {
        let schedule = ScheduleDefinition {
            monitor_id: 42,
            org_id: 3,
            frequency: 10,
            offset: 0,
            check: CheckDefinition::critical_only("max(a) > 1"),
        };
        let point = Utc.timestamp_opt(1_000, 0).single().unwrap();
        let generated = Utc.timestamp_opt(1_030, 0).single().unwrap();

        let job = Job::from_schedule(&schedule, point, generated);
        assert_eq!(job.key, "3-42");
        assert_eq!(job.timestamp(), 1_000);
        assert_eq!(job.generated_at, generated);
        assert_eq!(job.definition, schedule.check);
        assert!(!job.is_replay());
        assert!(job.replayed().is_replay());
    }

    #[test]
    fn test_payload_without_run_type_is_normal() {
        let json = r#"{"key":"1-2","monitor_id":2,"org_id":1,
            "definition":{"critical_expression":"max(a) > 1"},
            "last_point_timestamp":"1970-01-01T00:16:40Z",
            "generated_at":"1970-01-01T00:16:40Z"}"#;
        let job: Job = serde_json::from_str(json).unwrap();
        assert_eq!(job.run_type, RunType::Normal);
    }
}
