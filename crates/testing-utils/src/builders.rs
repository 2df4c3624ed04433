//! Test data builders
//!
//! Sensible defaults with easy customization.

use alerting_core::{CheckDefinition, Job, ScheduleDefinition};
use chrono::{DateTime, Utc};

use crate::helpers::at;

/// Builder for test ScheduleDefinition values
pub struct ScheduleBuilder {
    schedule: ScheduleDefinition,
}

impl ScheduleBuilder {
    pub fn new() -> Self {
        Self {
            schedule: ScheduleDefinition {
                monitor_id: 1,
                org_id: 1,
                frequency: 60,
                offset: 0,
                check: CheckDefinition::critical_only("max(test.series) > 100"),
            },
        }
    }

    pub fn with_monitor_id(mut self, monitor_id: i64) -> Self {
        self.schedule.monitor_id = monitor_id;
        self
    }

    pub fn with_org_id(mut self, org_id: i64) -> Self {
        self.schedule.org_id = org_id;
        self
    }

    pub fn with_frequency(mut self, frequency: u32) -> Self {
        self.schedule.frequency = frequency;
        self
    }

    pub fn with_offset(mut self, offset: u32) -> Self {
        self.schedule.offset = offset;
        self
    }

    pub fn with_critical(mut self, expression: &str) -> Self {
        self.schedule.check.critical_expression = expression.to_string();
        self
    }

    pub fn with_warning(mut self, expression: &str) -> Self {
        self.schedule.check.warning_expression = expression.to_string();
        self
    }

    pub fn build(self) -> ScheduleDefinition {
        self.schedule
    }
}

impl Default for ScheduleBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for test Job values
pub struct JobBuilder {
    schedule: ScheduleDefinition,
    last_point: DateTime<Utc>,
    generated_at: Option<DateTime<Utc>>,
}

impl JobBuilder {
    pub fn new() -> Self {
        Self {
            schedule: ScheduleBuilder::new().build(),
            last_point: at(0),
            generated_at: None,
        }
    }

    pub fn from_schedule(schedule: ScheduleDefinition) -> Self {
        Self {
            schedule,
            ..Self::new()
        }
    }

    pub fn with_monitor_id(mut self, monitor_id: i64) -> Self {
        self.schedule.monitor_id = monitor_id;
        self
    }

    pub fn with_org_id(mut self, org_id: i64) -> Self {
        self.schedule.org_id = org_id;
        self
    }

    pub fn with_check(mut self, check: CheckDefinition) -> Self {
        self.schedule.check = check;
        self
    }

    /// lastPointTimestamp in unix seconds
    pub fn at(mut self, seconds: i64) -> Self {
        self.last_point = at(seconds);
        self
    }

    pub fn generated_at(mut self, generated_at: DateTime<Utc>) -> Self {
        self.generated_at = Some(generated_at);
        self
    }

    pub fn build(self) -> Job {
        let generated_at = self.generated_at.unwrap_or(self.last_point);
        Job::from_schedule(&self.schedule, self.last_point, generated_at)
    }
}

impl Default for JobBuilder {
    fn default() -> Self {
        Self::new()
    }
}
