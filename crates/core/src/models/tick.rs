use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};

use crate::{SchedulerError, SchedulerResult};

/// 调度心跳：`data_until` 之前的数据被认为已经可以查询
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tick {
    pub data_until: DateTime<Utc>,
    pub execute_at: DateTime<Utc>,
}

impl Tick {
    pub fn new(data_until: DateTime<Utc>, offset: SchedulerOffset) -> Self {
        Self {
            data_until,
            execute_at: data_until + offset.as_chrono(),
        }
    }
}

/// 调度器相对当前时间的有意滞后（秒级）
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SchedulerOffset(u64);

impl SchedulerOffset {
    pub const fn from_secs(seconds: u64) -> Self {
        Self(seconds)
    }

    pub fn as_secs(&self) -> u64 {
        self.0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(self.0)
    }

    pub fn as_chrono(&self) -> ChronoDuration {
        ChronoDuration::seconds(self.0 as i64)
    }
}

impl From<Duration> for SchedulerOffset {
    fn from(d: Duration) -> Self {
        Self(d.as_secs())
    }
}

impl fmt::Display for SchedulerOffset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}

/// 解析持久化的偏移值，接受 `"30"`、`"30s"`、`"2m"`、`"1h"`
impl FromStr for SchedulerOffset {
    type Err = SchedulerError;

    fn from_str(raw: &str) -> SchedulerResult<Self> {
        let value = raw.trim();
        if value.is_empty() {
            return Err(SchedulerError::OffsetStore("empty offset value".to_string()));
        }

        let (digits, multiplier) = match value.char_indices().last() {
            Some((idx, 's')) => (&value[..idx], 1),
            Some((idx, 'm')) => (&value[..idx], 60),
            Some((idx, 'h')) => (&value[..idx], 3600),
            _ => (value, 1),
        };

        let amount: u64 = digits.trim().parse().map_err(|_| {
            SchedulerError::OffsetStore(format!("invalid offset value: {raw:?}"))
        })?;

        Ok(Self(amount * multiplier))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_execute_at_includes_offset() {
        let data_until = Utc.timestamp_opt(1_000, 0).single().unwrap();
        let tick = Tick::new(data_until, SchedulerOffset::from_secs(30));
        assert_eq!(tick.execute_at.timestamp(), 1_030);
    }

    #[test]
    fn test_parse_offset_units() {
        assert_eq!("30".parse::<SchedulerOffset>().unwrap().as_secs(), 30);
        assert_eq!(" 45s ".parse::<SchedulerOffset>().unwrap().as_secs(), 45);
        assert_eq!("2m".parse::<SchedulerOffset>().unwrap().as_secs(), 120);
        assert_eq!("1h".parse::<SchedulerOffset>().unwrap().as_secs(), 3600);
    }

    #[test]
    fn test_parse_offset_rejects_garbage() {
        assert!("".parse::<SchedulerOffset>().is_err());
        assert!("-5".parse::<SchedulerOffset>().is_err());
        assert!("ten".parse::<SchedulerOffset>().is_err());
        assert!("5d".parse::<SchedulerOffset>().is_err());
    }
}
