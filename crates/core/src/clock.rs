//! 时钟抽象
//!
//! Ticker 只依赖 [`Clock::now`]，截止时间按绝对时间戳计算，因此不会累积漂移。

use std::fmt::Debug;

use chrono::{DateTime, Duration as ChronoDuration, TimeZone, Utc};
use tokio::time::Instant;

pub trait Clock: Send + Sync + Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// 系统墙上时钟
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 锚定在 tokio 单调时钟上的墙上时间
///
/// 启动时记录一次墙上时间，之后只按单调时钟推进：不受系统时间回拨影响，
/// 在 `#[tokio::test(start_paused = true)]` 下随虚拟时间一起前进。
#[derive(Debug, Clone)]
pub struct InstantClock {
    anchor_wall: DateTime<Utc>,
    anchor_instant: Instant,
}

impl InstantClock {
    pub fn new() -> Self {
        Self::starting_at(Utc::now())
    }

    pub fn starting_at(anchor_wall: DateTime<Utc>) -> Self {
        Self {
            anchor_wall,
            anchor_instant: Instant::now(),
        }
    }

    /// 从整秒的 unix 时间戳开始
    pub fn starting_at_unix(seconds: i64) -> Self {
        let anchor = Utc
            .timestamp_opt(seconds, 0)
            .single()
            .unwrap_or_else(Utc::now);
        Self::starting_at(anchor)
    }
}

impl Default for InstantClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for InstantClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = self.anchor_instant.elapsed();
        let elapsed = ChronoDuration::from_std(elapsed).unwrap_or(ChronoDuration::zero());
        self.anchor_wall + elapsed
    }
}

/// 截断到整秒
pub fn truncate_to_second(ts: DateTime<Utc>) -> DateTime<Utc> {
    Utc.timestamp_opt(ts.timestamp(), 0).single().unwrap_or(ts)
}
