//! Helpers shared by integration tests

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};

/// Whole-second UTC timestamp
pub fn at(seconds: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(seconds, 0)
        .single()
        .expect("timestamp out of range")
}

/// Poll `condition` every 10ms until it holds or `timeout` elapses.
///
/// Works under paused tokio time: each sleep auto-advances the clock.
pub async fn eventually<F, Fut>(timeout: Duration, mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition().await {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}
