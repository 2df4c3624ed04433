//! 两秒去重窗口
//!
//! 每个执行器 worker 持有一个窗口：当前秒与上一秒各一组已见作业键。
//! 出现更新的时间戳时显式轮转，旧的上一秒窗口整体丢弃。
//! 缺失告警补发的作业时间戳早于窗口，单独按 (键, 时间戳) 记录，只丢弃完全相同的重复。

use std::collections::{HashSet, VecDeque};

/// 补发记录最多保留的 (键, 时间戳) 数量
pub const REPLAY_MEMORY: usize = 4096;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeysSeen {
    pub timestamp: i64,
    seen: HashSet<String>,
}

impl KeysSeen {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            seen: HashSet::new(),
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// 返回 key 是否首次出现
    pub fn mark(&mut self, key: &str) -> bool {
        self.seen.insert(key.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// 作业准入判定
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Evaluate,
    /// 同一个键在同一时间戳上已经评估过
    Duplicate,
    /// 已经观察到更新的时间戳，且该时间戳早于上一秒窗口
    Stale,
}

impl Admission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Admission::Evaluate => "evaluate",
            Admission::Duplicate => "duplicate",
            Admission::Stale => "stale",
        }
    }
}

#[derive(Debug, Clone)]
pub struct DedupWindow {
    current: KeysSeen,
    previous: KeysSeen,
    replayed: HashSet<(String, i64)>,
    replay_order: VecDeque<(String, i64)>,
}

impl Default for DedupWindow {
    fn default() -> Self {
        Self::new()
    }
}

impl DedupWindow {
    pub fn new() -> Self {
        Self {
            current: KeysSeen::new(i64::MIN),
            previous: KeysSeen::new(i64::MIN),
            replayed: HashSet::new(),
            replay_order: VecDeque::new(),
        }
    }

    pub fn current(&self) -> &KeysSeen {
        &self.current
    }

    pub fn previous(&self) -> &KeysSeen {
        &self.previous
    }

    /// previous := current; current := 时间戳为 `timestamp` 的空窗口
    pub fn rotate(&mut self, timestamp: i64) {
        let current = std::mem::replace(&mut self.current, KeysSeen::new(timestamp));
        self.previous = current;
    }

    /// 判定作业是否需要评估；需要时同时在对应窗口中标记
    ///
    /// 时间戳落在两个窗口之间（上一秒之后、当前秒之前）时照常评估但不标记。
    pub fn admit(&mut self, key: &str, timestamp: i64) -> Admission {
        if timestamp > self.current.timestamp {
            self.rotate(timestamp);
        }

        if timestamp == self.current.timestamp {
            return if self.current.mark(key) {
                Admission::Evaluate
            } else {
                Admission::Duplicate
            };
        }

        if timestamp == self.previous.timestamp {
            return if self.previous.mark(key) {
                Admission::Evaluate
            } else {
                Admission::Duplicate
            };
        }

        if timestamp < self.previous.timestamp {
            return Admission::Stale;
        }

        Admission::Evaluate
    }

    /// 补发作业的准入：不判定过期，只丢弃同一键在同一时间戳上的重复
    ///
    /// 落在当前或上一秒窗口上的补发与普通作业共用窗口标记。
    pub fn admit_replay(&mut self, key: &str, timestamp: i64) -> Admission {
        if timestamp >= self.current.timestamp || timestamp == self.previous.timestamp {
            return self.admit(key, timestamp);
        }

        let entry = (key.to_string(), timestamp);
        if self.replayed.contains(&entry) {
            return Admission::Duplicate;
        }
        if self.replay_order.len() >= REPLAY_MEMORY {
            if let Some(oldest) = self.replay_order.pop_front() {
                self.replayed.remove(&oldest);
            }
        }
        self.replayed.insert(entry.clone());
        self.replay_order.push_back(entry);
        Admission::Evaluate
    }

    pub fn replayed_len(&self) -> usize {
        self.replayed.len()
    }
}
