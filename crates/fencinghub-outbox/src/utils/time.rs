//! 时间工具
//!
//! 存储层所有时间字段统一使用 UTC 毫秒时间戳（INTEGER）。

use chrono::Utc;
use std::sync::atomic::{AtomicI64, Ordering};

/// 当前 UTC 毫秒时间戳
pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// 单调不减的毫秒时钟
///
/// 系统时钟回拨时沿用上一次的值，保证同一上下文内 `createdAt` 不倒退。
#[derive(Debug, Default)]
pub struct MonotonicClock {
    last: AtomicI64,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn now(&self) -> i64 {
        self.observe(now_millis())
    }

    fn observe(&self, candidate: i64) -> i64 {
        let previous = self.last.fetch_max(candidate, Ordering::AcqRel);
        previous.max(candidate)
    }
}
