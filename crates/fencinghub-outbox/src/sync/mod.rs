//! 同步模块 - 把发件箱整批回放到批量同步端点
//!
//! - `OutboxDrainer`：单次同步（读取 → 提交 → 删除已确认条目）
//! - `AutoSync`：页面上下文的触发调度（启动、周期、重连、手动、跨上下文消息）
//! - `RetryPolicy`：被端点拒绝条目的重试上限

pub mod auto_sync;
pub mod drainer;
pub mod retry_policy;

pub use auto_sync::AutoSync;
pub use drainer::OutboxDrainer;
pub use retry_policy::{RetryPolicy, SyncFailureReason};

use fencinghub_protocol::FailedItem;

/// 本次同步没有发起网络请求的原因
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// 当前认为离线
    Offline,
    /// 队列为空
    Empty,
    /// 本上下文已有一次同步在进行
    AlreadySyncing,
}

/// 单次同步结果
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncOutcome {
    /// 端点确认处理、已从本地删除的条目数
    pub processed: usize,
    /// 本次提交的条目数
    pub submitted: usize,
    /// 端点明确拒绝的条目（仍留在队列，或已移入死信表）
    pub failed: Vec<FailedItem>,
    /// 本次移入死信表的本地 ID
    pub dead_lettered: Vec<i64>,
    /// 传输或本地错误；出现时队列保持原样
    pub error: Option<String>,
    pub failure_reason: Option<SyncFailureReason>,
    pub skipped: Option<SkipReason>,
}

impl SyncOutcome {
    pub fn skipped(reason: SkipReason) -> Self {
        Self {
            skipped: Some(reason),
            ..Default::default()
        }
    }

    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}
