use serde::{Deserialize, Serialize};

use crate::config::RetryConfig;
use crate::error::OutboxError;

/// 同步失败原因分类
///
/// 所有原因都会在下一次触发时重试；分类只影响日志和状态提示。
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SyncFailureReason {
    /// 网络超时
    NetworkTimeout,
    /// 网络不可达（DNS、连接被拒）
    NetworkUnavailable,
    /// 端点返回非 2xx
    ServerError(u16),
    /// 会话失效，需要重新登录才能同步
    AuthFailure,
    /// 本地存储读写失败
    LocalStorage(String),
    /// 未知错误
    Unknown(String),
}

impl SyncFailureReason {
    /// 是否需要用户介入（重新登录）才能恢复
    pub fn needs_user_action(&self) -> bool {
        matches!(self, SyncFailureReason::AuthFailure)
    }
}

impl From<&OutboxError> for SyncFailureReason {
    fn from(error: &OutboxError) -> Self {
        match error {
            OutboxError::Transport(msg) => {
                let lower = msg.to_lowercase();
                if lower.contains("timed out") || lower.contains("timeout") {
                    SyncFailureReason::NetworkTimeout
                } else {
                    SyncFailureReason::NetworkUnavailable
                }
            }
            OutboxError::Server { status: 401 | 403, .. } => SyncFailureReason::AuthFailure,
            OutboxError::Server { status, .. } => SyncFailureReason::ServerError(*status),
            OutboxError::Database(msg) | OutboxError::StorageFull(msg) | OutboxError::Migration(msg) => {
                SyncFailureReason::LocalStorage(msg.clone())
            }
            other => SyncFailureReason::Unknown(other.to_string()),
        }
    }
}

/// 被端点明确拒绝的条目的处理策略
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetryPolicy {
    /// 累计被拒次数上限；None 表示永远留在队列里
    pub max_attempts: Option<u32>,
}

impl RetryPolicy {
    pub fn unbounded() -> Self {
        Self { max_attempts: None }
    }

    pub fn bounded(max_attempts: u32) -> Self {
        Self {
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// 第 `attempts` 次被拒后是否移入死信表
    pub fn should_dead_letter(&self, attempts: u32) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        match config.max_attempts {
            Some(max) => Self::bounded(max),
            None => Self::unbounded(),
        }
    }
}
