//! 跨上下文广播消息（worker <-> 页面）

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextMessage {
    /// worker 同步完成，页面应刷新待同步计数
    OutboxUpdated,
    /// 请求对端立即执行一次同步
    SyncNow,
}
