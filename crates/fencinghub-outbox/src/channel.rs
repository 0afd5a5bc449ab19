//! 跨上下文广播 - 页面与后台 worker 之间的消息通道
//!
//! 两个上下文不共享内存，只通过持久化队列和这里的消息协作：
//! worker 同步完成后广播 `OUTBOX_UPDATED`，页面请求 worker 立即同步时发 `SYNC_NOW`。
//! 每个上下文只处理来自另一方的消息。

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

use fencinghub_protocol::ContextMessage;

/// 执行上下文
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContextRole {
    /// 页面（可能同时打开多个）
    Page,
    /// 后台同步 worker
    Worker,
}

/// 带发送方的消息
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub from: ContextRole,
    pub message: ContextMessage,
}

#[derive(Debug, Clone)]
pub struct ContextChannel {
    sender: broadcast::Sender<Envelope>,
}

impl ContextChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// 以 `from` 的身份发送；返回收到消息的上下文数
    pub fn post(&self, from: ContextRole, message: ContextMessage) -> usize {
        debug!("{:?} 广播消息: {:?}", from, message);
        self.sender.send(Envelope { from, message }).unwrap_or(0)
    }

    /// 以 `role` 的身份订阅；自己发出的消息会被过滤
    pub fn subscribe(&self, role: ContextRole) -> ContextReceiver {
        ContextReceiver {
            role,
            receiver: self.sender.subscribe(),
        }
    }
}

impl Default for ContextChannel {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_BUFFER_SIZE)
    }
}

pub struct ContextReceiver {
    role: ContextRole,
    receiver: broadcast::Receiver<Envelope>,
}

impl ContextReceiver {
    /// 等待下一条来自其他上下文的消息；通道关闭时返回 None
    pub async fn recv(&mut self) -> Option<ContextMessage> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.from != self.role => return Some(envelope.message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    debug!("{:?} 跳过 {} 条积压消息", self.role, skipped);
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
