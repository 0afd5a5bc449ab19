//! 变更通知 - 进程内的发件箱计数变化事件
//!
//! 两种订阅方式：
//! - `subscribe(handler)`：回调式，返回 `Subscription`，调用 `unsubscribe()` 或 drop 即注销
//! - `receiver()`：`broadcast::Receiver`，适合在异步任务里 `recv().await`
//!
//! 事件不跨网络，也不跨上下文；跨上下文的通知走 `ContextChannel`。

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use tokio::sync::broadcast;
use tracing::debug;

use crate::utils::time::now_millis;

/// 计数变化的原因
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeReason {
    /// 新条目入队
    Enqueued { id: i64 },
    /// 同步后删除了已确认的条目
    Drained { count: usize },
    /// 条目超过重试上限被移入死信表
    DeadLettered { count: usize },
    /// 死信条目重新入队
    Requeued { id: i64 },
    /// 另一个上下文完成了同步，本地计数需要刷新
    RemoteSync,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboxEvent {
    pub reason: ChangeReason,
    pub timestamp: i64,
}

impl OutboxEvent {
    pub fn new(reason: ChangeReason) -> Self {
        Self {
            reason,
            timestamp: now_millis(),
        }
    }
}

pub type OutboxListener = Arc<dyn Fn(&OutboxEvent) + Send + Sync>;

type ListenerMap = RwLock<HashMap<u64, OutboxListener>>;

/// 发件箱变更总线
pub struct OutboxEvents {
    sender: broadcast::Sender<OutboxEvent>,
    listeners: Arc<ListenerMap>,
    next_listener_id: AtomicU64,
}

impl std::fmt::Debug for OutboxEvents {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OutboxEvents")
            .field("listeners", &self.listener_count())
            .field("receivers", &self.sender.receiver_count())
            .finish()
    }
}

impl OutboxEvents {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self {
            sender,
            listeners: Arc::new(RwLock::new(HashMap::new())),
            next_listener_id: AtomicU64::new(1),
        }
    }

    /// 注册回调；返回的 `Subscription` 被 drop 时自动注销
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&OutboxEvent) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.write().insert(id, Arc::new(handler));
        debug!("注册发件箱监听器: {}", id);
        Subscription {
            id,
            listeners: Arc::downgrade(&self.listeners),
        }
    }

    pub fn receiver(&self) -> broadcast::Receiver<OutboxEvent> {
        self.sender.subscribe()
    }

    pub fn publish(&self, reason: ChangeReason) {
        let event = OutboxEvent::new(reason);
        debug!("发件箱变更: {:?}", event.reason);

        // 无接收者时 send 失败属正常情况
        let _ = self.sender.send(event.clone());

        // 先拷贝出监听器再调用，回调里可以安全地注销自己
        let listeners: Vec<OutboxListener> = self.listeners.read().values().cloned().collect();
        for listener in listeners {
            listener(&event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }
}

impl Default for OutboxEvents {
    fn default() -> Self {
        Self::new(crate::config::DEFAULT_EVENT_BUFFER_SIZE)
    }
}

/// 回调订阅句柄
#[must_use = "drop 后订阅立即失效"]
pub struct Subscription {
    id: u64,
    listeners: Weak<ListenerMap>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        drop(self);
    }

    fn remove(&self) {
        if let Some(listeners) = self.listeners.upgrade() {
            if listeners.write().remove(&self.id).is_some() {
                debug!("注销发件箱监听器: {}", self.id);
            }
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.remove();
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription").field("id", &self.id).finish()
    }
}
