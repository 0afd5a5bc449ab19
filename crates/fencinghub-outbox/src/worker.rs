//! 后台同步 worker
//!
//! 在没有页面打开时由平台唤醒。收到匹配 tag 的 `WakeEvent` 或页面发来的
//! `SYNC_NOW` 时，对同一个持久化队列执行与页面完全相同的同步，成功后向所有
//! 页面广播 `OUTBOX_UPDATED`，让它们刷新待同步计数。

use std::sync::Arc;

use tokio::select;
use tokio::sync::{mpsc, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use fencinghub_protocol::ContextMessage;

use crate::background_sync::WakeEvent;
use crate::channel::{ContextChannel, ContextRole};
use crate::sync::{OutboxDrainer, SyncOutcome};

#[derive(Debug)]
pub struct SyncWorker {
    drainer: Arc<OutboxDrainer>,
    channel: ContextChannel,
    tag: String,
    shutdown_signal: Arc<Notify>,
}

impl SyncWorker {
    pub fn new(drainer: Arc<OutboxDrainer>, channel: ContextChannel, tag: impl Into<String>) -> Self {
        Self {
            drainer,
            channel,
            tag: tag.into(),
            shutdown_signal: Arc::new(Notify::new()),
        }
    }

    /// 处理平台唤醒；tag 不匹配时忽略
    pub async fn handle_wake(&self, event: &WakeEvent) -> Option<SyncOutcome> {
        if event.tag != self.tag {
            debug!("忽略不相关的唤醒: {}", event.tag);
            return None;
        }
        Some(self.run_sync().await)
    }

    /// 同步一次；真正提交过并拿到响应后通知所有页面
    pub async fn run_sync(&self) -> SyncOutcome {
        let outcome = self.drainer.sync().await;
        if outcome.skipped.is_none() && outcome.is_success() {
            let receivers = self.channel.post(ContextRole::Worker, ContextMessage::OutboxUpdated);
            debug!("已通知 {} 个页面刷新计数", receivers);
        } else if let Some(error) = &outcome.error {
            warn!("后台同步失败: {}", error);
        }
        outcome
    }

    /// 启动事件循环：平台唤醒 + 页面消息
    pub fn spawn(self: Arc<Self>, mut wake_events: mpsc::Receiver<WakeEvent>) -> JoinHandle<()> {
        let mut messages = self.channel.subscribe(ContextRole::Worker);
        let shutdown = self.shutdown_signal.clone();

        tokio::spawn(async move {
            info!("后台同步 worker 已启动 (tag={})", self.tag);
            loop {
                select! {
                    _ = shutdown.notified() => break,
                    wake = wake_events.recv() => match wake {
                        Some(event) => {
                            self.handle_wake(&event).await;
                        }
                        None => break,
                    },
                    message = messages.recv() => match message {
                        Some(ContextMessage::SyncNow) => {
                            self.run_sync().await;
                        }
                        Some(ContextMessage::OutboxUpdated) => {}
                        None => break,
                    },
                }
            }
            info!("后台同步 worker 已退出");
        })
    }

    pub fn stop(&self) {
        self.shutdown_signal.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use crate::events::OutboxEvents;
    use crate::http_client::BatchSyncClient;
    use crate::network::{NetworkMonitor, NetworkStatus};
    use crate::storage::{MemoryOutboxStore, OutboxStore};
    use crate::sync::RetryPolicy;
    use async_trait::async_trait;
    use fencinghub_protocol::{BatchSyncResponse, OutboxItem, OutboxKind};
    use serde_json::json;
    use std::time::Duration;

    #[derive(Debug)]
    struct AcceptAll;

    #[async_trait]
    impl BatchSyncClient for AcceptAll {
        async fn submit_batch(&self, items: &[OutboxItem]) -> Result<BatchSyncResponse> {
            Ok(BatchSyncResponse::from_outcome(items.iter().filter_map(|i| i.id).collect(), Vec::new()))
        }
    }

    fn worker(store: Arc<MemoryOutboxStore>, channel: ContextChannel) -> Arc<SyncWorker> {
        let drainer = Arc::new(OutboxDrainer::new(
            store,
            Arc::new(AcceptAll),
            Arc::new(NetworkMonitor::new(NetworkStatus::Online)),
            Arc::new(OutboxEvents::new(8)),
            RetryPolicy::unbounded(),
        ));
        Arc::new(SyncWorker::new(drainer, channel, "fencinghub-sync"))
    }

    async fn add_note(store: &MemoryOutboxStore) {
        store
            .add(OutboxItem::new(OutboxKind::Note, json!({ "content": "x" }), 1))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_wake_with_matching_tag_syncs_and_broadcasts() {
        let store = Arc::new(MemoryOutboxStore::new());
        let channel = ContextChannel::new(8);
        let mut page = channel.subscribe(ContextRole::Page);
        let worker = worker(store.clone(), channel);
        add_note(&store).await;

        assert!(worker.handle_wake(&WakeEvent { tag: "other".into() }).await.is_none());
        assert_eq!(store.count().await.unwrap(), 1);

        let outcome = worker
            .handle_wake(&WakeEvent { tag: "fencinghub-sync".into() })
            .await
            .unwrap();
        assert_eq!(outcome.processed, 1);
        assert_eq!(store.count().await.unwrap(), 0);
        assert_eq!(page.recv().await, Some(ContextMessage::OutboxUpdated));
    }

    #[tokio::test]
    async fn test_empty_queue_does_not_broadcast() {
        let store = Arc::new(MemoryOutboxStore::new());
        let channel = ContextChannel::new(8);
        let mut page = channel.subscribe(ContextRole::Page);
        let worker = worker(store, channel);

        worker.run_sync().await;
        let next = tokio::time::timeout(Duration::from_millis(50), page.recv()).await;
        assert!(next.is_err());
    }

    #[tokio::test]
    async fn test_sync_now_message_from_page() {
        let store = Arc::new(MemoryOutboxStore::new());
        let channel = ContextChannel::new(8);
        let mut page = channel.subscribe(ContextRole::Page);
        let (_wake_tx, wake_rx) = mpsc::channel(1);
        let worker = worker(store.clone(), channel.clone());
        let handle = worker.clone().spawn(wake_rx);
        add_note(&store).await;

        channel.post(ContextRole::Page, ContextMessage::SyncNow);
        let message = tokio::time::timeout(Duration::from_secs(1), page.recv()).await.unwrap();
        assert_eq!(message, Some(ContextMessage::OutboxUpdated));
        assert_eq!(store.count().await.unwrap(), 0);

        worker.stop();
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
