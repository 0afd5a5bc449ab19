//! 发件箱端到端行为（SQLite 存储 + 可编排的批量端点）

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use tempfile::TempDir;

use fencinghub_outbox::{
    BatchSyncClient, BatchSyncResponse, ChannelBackgroundSync, ContextChannel, ContextMessage, ContextRole,
    NetworkMonitor, NetworkStatus, OutboxConfig, OutboxContext, OutboxError, OutboxItem, OutboxKind, Result,
    SkipReason,
};

/// 记录每次调用；默认确认全部条目，也可以预置一次"不上报逐条结果"的应答
#[derive(Debug, Default)]
struct RecordingEndpoint {
    calls: Mutex<Vec<Vec<OutboxItem>>>,
    legacy_next: Mutex<bool>,
}

impl RecordingEndpoint {
    fn calls(&self) -> Vec<Vec<OutboxItem>> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl BatchSyncClient for RecordingEndpoint {
    async fn submit_batch(&self, items: &[OutboxItem]) -> Result<BatchSyncResponse> {
        self.calls.lock().push(items.to_vec());
        if std::mem::take(&mut *self.legacy_next.lock()) {
            return Ok(BatchSyncResponse {
                ok: true,
                processed_ids: None,
                failed: Vec::new(),
            });
        }
        Ok(BatchSyncResponse::from_outcome(
            items.iter().filter_map(|i| i.id).collect(),
            Vec::new(),
        ))
    }
}

fn config(dir: &TempDir) -> OutboxConfig {
    OutboxConfig::builder()
        .data_dir(dir.path())
        .server_url("http://127.0.0.1:9")
        .build()
}

async fn page_context(
    dir: &TempDir,
    endpoint: Arc<RecordingEndpoint>,
    network: Arc<NetworkMonitor>,
) -> OutboxContext {
    OutboxContext::builder(ContextRole::Page, config(dir))
        .client(endpoint)
        .network(network)
        .build()
        .await
        .unwrap()
}

#[tokio::test]
async fn enqueue_offline_then_reconnect_drains_once() {
    let dir = TempDir::new().unwrap();
    let endpoint = Arc::new(RecordingEndpoint::default());
    let network = Arc::new(NetworkMonitor::new(NetworkStatus::Offline));
    let page = page_context(&dir, endpoint.clone(), network.clone()).await;

    page.producer()
        .enqueue(OutboxKind::Note, json!({ "project_id": "p1", "content": "hello" }))
        .await
        .unwrap();

    let auto_sync = page.auto_sync();
    auto_sync.start().await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(endpoint.calls().is_empty());

    network.set_status(NetworkStatus::Online).await;
    tokio::time::timeout(Duration::from_secs(2), async {
        while page.store().count().await.unwrap() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    auto_sync.stop().await;

    let calls = endpoint.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].len(), 1);
    assert_eq!(calls[0][0].kind, OutboxKind::Note);
    assert_eq!(calls[0][0].payload, json!({ "project_id": "p1", "content": "hello" }));
}

#[tokio::test]
async fn offline_sync_makes_no_call() {
    let dir = TempDir::new().unwrap();
    let endpoint = Arc::new(RecordingEndpoint::default());
    let network = Arc::new(NetworkMonitor::new(NetworkStatus::Offline));
    let page = page_context(&dir, endpoint.clone(), network).await;
    page.producer().enqueue(OutboxKind::Note, json!({})).await.unwrap();

    let outcome = page.drainer().sync().await;
    assert_eq!(outcome.processed, 0);
    assert_eq!(outcome.skipped, Some(SkipReason::Offline));
    assert!(endpoint.calls().is_empty());
}

#[tokio::test]
async fn preset_timestamps_define_submission_order() {
    let dir = TempDir::new().unwrap();
    let endpoint = Arc::new(RecordingEndpoint::default());
    let page = page_context(&dir, endpoint.clone(), Arc::new(NetworkMonitor::default())).await;
    let producer = page.producer();

    for (label, ts) in [("t3", 3_000), ("t1", 1_000), ("t2", 2_000)] {
        producer
            .enqueue_item(OutboxItem::new(OutboxKind::Note, json!({ "content": label }), ts))
            .await
            .unwrap();
    }

    page.drainer().sync().await;
    let submitted: Vec<String> = endpoint.calls()[0]
        .iter()
        .map(|i| i.payload["content"].as_str().unwrap_or_default().to_string())
        .collect();
    assert_eq!(submitted, vec!["t1", "t2", "t3"]);
}

#[tokio::test]
async fn legacy_response_removes_every_submitted_item() {
    let dir = TempDir::new().unwrap();
    let endpoint = Arc::new(RecordingEndpoint::default());
    *endpoint.legacy_next.lock() = true;
    let page = page_context(&dir, endpoint.clone(), Arc::new(NetworkMonitor::default())).await;

    for i in 0..3 {
        page.producer().enqueue(OutboxKind::Note, json!({ "i": i })).await.unwrap();
    }
    let outcome = page.drainer().sync().await;
    assert_eq!(outcome.processed, 3);
    assert_eq!(page.store().count().await.unwrap(), 0);
}

#[tokio::test]
async fn double_delete_matches_single_delete() {
    let dir = TempDir::new().unwrap();
    let page = page_context(
        &dir,
        Arc::new(RecordingEndpoint::default()),
        Arc::new(NetworkMonitor::default()),
    )
    .await;
    let store = page.store();
    let keep = page.producer().enqueue(OutboxKind::Note, json!({ "k": 1 })).await.unwrap();
    let gone = page.producer().enqueue(OutboxKind::Note, json!({ "k": 2 })).await.unwrap();

    store.delete_many(&[gone]).await.unwrap();
    store.delete_many(&[gone]).await.unwrap();

    let remaining = store.get_all().await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, Some(keep));
}

#[tokio::test]
async fn worker_drains_items_queued_by_page() {
    let dir = TempDir::new().unwrap();
    let channel = ContextChannel::new(8);
    let (platform, wake_events) = ChannelBackgroundSync::new(4);
    let endpoint = Arc::new(RecordingEndpoint::default());

    let page = OutboxContext::builder(ContextRole::Page, config(&dir))
        .client(endpoint.clone())
        .network(Arc::new(NetworkMonitor::new(NetworkStatus::Offline)))
        .channel(channel.clone())
        .background_sync(Arc::new(platform))
        .build()
        .await
        .unwrap();
    let worker_ctx = OutboxContext::builder(ContextRole::Worker, config(&dir))
        .client(endpoint.clone())
        .channel(channel.clone())
        .build()
        .await
        .unwrap();

    let mut page_messages = channel.subscribe(ContextRole::Page);
    let worker = Arc::new(worker_ctx.worker());
    let handle = worker.clone().spawn(wake_events);

    // 入队会登记一次唤醒，worker 从同名库中读到并同步
    page.producer()
        .enqueue(OutboxKind::Snag, json!({ "project_id": "p1", "title": "gate" }))
        .await
        .unwrap();

    let message = tokio::time::timeout(Duration::from_secs(2), page_messages.recv())
        .await
        .unwrap();
    assert_eq!(message, Some(ContextMessage::OutboxUpdated));
    assert_eq!(page.store().count().await.unwrap(), 0);
    assert_eq!(endpoint.calls().len(), 1);

    worker.stop();
    handle.await.unwrap();
}

#[tokio::test]
async fn invalid_config_is_rejected_on_build() {
    let dir = TempDir::new().unwrap();
    let config = OutboxConfig::builder()
        .data_dir(dir.path())
        .store_name("")
        .build();
    let err = OutboxContext::builder(ContextRole::Page, config).build().await.unwrap_err();
    assert!(matches!(err, OutboxError::Config(_)));
}
