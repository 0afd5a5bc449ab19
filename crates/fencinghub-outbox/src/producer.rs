//! 发件箱生产者 - 应用层的入队入口
//!
//! 入队成功后依次：写入持久化队列、发布变更通知、尽力登记后台同步唤醒。
//! 写入失败（包括存储空间不足）直接返回给调用方，由调用方提示用户。

use std::path::Path;
use std::sync::Arc;

use bytes::Bytes;
use serde_json::Value;
use tracing::{debug, warn};
use uuid::Uuid;

use fencinghub_protocol::{OutboxItem, OutboxKind, PhotoAttachment, PHOTOS_FIELD};

use crate::background_sync::BackgroundSyncRegistrar;
use crate::error::{OutboxError, Result};
use crate::events::{ChangeReason, OutboxEvents};
use crate::http_client::detect_mime_type;
use crate::storage::OutboxStore;
use crate::utils::time::MonotonicClock;

/// 入队时随条目提交的二进制附件
///
/// 内容在构造时就已读入内存；入队时编码成 data URL 写进 payload。
#[derive(Debug, Clone, PartialEq)]
pub struct Attachment {
    pub name: Option<String>,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl Attachment {
    pub fn from_bytes(name: Option<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name,
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// 立即读取文件内容（之后文件被移动或删除不影响已入队的条目）
    pub async fn from_path(path: &Path) -> Result<Self> {
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| OutboxError::Io(format!("读取附件 {} 失败: {}", path.display(), e)))?;
        let name = path.file_name().and_then(|n| n.to_str()).map(str::to_string);
        Ok(Self {
            name,
            mime_type: detect_mime_type(path),
            bytes: Bytes::from(bytes),
        })
    }

    fn to_photo(&self) -> PhotoAttachment {
        PhotoAttachment::from_bytes(self.name.clone(), &self.mime_type, &self.bytes)
    }
}

#[derive(Debug)]
pub struct OutboxProducer {
    store: Arc<dyn OutboxStore>,
    events: Arc<OutboxEvents>,
    registrar: BackgroundSyncRegistrar,
    clock: MonotonicClock,
}

impl OutboxProducer {
    pub fn new(store: Arc<dyn OutboxStore>, events: Arc<OutboxEvents>, registrar: BackgroundSyncRegistrar) -> Self {
        Self {
            store,
            events,
            registrar,
            clock: MonotonicClock::new(),
        }
    }

    /// 入队一条变更，返回本地 ID
    pub async fn enqueue(&self, kind: OutboxKind, payload: Value) -> Result<i64> {
        let item = OutboxItem::new(kind, payload, self.clock.now());
        self.enqueue_item(item).await
    }

    /// 入队并附带照片，照片以 `[{name, dataUrl}]` 追加到 payload 的 `photos` 字段
    pub async fn enqueue_with_photos(
        &self,
        kind: OutboxKind,
        mut payload: Value,
        attachments: &[Attachment],
    ) -> Result<i64> {
        if !attachments.is_empty() {
            attach_photos(kind, &mut payload, attachments)?;
        }
        self.enqueue(kind, payload).await
    }

    /// 入队一条已构造好的条目；保留其 `created_at`，缺少幂等键时补一个
    pub async fn enqueue_item(&self, mut item: OutboxItem) -> Result<i64> {
        item.id = None;
        if item.idempotency_key.is_none() {
            item.idempotency_key = Some(Uuid::new_v4().to_string());
        }
        let kind = item.kind;

        let id = match self.store.add(item).await {
            Ok(id) => id,
            Err(e) => {
                warn!("离线保存失败 (type={}): {}", kind, e);
                return Err(e);
            }
        };
        debug!("已入队: id={}, type={}", id, kind);

        self.events.publish(ChangeReason::Enqueued { id });
        self.registrar.register_wakeup().await;
        Ok(id)
    }
}

fn attach_photos(kind: OutboxKind, payload: &mut Value, attachments: &[Attachment]) -> Result<()> {
    if !kind.accepts_photos() {
        return Err(OutboxError::InvalidData(format!("{} 类型不支持附带照片", kind)));
    }
    let Value::Object(map) = payload else {
        return Err(OutboxError::InvalidData("带照片的 payload 必须是 JSON 对象".to_string()));
    };

    let mut photos = match map.remove(PHOTOS_FIELD) {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(existing)) => existing,
        Some(_) => {
            return Err(OutboxError::InvalidData(format!("payload.{} 必须是数组", PHOTOS_FIELD)));
        }
    };
    for attachment in attachments {
        photos.push(serde_json::to_value(attachment.to_photo())?);
    }
    map.insert(PHOTOS_FIELD.to_string(), Value::Array(photos));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryOutboxStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn producer() -> (OutboxProducer, Arc<MemoryOutboxStore>, Arc<OutboxEvents>) {
        let store = Arc::new(MemoryOutboxStore::new());
        let events = Arc::new(OutboxEvents::new(8));
        let producer = OutboxProducer::new(
            store.clone(),
            events.clone(),
            BackgroundSyncRegistrar::unsupported("fencinghub-sync"),
        );
        (producer, store, events)
    }

    #[tokio::test]
    async fn test_enqueue_persists_and_notifies() {
        let (producer, store, events) = producer();
        let notified = Arc::new(AtomicUsize::new(0));
        let counter = notified.clone();
        let _sub = events.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        producer
            .enqueue(OutboxKind::Note, json!({ "project_id": "p1", "content": "hello" }))
            .await
            .unwrap();

        let items = store.get_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].kind, OutboxKind::Note);
        assert!(items[0].idempotency_key.is_some());
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_created_at_is_non_decreasing() {
        let (producer, store, _) = producer();
        for i in 0..5 {
            producer.enqueue(OutboxKind::Note, json!({ "i": i })).await.unwrap();
        }
        let items = store.get_all().await.unwrap();
        assert!(items.windows(2).all(|w| w[0].created_at <= w[1].created_at));
    }

    #[tokio::test]
    async fn test_photos_are_embedded_as_data_urls() {
        let (producer, store, _) = producer();
        let bytes: Vec<u8> = (0u8..=255).collect();
        let attachment = Attachment::from_bytes(Some("site.png".into()), "image/png", bytes.clone());

        producer
            .enqueue_with_photos(OutboxKind::Snag, json!({ "project_id": "p1", "title": "gap" }), &[attachment])
            .await
            .unwrap();

        let items = store.get_all().await.unwrap();
        let photos = items[0].photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].name.as_deref(), Some("site.png"));
        let decoded = photos[0].decode().unwrap();
        assert_eq!(decoded.mime_type, "image/png");
        assert_eq!(decoded.bytes, bytes);
    }

    #[tokio::test]
    async fn test_photos_rejected_for_kind_without_attachments() {
        let (producer, store, _) = producer();
        let attachment = Attachment::from_bytes(None, "image/png", vec![1u8, 2, 3]);
        let err = producer
            .enqueue_with_photos(OutboxKind::Note, json!({}), &[attachment])
            .await
            .unwrap_err();
        assert!(matches!(err, OutboxError::InvalidData(_)));
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_attachment_read_at_enqueue_time() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("photo.jpg");
        tokio::fs::write(&path, b"jpeg-bytes").await.unwrap();

        let attachment = Attachment::from_path(&path).await.unwrap();
        tokio::fs::remove_file(&path).await.unwrap();

        assert_eq!(attachment.name.as_deref(), Some("photo.jpg"));
        assert_eq!(attachment.mime_type, "image/jpeg");
        assert_eq!(&attachment.bytes[..], b"jpeg-bytes");
    }

    #[tokio::test]
    async fn test_enqueue_item_keeps_preset_timestamp_and_key() {
        let (producer, store, _) = producer();
        let item = OutboxItem::new(OutboxKind::Measurement, json!({ "data": "{}" }), 42).with_idempotency_key("k");
        producer.enqueue_item(item).await.unwrap();

        let items = store.get_all().await.unwrap();
        assert_eq!(items[0].created_at, 42);
        assert_eq!(items[0].idempotency_key.as_deref(), Some("k"));
    }
}
