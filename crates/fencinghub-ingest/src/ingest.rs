//! 批量处理
//!
//! 按请求顺序逐条应用。单条失败只记录到 `failed`，不影响后续条目；
//! 只有父记录、全部照片上传与关联都成功的条目才计入 `processedIds`。

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info, instrument, warn};

use fencinghub_protocol::{BatchSyncResponse, FailedItem, OutboxItem, OutboxKind, PhotoAttachment};

use crate::backend::{DomainBackend, PhotoLink};
use crate::error::{IngestError, Result};
use crate::forward::CustomerApi;
use crate::idempotency::{IdempotencyLedger, LedgerEntry};
use crate::mutation::{OutboxMutation, RecordId};
use crate::storage::{ObjectStorage, BUCKET_CUSTOMER_UPLOADS, BUCKET_QUOTE_REQUESTS, BUCKET_SNAGS};

/// 调用方身份：上游鉴权层写入的用户 ID 与原样转发的 cookie
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub cookie: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            cookie: None,
        }
    }

    pub fn with_cookie(mut self, cookie: impl Into<String>) -> Self {
        self.cookie = Some(cookie.into());
        self
    }
}

/// 照片的去向：bucket、路径前缀、默认文件名前缀与关联方式
#[derive(Debug, Clone)]
enum PhotoTarget {
    Snag { snag_id: RecordId, project_id: RecordId },
    QuoteRequest { quote_request_id: RecordId, folder: String },
    CustomerProject { project_id: RecordId },
}

impl PhotoTarget {
    fn bucket(&self) -> &'static str {
        match self {
            PhotoTarget::Snag { .. } => BUCKET_SNAGS,
            PhotoTarget::QuoteRequest { .. } => BUCKET_QUOTE_REQUESTS,
            PhotoTarget::CustomerProject { .. } => BUCKET_CUSTOMER_UPLOADS,
        }
    }

    fn default_prefix(&self) -> &'static str {
        match self {
            PhotoTarget::Snag { .. } => "snag",
            PhotoTarget::QuoteRequest { .. } => "quote",
            PhotoTarget::CustomerProject { .. } => "customer",
        }
    }

    fn folder<'a>(&'a self, identity: &'a Identity) -> &'a str {
        match self {
            PhotoTarget::Snag { project_id, .. } => project_id.as_str(),
            PhotoTarget::QuoteRequest { folder, .. } => folder,
            PhotoTarget::CustomerProject { .. } => &identity.user_id,
        }
    }

    fn link(&self, file_path: String, identity: &Identity) -> PhotoLink {
        match self {
            PhotoTarget::Snag { snag_id, .. } => PhotoLink::Snag {
                snag_id: snag_id.clone(),
                file_path,
                created_by: identity.user_id.clone(),
            },
            PhotoTarget::QuoteRequest { quote_request_id, .. } => PhotoLink::QuoteRequest {
                quote_request_id: quote_request_id.clone(),
                file_path,
                created_by: identity.user_id.clone(),
            },
            PhotoTarget::CustomerProject { project_id } => PhotoLink::Project {
                project_id: project_id.clone(),
                photo_url: file_path,
            },
        }
    }
}

/// 幂等键对应的进度；没有键的旧条目每次都从头应用
struct Progress<'a> {
    key: Option<&'a str>,
    kind: OutboxKind,
    entry: LedgerEntry,
}

#[derive(Debug, Clone)]
pub struct BatchProcessor {
    backend: Arc<dyn DomainBackend>,
    ledger: Arc<dyn IdempotencyLedger>,
    storage: Arc<dyn ObjectStorage>,
    customer_api: Arc<dyn CustomerApi>,
}

impl BatchProcessor {
    pub fn new(
        backend: Arc<dyn DomainBackend>,
        ledger: Arc<dyn IdempotencyLedger>,
        storage: Arc<dyn ObjectStorage>,
        customer_api: Arc<dyn CustomerApi>,
    ) -> Self {
        Self {
            backend,
            ledger,
            storage,
            customer_api,
        }
    }

    /// 处理一整批原始条目
    ///
    /// 条目按原始 JSON 接收，这样单个未知类型或格式错误只会让该条目失败。
    #[instrument(skip_all, fields(user = %identity.user_id, items = items.len()))]
    pub async fn process(&self, identity: &Identity, items: Vec<Value>) -> BatchSyncResponse {
        let mut processed = Vec::new();
        let mut failed = Vec::new();

        for raw in items {
            let id = raw.get("id").and_then(Value::as_i64).filter(|id| *id > 0);
            let result = match decode_item(raw) {
                Ok(item) => self.apply(identity, &item).await,
                Err(e) => Err(e),
            };
            match result {
                Ok(()) => processed.extend(id),
                Err(e) => {
                    warn!("条目 {:?} 处理失败: {}", id, e);
                    failed.push(FailedItem { id, error: e.to_string() });
                }
            }
        }

        info!("批量同步完成: {} 成功, {} 失败", processed.len(), failed.len());
        BatchSyncResponse::from_outcome(processed, failed)
    }

    async fn apply(&self, identity: &Identity, item: &OutboxItem) -> Result<()> {
        let mutation = OutboxMutation::from_item(item)?;
        let key = item.idempotency_key.as_deref().filter(|k| !k.is_empty());
        let entry = match key {
            Some(key) => self.ledger.lookup(&identity.user_id, key).await?.unwrap_or_default(),
            None => LedgerEntry::default(),
        };
        if entry.completed {
            debug!("幂等键 {:?} 已完成，跳过", key);
            return Ok(());
        }
        let mut progress = Progress { key, kind: item.kind, entry };

        match &mutation {
            OutboxMutation::Note(note) => {
                self.backend.insert_note(&identity.user_id, note).await?;
            }
            OutboxMutation::Measurement(measurement) => {
                self.backend.insert_measurement(&identity.user_id, measurement).await?;
            }
            OutboxMutation::SnagStatus(update) => {
                self.backend.update_snag_status(&update.id, &update.status).await?;
            }
            OutboxMutation::Snag(snag) => {
                let snag_id = match progress.entry.parent_id.clone() {
                    Some(id) => id,
                    None => {
                        let id = self.backend.insert_snag(&identity.user_id, snag).await?;
                        self.remember_parent(identity, &mut progress, &id).await?;
                        id
                    }
                };
                let target = PhotoTarget::Snag { snag_id, project_id: snag.project_id.clone() };
                self.attach_photos(identity, &mut progress, &target, &snag.photos).await?;
            }
            OutboxMutation::QuoteRequest(request) => {
                let quote_request_id = match progress.entry.parent_id.clone() {
                    Some(id) => id,
                    None => {
                        let id = self.backend.insert_quote_request(&identity.user_id, request).await?;
                        self.remember_parent(identity, &mut progress, &id).await?;
                        id
                    }
                };
                let folder = request
                    .project_id
                    .as_ref()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| identity.user_id.clone());
                let target = PhotoTarget::QuoteRequest { quote_request_id, folder };
                self.attach_photos(identity, &mut progress, &target, &request.photos).await?;
            }
            OutboxMutation::CustomerProject(project) => {
                let project_id = match progress.entry.parent_id.clone() {
                    Some(id) => id,
                    None => {
                        let id = self.customer_api.create_project(project, identity.cookie.as_deref()).await?;
                        self.remember_parent(identity, &mut progress, &id).await?;
                        id
                    }
                };
                let target = PhotoTarget::CustomerProject { project_id };
                self.attach_photos(identity, &mut progress, &target, &project.photos).await?;
            }
            OutboxMutation::CustomerSnag(snag) => {
                let snag_id = match progress.entry.parent_id.clone() {
                    Some(id) => id,
                    None => {
                        let id = self.customer_api.create_snag(snag, identity.cookie.as_deref()).await?;
                        self.remember_parent(identity, &mut progress, &id).await?;
                        id
                    }
                };
                let target = PhotoTarget::Snag { snag_id, project_id: snag.project_id.clone() };
                self.attach_photos(identity, &mut progress, &target, &snag.photos).await?;
            }
        }

        if let Some(key) = progress.key {
            self.ledger.mark_completed(&identity.user_id, key, progress.kind).await?;
        }
        Ok(())
    }

    async fn remember_parent(&self, identity: &Identity, progress: &mut Progress<'_>, parent_id: &RecordId) -> Result<()> {
        if let Some(key) = progress.key {
            self.ledger.record_parent(&identity.user_id, key, progress.kind, parent_id).await?;
        }
        progress.entry.parent_id = Some(parent_id.clone());
        Ok(())
    }

    /// 按顺序上传并关联；已关联的照片在重试时跳过
    async fn attach_photos(
        &self,
        identity: &Identity,
        progress: &mut Progress<'_>,
        target: &PhotoTarget,
        photos: &[PhotoAttachment],
    ) -> Result<()> {
        for (index, photo) in photos.iter().enumerate().skip(progress.entry.attached) {
            let decoded = photo.decode()?;
            let ts = chrono::Utc::now().timestamp_millis();
            let filename = match photo.name.as_deref().map(sanitize_filename) {
                Some(name) if !name.is_empty() => name,
                _ => format!("{}-{}-{}", target.default_prefix(), ts, index),
            };
            // 同一条目内可能有重名照片，序号保证路径唯一
            let path = format!("{}/{}-{}-{}", sanitize_segment(target.folder(identity)), ts, index, filename);

            self.storage
                .upload(target.bucket(), &path, &decoded.bytes, &decoded.mime_type)
                .await?;
            self.backend.link_photo(&target.link(path, identity)).await?;

            progress.entry.attached = index + 1;
            if let Some(key) = progress.key {
                self.ledger
                    .record_attached(&identity.user_id, key, progress.kind, progress.entry.attached)
                    .await?;
            }
        }
        Ok(())
    }
}

/// 未知类型单独报错，其余格式问题交给 serde
fn decode_item(raw: Value) -> Result<OutboxItem> {
    if let Some(kind) = raw.get("type").and_then(Value::as_str) {
        if kind.parse::<OutboxKind>().is_err() {
            return Err(IngestError::Validation(format!("Unknown type: {}", kind)));
        }
    }
    Ok(serde_json::from_value(raw)?)
}

/// 只保留文件名本身，去掉路径分隔符
fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base == "." || base == ".." {
        String::new()
    } else {
        base.to_string()
    }
}

fn sanitize_segment(segment: &str) -> String {
    let cleaned: String = segment
        .chars()
        .map(|c| if c == '/' || c == '\\' { '_' } else { c })
        .collect();
    match cleaned.as_str() {
        "" | "." | ".." => "_".to_string(),
        _ => cleaned,
    }
}
