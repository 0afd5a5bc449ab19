//! HTTP 客户端模块 - 批量同步请求
//!
//! 使用 reqwest 把整批待处理条目一次性 `POST` 到批量同步端点。
//! 只负责传输与响应解析；确认哪些条目可以删除由同步引擎决定。

use std::fmt::Debug;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::Client;
use tracing::{debug, info, warn};

use fencinghub_protocol::{BatchSyncRequest, BatchSyncResponse, OutboxItem};

use crate::config::OutboxConfig;
use crate::error::{OutboxError, Result};

/// 批量同步端点的调用方
#[async_trait]
pub trait BatchSyncClient: Send + Sync + Debug {
    /// 提交一批条目。传输失败或非 2xx 返回错误，此时调用方不得假设任何条目已处理
    async fn submit_batch(&self, items: &[OutboxItem]) -> Result<BatchSyncResponse>;
}

/// 基于 reqwest 的批量同步客户端
#[derive(Debug, Clone)]
pub struct HttpBatchClient {
    client: Client,
    batch_url: String,
}

impl HttpBatchClient {
    pub fn new(config: &OutboxConfig) -> Result<Self> {
        let mut builder = Client::builder();

        if let Some(timeout) = config.http.connect_timeout_secs {
            builder = builder.connect_timeout(Duration::from_secs(timeout));
        }

        if let Some(timeout) = config.http.request_timeout_secs {
            builder = builder.timeout(Duration::from_secs(timeout));
        }

        let mut headers = HeaderMap::new();
        if let Some(cookie) = &config.http.session_cookie {
            let value = HeaderValue::from_str(cookie)
                .map_err(|e| OutboxError::Config(format!("session_cookie 无效: {}", e)))?;
            headers.insert(COOKIE, value);
        }
        if let Some(token) = &config.http.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| OutboxError::Config(format!("bearer_token 无效: {}", e)))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let client = builder
            .default_headers(headers)
            .build()
            .map_err(|e| OutboxError::Config(format!("创建 HTTP 客户端失败: {}", e)))?;

        let batch_url = config.batch_url();
        info!("批量同步客户端已创建 (url: {})", batch_url);

        Ok(Self { client, batch_url })
    }

    pub fn batch_url(&self) -> &str {
        &self.batch_url
    }
}

#[async_trait]
impl BatchSyncClient for HttpBatchClient {
    async fn submit_batch(&self, items: &[OutboxItem]) -> Result<BatchSyncResponse> {
        let request = BatchSyncRequest { items: items.to_vec() };
        debug!("提交批量同步: {} 条 -> {}", items.len(), self.batch_url);

        let response = self.client.post(&self.batch_url).json(&request).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(OutboxError::Server {
                status: status.as_u16(),
                body,
            });
        }

        let body = response.bytes().await?;
        Ok(parse_batch_response(&body))
    }
}

/// 解析 2xx 响应体；无法解析时按兼容路径处理（视为未上报逐条结果）
pub fn parse_batch_response(body: &[u8]) -> BatchSyncResponse {
    match serde_json::from_slice::<BatchSyncResponse>(body) {
        Ok(parsed) => parsed,
        Err(e) => {
            warn!("批量同步响应无法解析，按未上报逐条结果处理: {}", e);
            BatchSyncResponse {
                ok: true,
                processed_ids: None,
                failed: Vec::new(),
            }
        }
    }
}

/// 根据扩展名推断 MIME 类型
pub fn detect_mime_type(path: &Path) -> String {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "heic" => "image/heic",
            "pdf" => "application/pdf",
            "txt" => "text/plain",
            _ => "application/octet-stream",
        }
    } else {
        "application/octet-stream"
    }
    .to_string()
}
