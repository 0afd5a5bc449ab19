//! customer_* 条目转发
//!
//! 客户侧的创建逻辑依赖身份（权限、通知），批量端点不重复实现，而是带上调用方的
//! cookie 转发到对应的单条目端点，用返回的 ID 作为照片的父记录。

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{CONTENT_TYPE, COOKIE};
use serde_json::Value;
use tracing::{debug, warn};

use crate::error::{IngestError, Result};
use crate::mutation::{CustomerProjectPayload, CustomerSnagPayload, RecordId};

pub const CUSTOMER_PROJECTS_PATH: &str = "/api/customer/projects";
pub const CUSTOMER_SNAGS_PATH: &str = "/api/customer/snags";

#[async_trait]
pub trait CustomerApi: Debug + Send + Sync {
    /// 返回新项目的 `projectId`
    async fn create_project(&self, project: &CustomerProjectPayload, cookie: Option<&str>) -> Result<RecordId>;

    /// 返回新 snag 的 `snagId`
    async fn create_snag(&self, snag: &CustomerSnagPayload, cookie: Option<&str>) -> Result<RecordId>;
}

#[derive(Debug, Clone)]
pub struct HttpCustomerApi {
    client: reqwest::Client,
    app_url: String,
}

impl HttpCustomerApi {
    pub fn new(app_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self {
            client,
            app_url: app_url.into().trim_end_matches('/').to_string(),
        })
    }

    async fn post(&self, path: &str, body: Value, cookie: Option<&str>, id_field: &str) -> Result<RecordId> {
        let url = format!("{}{}", self.app_url, path);
        let mut request = self.client.post(&url).header(CONTENT_TYPE, "application/json").json(&body);
        if let Some(cookie) = cookie {
            request = request.header(COOKIE, cookie);
        }

        let response = request.send().await?;
        let status = response.status();
        let bytes = response.bytes().await?;
        let data: Value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);

        if !status.is_success() {
            let message = data
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("Create failed")
                .to_string();
            warn!("转发 {} 失败: HTTP {} {}", path, status.as_u16(), message);
            return Err(IngestError::Forward(message));
        }

        let id = extract_id(&data, id_field)
            .ok_or_else(|| IngestError::Forward(format!("response from {} has no {}", path, id_field)))?;
        debug!("转发 {} 成功: {}={}", path, id_field, id);
        Ok(id)
    }
}

fn extract_id(data: &Value, field: &str) -> Option<RecordId> {
    match data.get(field)? {
        Value::String(s) if !s.is_empty() => Some(RecordId(s.clone())),
        Value::Number(n) => Some(RecordId(n.to_string())),
        _ => None,
    }
}

#[async_trait]
impl CustomerApi for HttpCustomerApi {
    async fn create_project(&self, project: &CustomerProjectPayload, cookie: Option<&str>) -> Result<RecordId> {
        let body = serde_json::to_value(project)?;
        self.post(CUSTOMER_PROJECTS_PATH, body, cookie, "projectId").await
    }

    async fn create_snag(&self, snag: &CustomerSnagPayload, cookie: Option<&str>) -> Result<RecordId> {
        let body = serde_json::to_value(snag)?;
        self.post(CUSTOMER_SNAGS_PATH, body, cookie, "snagId").await
    }
}
