//! 发件箱配置

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use fencinghub_protocol::{DEFAULT_SYNC_INTERVAL_SECS, OUTBOX_STORE_NAME, SYNC_BATCH_PATH, SYNC_TAG};

use crate::error::{OutboxError, Result};
use crate::storage::SqliteOutboxStore;

/// 变更通知广播缓冲大小
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// HTTP 客户端配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpClientConfig {
    /// 连接超时（秒）
    pub connect_timeout_secs: Option<u64>,
    /// 请求超时（秒）；None 使用平台默认
    pub request_timeout_secs: Option<u64>,
    /// 会话 cookie，原样放入 `Cookie` 头
    pub session_cookie: Option<String>,
    /// Bearer token，放入 `Authorization` 头
    pub bearer_token: Option<String>,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            connect_timeout_secs: Some(10),
            request_timeout_secs: Some(120), // 批量里可能带照片
            session_cookie: None,
            bearer_token: None,
        }
    }
}

/// 被端点明确拒绝的条目如何重试
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetryConfig {
    /// 累计被拒次数上限，达到后移入死信表。None 表示永远保留在队列里
    pub max_attempts: Option<u32>,
}

/// 发件箱配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboxConfig {
    /// 数据存储目录
    pub data_dir: PathBuf,
    /// 存储名称，页面和 worker 用同一名称打开同一个库
    pub store_name: String,
    /// 批量同步端点所在服务的基础 URL
    pub server_url: String,
    pub batch_path: String,
    pub http: HttpClientConfig,
    /// 页面打开期间的周期同步间隔（秒）
    pub sync_interval_secs: u64,
    pub event_buffer_size: usize,
    /// 后台同步注册 tag
    pub sync_tag: String,
    pub retry: RetryConfig,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            store_name: OUTBOX_STORE_NAME.to_string(),
            server_url: "http://127.0.0.1:3000".to_string(),
            batch_path: SYNC_BATCH_PATH.to_string(),
            http: HttpClientConfig::default(),
            sync_interval_secs: DEFAULT_SYNC_INTERVAL_SECS,
            event_buffer_size: DEFAULT_EVENT_BUFFER_SIZE,
            sync_tag: SYNC_TAG.to_string(),
            retry: RetryConfig::default(),
        }
    }
}

impl OutboxConfig {
    pub fn builder() -> OutboxConfigBuilder {
        OutboxConfigBuilder::new()
    }

    /// 数据库文件路径：`<data_dir>/<store_name>.db`
    pub fn store_path(&self) -> PathBuf {
        SqliteOutboxStore::file_path(&self.data_dir, &self.store_name)
    }

    /// 批量同步端点完整 URL
    pub fn batch_url(&self) -> String {
        format!(
            "{}/{}",
            self.server_url.trim_end_matches('/'),
            self.batch_path.trim_start_matches('/')
        )
    }

    pub fn validate(&self) -> Result<()> {
        if self.store_name.trim().is_empty() {
            return Err(OutboxError::Config("store_name 不能为空".to_string()));
        }
        if !(self.server_url.starts_with("http://") || self.server_url.starts_with("https://")) {
            return Err(OutboxError::Config(format!(
                "server_url 必须是 http(s) 地址: {}",
                self.server_url
            )));
        }
        if self.sync_interval_secs == 0 {
            return Err(OutboxError::Config("sync_interval_secs 必须大于 0".to_string()));
        }
        if self.retry.max_attempts == Some(0) {
            return Err(OutboxError::Config("retry.max_attempts 不能为 0".to_string()));
        }
        Ok(())
    }
}

pub struct OutboxConfigBuilder {
    config: OutboxConfig,
}

impl OutboxConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: OutboxConfig::default(),
        }
    }

    pub fn data_dir<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.config.data_dir = path.as_ref().to_path_buf();
        self
    }

    pub fn store_name<S: Into<String>>(mut self, name: S) -> Self {
        self.config.store_name = name.into();
        self
    }

    pub fn server_url<S: Into<String>>(mut self, url: S) -> Self {
        self.config.server_url = url.into();
        self
    }

    pub fn batch_path<S: Into<String>>(mut self, path: S) -> Self {
        self.config.batch_path = path.into();
        self
    }

    /// 设置 HTTP 客户端配置
    pub fn http_client_config(mut self, config: HttpClientConfig) -> Self {
        self.config.http = config;
        self
    }

    pub fn session_cookie<S: Into<String>>(mut self, cookie: S) -> Self {
        self.config.http.session_cookie = Some(cookie.into());
        self
    }

    pub fn sync_interval_secs(mut self, secs: u64) -> Self {
        self.config.sync_interval_secs = secs;
        self
    }

    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.config.event_buffer_size = size;
        self
    }

    pub fn sync_tag<S: Into<String>>(mut self, tag: S) -> Self {
        self.config.sync_tag = tag.into();
        self
    }

    /// 设置被拒条目的重试上限（None = 永远重试）
    pub fn max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.config.retry.max_attempts = max_attempts;
        self
    }

    pub fn build(self) -> OutboxConfig {
        self.config
    }
}

impl Default for OutboxConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
