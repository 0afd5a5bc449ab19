//! FencingHub Outbox - 离线发件箱
//!
//! 离线时把变更写入本地持久化队列，恢复连接后整批回放到服务端：
//! - 持久化队列：SQLite，按名称打开，页面与后台 worker 共用同一个库
//! - 生产者：入队、附件编码为 data URL、变更通知、后台同步登记
//! - 同步引擎：整批提交，只删除端点确认的条目
//! - 自动同步：启动、周期、重连、手动、跨上下文消息
//! - 死信：可选的重试上限
//!
//! # 快速开始
//!
//! ```rust,no_run
//! use fencinghub_outbox::{ContextRole, OutboxConfig, OutboxContext, OutboxKind};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = OutboxConfig::builder()
//!         .data_dir("/path/to/data")
//!         .server_url("https://app.example.com")
//!         .build();
//!
//!     let page = OutboxContext::builder(ContextRole::Page, config).build().await?;
//!
//!     // 计数变化时刷新界面
//!     let _subscription = page.events().subscribe(|event| {
//!         println!("outbox changed: {:?}", event.reason);
//!     });
//!
//!     page.producer()
//!         .enqueue(OutboxKind::Note, json!({ "project_id": "p1", "content": "hello" }))
//!         .await?;
//!
//!     let auto_sync = page.auto_sync();
//!     auto_sync.start().await?;
//!     Ok(())
//! }
//! ```

// 导出核心模块
pub mod background_sync;
pub mod channel;
pub mod config;
pub mod context;
pub mod error;
pub mod events;
pub mod http_client;
pub mod network;
pub mod producer;
pub mod status;
pub mod storage;
pub mod sync;
pub mod utils;
pub mod version;
pub mod worker;

// 重新导出核心类型，方便使用
pub use background_sync::{BackgroundSyncPlatform, BackgroundSyncRegistrar, ChannelBackgroundSync, WakeEvent};
pub use channel::{ContextChannel, ContextReceiver, ContextRole, Envelope};
pub use config::{HttpClientConfig, OutboxConfig, OutboxConfigBuilder, RetryConfig};
pub use context::{OutboxContext, OutboxContextBuilder};
pub use error::{OutboxError, Result};
pub use events::{ChangeReason, OutboxEvent, OutboxEvents, Subscription};
pub use http_client::{BatchSyncClient, HttpBatchClient};
pub use network::{NetworkMonitor, NetworkStatus, NetworkStatusEvent, NetworkStatusListener};
pub use producer::{Attachment, OutboxProducer};
pub use status::OutboxStatus;
pub use storage::{DeadLetter, MemoryOutboxStore, OutboxStore, SqliteOutboxStore};
pub use sync::{AutoSync, OutboxDrainer, RetryPolicy, SkipReason, SyncFailureReason, SyncOutcome};
pub use worker::SyncWorker;

// 重新导出协议层的类型，避免用户需要单独导入 fencinghub-protocol
pub use fencinghub_protocol::*;
