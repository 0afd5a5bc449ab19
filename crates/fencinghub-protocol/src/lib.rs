//! FencingHub 发件箱协议
//!
//! 客户端（页面上下文 / 后台 worker）与批量同步端点之间共享的全部线上类型：
//! - `OutboxItem` / `OutboxKind`：待提交的变更条目
//! - `BatchSyncRequest` / `BatchSyncResponse`：`POST /api/sync/batch` 的请求与响应
//! - `PhotoAttachment` 与 data URL 编解码
//! - `ContextMessage`：worker 与页面之间的广播消息

pub mod attachment;
pub mod batch;
pub mod constants;
pub mod item;
pub mod message;

pub use attachment::{decode_data_url, encode_data_url, DataUrlError, DecodedDataUrl, PhotoAttachment};
pub use batch::{BatchSyncRequest, BatchSyncResponse, FailedItem};
pub use constants::*;
pub use item::{OutboxItem, OutboxKind, UnknownOutboxKind};
pub use message::ContextMessage;
