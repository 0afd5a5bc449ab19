//! FencingHub Ingest - 离线发件箱的批量同步端点
//!
//! 接收客户端整批回放的条目，逐条分发到业务变更：
//! - `note` / `measurement` / `snag` / `snag_status` / `quote_request` 写入本地业务库
//! - `customer_project` / `customer_snag` 转发到需要身份的单条目端点
//! - 照片从 data URL 解码后上传到对应 bucket，并写入关联行
//! - 携带幂等键的条目重试时不会重复创建父记录

pub mod backend;
pub mod config;
pub mod db;
pub mod error;
pub mod forward;
pub mod idempotency;
pub mod ingest;
pub mod mutation;
pub mod routes;
pub mod storage;

use std::sync::Arc;

pub use backend::{BackendTable, DomainBackend, PhotoLink, SqliteBackend};
pub use config::ServerConfig;
pub use error::{IngestError, Result};
pub use forward::{CustomerApi, HttpCustomerApi};
pub use idempotency::{IdempotencyLedger, LedgerEntry};
pub use ingest::{BatchProcessor, Identity};
pub use mutation::{OutboxMutation, RecordId};
pub use routes::{create_router, AppState, USER_ID_HEADER};
pub use storage::{FsObjectStorage, ObjectMeta, ObjectStorage};

/// 按配置装配默认实现：SQLite 业务库 + 文件系统对象存储 + HTTP 转发
pub fn build_processor(config: &ServerConfig) -> Result<BatchProcessor> {
    let backend = Arc::new(SqliteBackend::open(&config.database)?);
    std::fs::create_dir_all(&config.storage_dir)?;
    let storage = Arc::new(FsObjectStorage::new(&config.storage_dir));
    let customer_api = Arc::new(HttpCustomerApi::new(config.app_url.clone())?);
    Ok(BatchProcessor::new(backend.clone(), backend, storage, customer_api))
}
