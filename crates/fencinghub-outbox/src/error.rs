use rusqlite::ErrorCode;

/// 发件箱错误
#[derive(Debug, thiserror::Error)]
pub enum OutboxError {
    #[error("Database error: {0}")]
    Database(String),
    /// 本地存储空间不足（SQLite 返回 SQLITE_FULL）
    #[error("Storage full: {0}")]
    StorageFull(String),
    #[error("Migration error: {0}")]
    Migration(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("IO error: {0}")]
    Io(String),
    /// 网络层失败（DNS、超时、连接中断）
    #[error("Transport error: {0}")]
    Transport(String),
    /// 端点返回非 2xx 状态
    #[error("Server error: HTTP {status} ({body})")]
    Server { status: u16, body: String },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("Config error: {0}")]
    Config(String),
}

impl OutboxError {
    /// 是否属于可静默重试的同步失败（队列保持不变，等待下一次触发）
    pub fn is_transient(&self) -> bool {
        matches!(self, OutboxError::Transport(_) | OutboxError::Server { .. })
    }
}

impl From<rusqlite::Error> for OutboxError {
    fn from(error: rusqlite::Error) -> Self {
        match error.sqlite_error_code() {
            Some(ErrorCode::DiskFull) => OutboxError::StorageFull(error.to_string()),
            _ => OutboxError::Database(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for OutboxError {
    fn from(error: serde_json::Error) -> Self {
        OutboxError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for OutboxError {
    fn from(error: std::io::Error) -> Self {
        OutboxError::Io(error.to_string())
    }
}

impl From<reqwest::Error> for OutboxError {
    fn from(error: reqwest::Error) -> Self {
        OutboxError::Transport(error.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OutboxError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_disk_full_maps_to_storage_full() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_FULL),
            Some("database or disk is full".to_string()),
        );
        assert!(matches!(OutboxError::from(err), OutboxError::StorageFull(_)));
    }

    #[test]
    fn test_transient_classification() {
        assert!(OutboxError::Transport("dns".into()).is_transient());
        assert!(OutboxError::Server { status: 502, body: String::new() }.is_transient());
        assert!(!OutboxError::InvalidData("x".into()).is_transient());
    }
}
