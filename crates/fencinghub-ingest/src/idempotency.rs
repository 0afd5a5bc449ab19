//! 幂等账本
//!
//! 以 `(user_id, idempotency_key)` 为键记录一次条目应用的进度：
//! 父记录 ID、已关联的照片数、是否全部完成。重试时据此跳过已完成的步骤。

use std::fmt::Debug;

use async_trait::async_trait;
use rusqlite::{params, OptionalExtension};

use fencinghub_protocol::OutboxKind;

use crate::backend::SqliteBackend;
use crate::error::Result;
use crate::mutation::RecordId;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LedgerEntry {
    pub parent_id: Option<RecordId>,
    /// 已上传并关联的照片数（按 payload 中的顺序）
    pub attached: usize,
    pub completed: bool,
}

#[async_trait]
pub trait IdempotencyLedger: Debug + Send + Sync {
    async fn lookup(&self, user_id: &str, key: &str) -> Result<Option<LedgerEntry>>;

    async fn record_parent(&self, user_id: &str, key: &str, kind: OutboxKind, parent_id: &RecordId) -> Result<()>;

    async fn record_attached(&self, user_id: &str, key: &str, kind: OutboxKind, attached: usize) -> Result<()>;

    async fn mark_completed(&self, user_id: &str, key: &str, kind: OutboxKind) -> Result<()>;
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[async_trait]
impl IdempotencyLedger for SqliteBackend {
    async fn lookup(&self, user_id: &str, key: &str) -> Result<Option<LedgerEntry>> {
        let conn = self.connection().lock().await;
        let entry = conn
            .query_row(
                "SELECT parent_id, attached, completed FROM sync_idempotency
                 WHERE user_id = ?1 AND idempotency_key = ?2",
                params![user_id, key],
                |row| {
                    Ok(LedgerEntry {
                        parent_id: row.get::<_, Option<String>>(0)?.map(RecordId),
                        attached: row.get::<_, i64>(1)?.max(0) as usize,
                        completed: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(entry)
    }

    async fn record_parent(&self, user_id: &str, key: &str, kind: OutboxKind, parent_id: &RecordId) -> Result<()> {
        let conn = self.connection().lock().await;
        conn.execute(
            "INSERT INTO sync_idempotency (user_id, idempotency_key, kind, parent_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_id, idempotency_key) DO UPDATE SET parent_id = excluded.parent_id, updated_at = excluded.updated_at",
            params![user_id, key, kind.as_str(), parent_id.as_str(), now_millis()],
        )?;
        Ok(())
    }

    async fn record_attached(&self, user_id: &str, key: &str, kind: OutboxKind, attached: usize) -> Result<()> {
        let conn = self.connection().lock().await;
        conn.execute(
            "INSERT INTO sync_idempotency (user_id, idempotency_key, kind, attached, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)
             ON CONFLICT(user_id, idempotency_key) DO UPDATE SET attached = excluded.attached, updated_at = excluded.updated_at",
            params![user_id, key, kind.as_str(), attached as i64, now_millis()],
        )?;
        Ok(())
    }

    async fn mark_completed(&self, user_id: &str, key: &str, kind: OutboxKind) -> Result<()> {
        let conn = self.connection().lock().await;
        conn.execute(
            "INSERT INTO sync_idempotency (user_id, idempotency_key, kind, completed, created_at, updated_at)
             VALUES (?1, ?2, ?3, 1, ?4, ?4)
             ON CONFLICT(user_id, idempotency_key) DO UPDATE SET completed = 1, updated_at = excluded.updated_at",
            params![user_id, key, kind.as_str(), now_millis()],
        )?;
        Ok(())
    }
}
