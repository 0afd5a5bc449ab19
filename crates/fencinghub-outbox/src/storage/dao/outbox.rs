//! outbox 表数据访问层

use rusqlite::{params, params_from_iter, Connection, Row};
use tracing::warn;

use fencinghub_protocol::{OutboxItem, OutboxKind};

use crate::error::{OutboxError, Result};

pub struct OutboxDao<'a> {
    conn: &'a Connection,
}

impl<'a> OutboxDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 追加一条记录，返回新分配的 ID
    pub fn insert(&self, item: &OutboxItem) -> Result<i64> {
        let payload = serde_json::to_string(&item.payload)?;
        self.conn.execute(
            "INSERT INTO outbox (kind, payload, created_at, idempotency_key)
             VALUES (?1, ?2, ?3, ?4)",
            params![item.kind.as_str(), payload, item.created_at, item.idempotency_key],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// 按创建时间升序读取全部待处理条目（同一时间戳按插入顺序）
    pub fn list_all(&self) -> Result<Vec<OutboxItem>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, payload, created_at, idempotency_key
             FROM outbox ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], read_raw_row)?;

        let mut items = Vec::new();
        for row in rows {
            let raw = row?;
            let id = raw.id;
            // 无法解析的行留在表里，不阻塞其余条目的同步
            match raw.into_item() {
                Ok(item) => items.push(item),
                Err(e) => warn!("跳过无法解析的发件箱条目 {}: {}", id, e),
            }
        }
        Ok(items)
    }

    pub fn count(&self) -> Result<usize> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM outbox", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    /// 删除给定 ID，不存在的 ID 直接忽略；返回实际删除的条数
    pub fn delete_many(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql = format!("DELETE FROM outbox WHERE id IN ({})", placeholders);
        let removed = self.conn.execute(&sql, params_from_iter(ids.iter()))?;
        Ok(removed)
    }

    /// 记录一次被端点明确拒绝，返回累计次数；条目已不存在时返回 None
    pub fn record_failure(&self, id: i64, error: &str) -> Result<Option<u32>> {
        let updated = self.conn.execute(
            "UPDATE outbox SET attempts = attempts + 1, last_error = ?2 WHERE id = ?1",
            params![id, error],
        )?;
        if updated == 0 {
            return Ok(None);
        }
        let attempts: i64 = self.conn.query_row(
            "SELECT attempts FROM outbox WHERE id = ?1",
            [id],
            |row| row.get(0),
        )?;
        Ok(Some(attempts as u32))
    }
}

/// 数据库行的原始形态，kind/payload 尚未解析
pub(crate) struct RawOutboxRow {
    pub id: i64,
    pub kind: String,
    pub payload: String,
    pub created_at: i64,
    pub idempotency_key: Option<String>,
}

impl RawOutboxRow {
    pub fn into_item(self) -> Result<OutboxItem> {
        let kind: OutboxKind = self
            .kind
            .parse()
            .map_err(|e| OutboxError::InvalidData(format!("条目 {} 类型无效: {}", self.id, e)))?;
        let payload = serde_json::from_str(&self.payload)?;
        Ok(OutboxItem {
            id: Some(self.id),
            kind,
            payload,
            created_at: self.created_at,
            idempotency_key: self.idempotency_key,
        })
    }
}

pub(crate) fn read_raw_row(row: &Row<'_>) -> rusqlite::Result<RawOutboxRow> {
    Ok(RawOutboxRow {
        id: row.get(0)?,
        kind: row.get(1)?,
        payload: row.get(2)?,
        created_at: row.get(3)?,
        idempotency_key: row.get(4)?,
    })
}
