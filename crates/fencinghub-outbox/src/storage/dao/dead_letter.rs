//! 死信表数据访问层 - 超过重试上限的条目

use rusqlite::{params, Connection};
use tracing::warn;

use fencinghub_protocol::OutboxItem;

use crate::error::Result;
use crate::storage::dao::outbox::{read_raw_row, RawOutboxRow};

/// 死信条目
#[derive(Debug, Clone, PartialEq)]
pub struct DeadLetter {
    pub item: OutboxItem,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// 进入死信表的时间（毫秒）
    pub dead_at: i64,
}

pub struct DeadLetterDao<'a> {
    conn: &'a Connection,
}

impl<'a> DeadLetterDao<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// 把 outbox 中的条目原样移入死信表（调用方负责事务）
    pub fn move_from_outbox(&self, id: i64, dead_at: i64) -> Result<bool> {
        let moved = self.conn.execute(
            "INSERT OR REPLACE INTO outbox_dead_letter
                 (id, kind, payload, created_at, idempotency_key, attempts, last_error, dead_at)
             SELECT id, kind, payload, created_at, idempotency_key, attempts, last_error, ?2
             FROM outbox WHERE id = ?1",
            params![id, dead_at],
        )?;
        if moved == 0 {
            return Ok(false);
        }
        self.conn.execute("DELETE FROM outbox WHERE id = ?1", [id])?;
        Ok(true)
    }

    pub fn list(&self) -> Result<Vec<DeadLetter>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, kind, payload, created_at, idempotency_key, attempts, last_error, dead_at
             FROM outbox_dead_letter ORDER BY created_at ASC, id ASC",
        )?;
        let rows = stmt.query_map([], |row| {
            let raw = read_raw_row(row)?;
            let attempts: i64 = row.get(5)?;
            let last_error: Option<String> = row.get(6)?;
            let dead_at: i64 = row.get(7)?;
            Ok((raw, attempts, last_error, dead_at))
        })?;

        let mut letters = Vec::new();
        for row in rows {
            let (raw, attempts, last_error, dead_at) = row?;
            let id = raw.id;
            let item = match raw.into_item() {
                Ok(item) => item,
                Err(e) => {
                    warn!("跳过无法解析的死信条目 {}: {}", id, e);
                    continue;
                }
            };
            letters.push(DeadLetter {
                item,
                attempts: attempts as u32,
                last_error,
                dead_at,
            });
        }
        Ok(letters)
    }

    /// 取出死信条目（从死信表删除），由调用方重新入队
    pub fn take(&self, id: i64) -> Result<Option<RawOutboxRow>> {
        let raw = {
            let mut stmt = self.conn.prepare(
                "SELECT id, kind, payload, created_at, idempotency_key
                 FROM outbox_dead_letter WHERE id = ?1",
            )?;
            let mut rows = stmt.query([id])?;
            match rows.next()? {
                Some(row) => read_raw_row(row)?,
                None => return Ok(None),
            }
        };
        self.conn.execute("DELETE FROM outbox_dead_letter WHERE id = ?1", [id])?;
        Ok(Some(raw))
    }
}
