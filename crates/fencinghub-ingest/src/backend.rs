//! 业务数据写入
//!
//! `DomainBackend` 是批量端点唯一依赖的持久化接口；默认实现为 SQLite。

use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::debug;

use crate::db;
use crate::error::Result;
use crate::mutation::{MeasurementPayload, NotePayload, QuoteRequestPayload, RecordId, SnagPayload};

/// 照片与父记录的关联行
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PhotoLink {
    Snag { snag_id: RecordId, file_path: String, created_by: String },
    QuoteRequest { quote_request_id: RecordId, file_path: String, created_by: String },
    Project { project_id: RecordId, photo_url: String },
}

#[async_trait]
pub trait DomainBackend: Debug + Send + Sync {
    async fn insert_note(&self, user_id: &str, note: &NotePayload) -> Result<RecordId>;

    async fn insert_measurement(&self, user_id: &str, measurement: &MeasurementPayload) -> Result<RecordId>;

    /// 缺省 `status = "open"`、`is_internal = false`，`created_by` 总是当前用户
    async fn insert_snag(&self, user_id: &str, snag: &SnagPayload) -> Result<RecordId>;

    /// 返回受影响的行数；snag 不存在时为 0
    async fn update_snag_status(&self, snag_id: &RecordId, status: &str) -> Result<usize>;

    async fn insert_quote_request(&self, user_id: &str, request: &QuoteRequestPayload) -> Result<RecordId>;

    async fn link_photo(&self, link: &PhotoLink) -> Result<()>;
}

/// 本地 SQLite 业务库；幂等账本共用同一连接
#[derive(Debug, Clone)]
pub struct SqliteBackend {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteBackend {
    pub fn open(path: &Path) -> Result<Self> {
        Ok(Self::from_connection(db::open(path)?))
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self::from_connection(db::open_in_memory()?))
    }

    fn from_connection(conn: Connection) -> Self {
        Self {
            conn: Arc::new(Mutex::new(conn)),
        }
    }

    pub(crate) fn connection(&self) -> &Arc<Mutex<Connection>> {
        &self.conn
    }

    pub async fn count_rows(&self, table: BackendTable) -> Result<usize> {
        let conn = self.conn.lock().await;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {}", table.as_str()), [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub async fn snag_status(&self, snag_id: &RecordId) -> Result<Option<String>> {
        let conn = self.conn.lock().await;
        let status = conn
            .query_row("SELECT status FROM snags WHERE id = ?1", [snag_id.as_str()], |row| row.get(0))
            .optional()?;
        Ok(status)
    }

    /// 某个 snag 已关联的照片路径
    pub async fn snag_photo_paths(&self, snag_id: &RecordId) -> Result<Vec<String>> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare("SELECT file_path FROM snag_photos WHERE snag_id = ?1 ORDER BY id")?;
        let rows = stmt.query_map([snag_id.as_str()], |row| row.get(0))?;
        let mut paths = Vec::new();
        for row in rows {
            paths.push(row?);
        }
        Ok(paths)
    }
}

/// 可供查询计数的表
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendTable {
    ProjectNotes,
    Measurements,
    Snags,
    SnagPhotos,
    QuoteRequests,
    QuoteRequestPhotos,
    ProjectPhotos,
}

impl BackendTable {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendTable::ProjectNotes => "project_notes",
            BackendTable::Measurements => "measurements",
            BackendTable::Snags => "snags",
            BackendTable::SnagPhotos => "snag_photos",
            BackendTable::QuoteRequests => "quote_requests",
            BackendTable::QuoteRequestPhotos => "quote_request_photos",
            BackendTable::ProjectPhotos => "project_photos",
        }
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn extra_json(extra: &serde_json::Map<String, Value>) -> Result<String> {
    Ok(serde_json::to_string(extra)?)
}

#[async_trait]
impl DomainBackend for SqliteBackend {
    async fn insert_note(&self, user_id: &str, note: &NotePayload) -> Result<RecordId> {
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO project_notes (project_id, content, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![note.project_id.as_str(), note.content, user_id, now_millis()],
        )?;
        Ok(RecordId(conn.last_insert_rowid().to_string()))
    }

    async fn insert_measurement(&self, user_id: &str, measurement: &MeasurementPayload) -> Result<RecordId> {
        let data = serde_json::to_string(&measurement.data)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO measurements (project_id, data, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![measurement.project_id.as_str(), data, user_id, now_millis()],
        )?;
        Ok(RecordId(conn.last_insert_rowid().to_string()))
    }

    async fn insert_snag(&self, user_id: &str, snag: &SnagPayload) -> Result<RecordId> {
        let extra = extra_json(&snag.extra)?;
        let now = now_millis();
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO snags (project_id, title, description, status, is_internal, extra, created_by, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                snag.project_id.as_str(),
                snag.title,
                snag.description,
                snag.status.as_deref().unwrap_or("open"),
                snag.is_internal.unwrap_or(false),
                extra,
                user_id,
                now,
            ],
        )?;
        Ok(RecordId(conn.last_insert_rowid().to_string()))
    }

    async fn update_snag_status(&self, snag_id: &RecordId, status: &str) -> Result<usize> {
        let conn = self.conn.lock().await;
        let affected = conn.execute(
            "UPDATE snags SET status = ?1, updated_at = ?2 WHERE id = ?3",
            params![status, now_millis(), snag_id.as_str()],
        )?;
        if affected == 0 {
            debug!("snag {} 不存在，状态更新为空操作", snag_id);
        }
        Ok(affected)
    }

    async fn insert_quote_request(&self, user_id: &str, request: &QuoteRequestPayload) -> Result<RecordId> {
        let extra = extra_json(&request.extra)?;
        let conn = self.conn.lock().await;
        conn.execute(
            "INSERT INTO quote_requests (project_id, extra, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
            params![request.project_id.as_ref().map(RecordId::as_str), extra, user_id, now_millis()],
        )?;
        Ok(RecordId(conn.last_insert_rowid().to_string()))
    }

    async fn link_photo(&self, link: &PhotoLink) -> Result<()> {
        let conn = self.conn.lock().await;
        let now = now_millis();
        match link {
            PhotoLink::Snag { snag_id, file_path, created_by } => conn.execute(
                "INSERT INTO snag_photos (snag_id, file_path, created_by, created_at) VALUES (?1, ?2, ?3, ?4)",
                params![snag_id.as_str(), file_path, created_by, now],
            )?,
            PhotoLink::QuoteRequest { quote_request_id, file_path, created_by } => conn.execute(
                "INSERT INTO quote_request_photos (quote_request_id, file_path, created_by, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![quote_request_id.as_str(), file_path, created_by, now],
            )?,
            PhotoLink::Project { project_id, photo_url } => conn.execute(
                "INSERT INTO project_photos (project_id, photo_url, created_at) VALUES (?1, ?2, ?3)",
                params![project_id.as_str(), photo_url, now],
            )?,
        };
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn snag(payload: Value) -> SnagPayload {
        serde_json::from_value(payload).unwrap()
    }

    #[tokio::test]
    async fn test_snag_defaults_and_status_update() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        let id = backend
            .insert_snag("u1", &snag(json!({ "project_id": "p1", "title": "Gate sags" })))
            .await
            .unwrap();
        assert_eq!(backend.snag_status(&id).await.unwrap().as_deref(), Some("open"));

        assert_eq!(backend.update_snag_status(&id, "closed").await.unwrap(), 1);
        assert_eq!(backend.snag_status(&id).await.unwrap().as_deref(), Some("closed"));

        assert_eq!(backend.update_snag_status(&RecordId::from("999"), "closed").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_link_photo_rows() {
        let backend = SqliteBackend::open_in_memory().unwrap();
        backend
            .link_photo(&PhotoLink::Snag {
                snag_id: RecordId::from("7"),
                file_path: "p1/1-a.jpg".into(),
                created_by: "u1".into(),
            })
            .await
            .unwrap();
        backend
            .link_photo(&PhotoLink::Project { project_id: RecordId::from("proj-9"), photo_url: "u1/1-b.jpg".into() })
            .await
            .unwrap();

        assert_eq!(backend.snag_photo_paths(&RecordId::from("7")).await.unwrap(), vec!["p1/1-a.jpg"]);
        assert_eq!(backend.count_rows(BackendTable::ProjectPhotos).await.unwrap(), 1);
        assert_eq!(backend.count_rows(BackendTable::QuoteRequestPhotos).await.unwrap(), 0);
    }
}
