//! SQLite 发件箱存储
//!
//! 一个 store 名称对应 `<data_dir>/<store_name>.db` 一个文件。页面上下文与 worker
//! 上下文分别 `open` 同名 store，各自持有独立连接，彼此不共享内存；
//! 单条追加、按 ID 集合删除都是单语句原子操作。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use rusqlite::Connection;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use fencinghub_protocol::{FailedItem, OutboxItem};

use crate::error::{OutboxError, Result};
use crate::storage::dao::{DaoFactory, DeadLetter};
use crate::storage::migrate::init_db;
use crate::storage::OutboxStore;
use crate::sync::RetryPolicy;
use crate::utils::time::now_millis;

#[derive(Debug, Clone)]
pub struct SqliteOutboxStore {
    path: PathBuf,
    conn: Arc<Mutex<Connection>>,
}

impl SqliteOutboxStore {
    /// 按名称打开（不存在则创建）发件箱
    pub async fn open(data_dir: &Path, store_name: &str) -> Result<Self> {
        if store_name.trim().is_empty() {
            return Err(OutboxError::Config("store_name 不能为空".to_string()));
        }
        tokio::fs::create_dir_all(data_dir)
            .await
            .map_err(|e| OutboxError::Io(format!("创建数据目录失败: {}", e)))?;

        Self::open_path(Self::file_path(data_dir, store_name))
    }

    /// 数据库文件路径：`<data_dir>/<store_name>.db`
    pub fn file_path(data_dir: &Path, store_name: &str) -> PathBuf {
        data_dir.join(format!("{}.db", store_name))
    }

    /// 直接按文件路径打开
    pub fn open_path(path: PathBuf) -> Result<Self> {
        let mut conn = Connection::open(&path)
            .map_err(|e| OutboxError::Database(format!("打开发件箱数据库失败: {}", e)))?;
        init_db(&mut conn)?;

        info!("发件箱已打开: {}", path.display());
        Ok(Self {
            path,
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl OutboxStore for SqliteOutboxStore {
    async fn add(&self, item: OutboxItem) -> Result<i64> {
        let conn = self.conn.lock().await;
        let id = DaoFactory::outbox_dao(&conn).insert(&item)?;
        debug!("条目已写入发件箱: id={}, type={}", id, item.kind);
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<OutboxItem>> {
        let conn = self.conn.lock().await;
        DaoFactory::outbox_dao(&conn).list_all()
    }

    async fn count(&self) -> Result<usize> {
        let conn = self.conn.lock().await;
        DaoFactory::outbox_dao(&conn).count()
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock().await;
        let removed = DaoFactory::outbox_dao(&conn).delete_many(ids)?;
        debug!("发件箱删除 {} 条（请求 {} 条）", removed, ids.len());
        Ok(removed)
    }

    async fn record_failures(&self, failures: &[FailedItem], policy: &RetryPolicy) -> Result<Vec<i64>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let mut dead_ids = Vec::new();
        {
            let outbox = DaoFactory::outbox_dao(&tx);
            let dead_letters = DaoFactory::dead_letter_dao(&tx);
            let dead_at = now_millis();

            for failure in failures {
                let Some(id) = failure.id else { continue };
                let Some(attempts) = outbox.record_failure(id, &failure.error)? else {
                    continue;
                };
                if policy.should_dead_letter(attempts) && dead_letters.move_from_outbox(id, dead_at)? {
                    warn!("条目 {} 已被拒绝 {} 次，移入死信表: {}", id, attempts, failure.error);
                    dead_ids.push(id);
                }
            }
        }
        tx.commit()?;
        Ok(dead_ids)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let conn = self.conn.lock().await;
        DaoFactory::dead_letter_dao(&conn).list()
    }

    async fn requeue_dead_letter(&self, id: i64) -> Result<Option<i64>> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        let new_id = match DaoFactory::dead_letter_dao(&tx).take(id)? {
            Some(raw) => {
                let item = raw.into_item()?;
                Some(DaoFactory::outbox_dao(&tx).insert(&item)?)
            }
            None => None,
        };
        tx.commit()?;
        if let Some(new_id) = new_id {
            info!("死信条目 {} 已重新入队，新 ID {}", id, new_id);
        }
        Ok(new_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencinghub_protocol::OutboxKind;
    use serde_json::json;
    use tempfile::TempDir;

    fn note(content: &str, created_at: i64) -> OutboxItem {
        OutboxItem::new(
            OutboxKind::Note,
            json!({ "project_id": "p1", "content": content }),
            created_at,
        )
    }

    #[tokio::test]
    async fn test_items_survive_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
            store.add(note("hello", 1)).await.unwrap();
            store.add(note("world", 2)).await.unwrap();
        }

        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let items = store.get_all().await.unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].payload["content"], "hello");
        assert_eq!(items[1].payload["content"], "world");
    }

    #[tokio::test]
    async fn test_two_handles_share_one_store() {
        let dir = TempDir::new().unwrap();
        let page = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let worker = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();

        let id = page.add(note("from page", 1)).await.unwrap();
        assert_eq!(worker.count().await.unwrap(), 1);

        // 两个上下文同时删除同一条
        assert_eq!(worker.delete_many(&[id]).await.unwrap(), 1);
        assert_eq!(page.delete_many(&[id]).await.unwrap(), 0);
        assert_eq!(page.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_get_all_orders_by_created_at_then_insertion() {
        let dir = TempDir::new().unwrap();
        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let c = store.add(note("c", 30)).await.unwrap();
        let a = store.add(note("a", 10)).await.unwrap();
        let b1 = store.add(note("b1", 20)).await.unwrap();
        let b2 = store.add(note("b2", 20)).await.unwrap();

        let ids: Vec<i64> = store.get_all().await.unwrap().into_iter().filter_map(|i| i.id).collect();
        assert_eq!(ids, vec![a, b1, b2, c]);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent_and_ignores_unknown_ids() {
        let dir = TempDir::new().unwrap();
        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let a = store.add(note("a", 1)).await.unwrap();
        let b = store.add(note("b", 2)).await.unwrap();

        assert_eq!(store.delete_many(&[a, 4242]).await.unwrap(), 1);
        assert_eq!(store.delete_many(&[a]).await.unwrap(), 0);
        assert_eq!(store.delete_many(&[]).await.unwrap(), 0);

        let remaining = store.get_all().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].id, Some(b));
    }

    #[tokio::test]
    async fn test_ids_are_not_reused_after_delete() {
        let dir = TempDir::new().unwrap();
        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let a = store.add(note("a", 1)).await.unwrap();
        store.delete_many(&[a]).await.unwrap();
        let b = store.add(note("b", 2)).await.unwrap();
        assert!(b > a);
    }

    #[tokio::test]
    async fn test_failures_reach_dead_letter_and_requeue() {
        let dir = TempDir::new().unwrap();
        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let item = note("bad", 1).with_idempotency_key("key-1");
        let id = store.add(item).await.unwrap();
        let failure = [FailedItem { id: Some(id), error: "project not found".into() }];

        // 无上限时永远保留
        for _ in 0..3 {
            assert!(store.record_failures(&failure, &RetryPolicy::unbounded()).await.unwrap().is_empty());
        }
        assert_eq!(store.count().await.unwrap(), 1);

        assert_eq!(store.record_failures(&failure, &RetryPolicy::bounded(4)).await.unwrap(), vec![id]);
        assert_eq!(store.count().await.unwrap(), 0);

        let letters = store.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 4);
        assert_eq!(letters[0].last_error.as_deref(), Some("project not found"));
        assert_eq!(letters[0].item.idempotency_key.as_deref(), Some("key-1"));

        let new_id = store.requeue_dead_letter(id).await.unwrap().unwrap();
        assert!(new_id > id);
        assert!(store.dead_letters().await.unwrap().is_empty());
        let items = store.get_all().await.unwrap();
        assert_eq!(items[0].payload["content"], "bad");
        assert_eq!(items[0].idempotency_key.as_deref(), Some("key-1"));

        assert_eq!(store.requeue_dead_letter(id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unreadable_rows_do_not_block_the_queue() {
        let dir = TempDir::new().unwrap();
        let store = SqliteOutboxStore::open(dir.path(), "outbox").await.unwrap();
        let good = store.add(note("good", 1)).await.unwrap();

        // 旧版本或外部写入的坏行
        let raw = Connection::open(store.path()).unwrap();
        raw.execute(
            "INSERT INTO outbox (kind, payload, created_at) VALUES ('invoice', '{}', 2)",
            [],
        )
        .unwrap();
        raw.execute(
            "INSERT INTO outbox (kind, payload, created_at) VALUES ('note', 'not json', 3)",
            [],
        )
        .unwrap();
        drop(raw);

        let items = store.get_all().await.unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].id, Some(good));
        assert_eq!(store.count().await.unwrap(), 3);

        assert_eq!(store.delete_many(&[good]).await.unwrap(), 1);
        assert!(store.get_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_empty_store_name_is_rejected() {
        let dir = TempDir::new().unwrap();
        let err = SqliteOutboxStore::open(dir.path(), "").await.unwrap_err();
        assert!(matches!(err, OutboxError::Config(_)));
        let err = SqliteOutboxStore::open(dir.path(), "  ").await.unwrap_err();
        assert!(matches!(err, OutboxError::Config(_)));
    }

    #[tokio::test]
    async fn test_opened_file_matches_config_path() {
        let dir = TempDir::new().unwrap();
        let config = crate::config::OutboxConfig::builder()
            .data_dir(dir.path())
            .store_name("site-outbox")
            .build();
        let store = SqliteOutboxStore::open(&config.data_dir, &config.store_name).await.unwrap();
        assert_eq!(store.path(), config.store_path().as_path());
        assert!(config.store_path().exists());
    }
}
