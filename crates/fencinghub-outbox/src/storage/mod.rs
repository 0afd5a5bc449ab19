//! 存储模块 - 发件箱的持久化队列
//!
//! - `OutboxStore`: 队列契约（追加、按序全量读取、计数、按 ID 集合删除）
//! - `SqliteOutboxStore`: 磁盘持久化实现，按名称打开，页面与 worker 各自持有独立连接
//! - `MemoryOutboxStore`: 内存实现，用于测试或不需要持久化的场景

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt::Debug;
use tokio::sync::RwLock;
use tracing::debug;

use fencinghub_protocol::{FailedItem, OutboxItem};

use crate::error::Result;
use crate::sync::RetryPolicy;
use crate::utils::time::now_millis;

pub mod dao;
pub mod migrate;
pub mod sqlite;

pub use dao::DeadLetter;
pub use sqlite::SqliteOutboxStore;

/// 发件箱队列存储
///
/// 每个操作本身是原子的；多个上下文并发追加和删除不需要额外加锁。
#[async_trait]
pub trait OutboxStore: Debug + Send + Sync {
    /// 追加条目，返回新分配的 ID（忽略传入条目上的 id）
    async fn add(&self, item: OutboxItem) -> Result<i64>;

    /// 读取全部待处理条目
    async fn get_all(&self) -> Result<Vec<OutboxItem>>;

    async fn count(&self) -> Result<usize>;

    /// 删除给定 ID；不存在的 ID 不是错误。返回实际删除的条数
    async fn delete_many(&self, ids: &[i64]) -> Result<usize>;

    /// 记录端点明确拒绝的条目，`policy` 判定为死信的条目移入死信表。
    /// 返回本次被移入死信表的 ID
    async fn record_failures(&self, failures: &[FailedItem], policy: &RetryPolicy) -> Result<Vec<i64>>;

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>>;

    /// 把死信条目重新放回队列（新 ID、计数清零），返回新 ID
    async fn requeue_dead_letter(&self, id: i64) -> Result<Option<i64>>;
}

#[derive(Debug, Clone)]
struct MemoryEntry {
    item: OutboxItem,
    attempts: u32,
    last_error: Option<String>,
}

#[derive(Debug, Default)]
struct MemoryState {
    next_id: i64,
    entries: Vec<MemoryEntry>,
    dead: HashMap<i64, DeadLetter>,
}

impl MemoryState {
    fn push(&mut self, mut item: OutboxItem) -> i64 {
        self.next_id += 1;
        let id = self.next_id;
        item.id = Some(id);
        self.entries.push(MemoryEntry {
            item,
            attempts: 0,
            last_error: None,
        });
        id
    }
}

/// 基于内存的发件箱
#[derive(Debug, Default)]
pub struct MemoryOutboxStore {
    state: RwLock<MemoryState>,
}

impl MemoryOutboxStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl OutboxStore for MemoryOutboxStore {
    async fn add(&self, item: OutboxItem) -> Result<i64> {
        let mut state = self.state.write().await;
        let id = state.push(item);
        debug!("条目已写入内存发件箱: id={}, 当前大小: {}", id, state.entries.len());
        Ok(id)
    }

    async fn get_all(&self) -> Result<Vec<OutboxItem>> {
        let state = self.state.read().await;
        let mut items: Vec<OutboxItem> = state.entries.iter().map(|e| e.item.clone()).collect();
        items.sort_by_key(|item| (item.created_at, item.id));
        Ok(items)
    }

    async fn count(&self) -> Result<usize> {
        Ok(self.state.read().await.entries.len())
    }

    async fn delete_many(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let mut state = self.state.write().await;
        let before = state.entries.len();
        state
            .entries
            .retain(|entry| !entry.item.id.is_some_and(|id| ids.contains(&id)));
        Ok(before - state.entries.len())
    }

    async fn record_failures(&self, failures: &[FailedItem], policy: &RetryPolicy) -> Result<Vec<i64>> {
        let mut state = self.state.write().await;
        let mut dead_ids = Vec::new();

        for failure in failures {
            let Some(id) = failure.id else { continue };
            let Some(pos) = state.entries.iter().position(|e| e.item.id == Some(id)) else {
                continue;
            };
            let entry = &mut state.entries[pos];
            entry.attempts += 1;
            entry.last_error = Some(failure.error.clone());

            if policy.should_dead_letter(entry.attempts) {
                let entry = state.entries.remove(pos);
                state.dead.insert(
                    id,
                    DeadLetter {
                        item: entry.item,
                        attempts: entry.attempts,
                        last_error: entry.last_error,
                        dead_at: now_millis(),
                    },
                );
                dead_ids.push(id);
            }
        }
        Ok(dead_ids)
    }

    async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        let state = self.state.read().await;
        let mut letters: Vec<DeadLetter> = state.dead.values().cloned().collect();
        letters.sort_by_key(|letter| (letter.item.created_at, letter.item.id));
        Ok(letters)
    }

    async fn requeue_dead_letter(&self, id: i64) -> Result<Option<i64>> {
        let mut state = self.state.write().await;
        let Some(letter) = state.dead.remove(&id) else {
            return Ok(None);
        };
        Ok(Some(state.push(letter.item)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fencinghub_protocol::OutboxKind;
    use serde_json::json;

    fn note(created_at: i64) -> OutboxItem {
        OutboxItem::new(OutboxKind::Note, json!({ "content": created_at }), created_at)
    }

    #[tokio::test]
    async fn test_memory_store_basic_operations() {
        let store = MemoryOutboxStore::new();
        let a = store.add(note(20)).await.unwrap();
        let b = store.add(note(10)).await.unwrap();
        assert_ne!(a, b);
        assert_eq!(store.count().await.unwrap(), 2);

        let items = store.get_all().await.unwrap();
        assert_eq!(items[0].id, Some(b));
        assert_eq!(items[1].id, Some(a));

        assert_eq!(store.delete_many(&[a, 999]).await.unwrap(), 1);
        assert_eq!(store.delete_many(&[a]).await.unwrap(), 0);
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_memory_store_dead_letter() {
        let store = MemoryOutboxStore::new();
        let id = store.add(note(1)).await.unwrap();
        let failure = [FailedItem { id: Some(id), error: "rejected".into() }];

        let policy = RetryPolicy::bounded(2);
        assert!(store.record_failures(&failure, &policy).await.unwrap().is_empty());
        assert_eq!(store.record_failures(&failure, &policy).await.unwrap(), vec![id]);
        assert_eq!(store.count().await.unwrap(), 0);

        let letters = store.dead_letters().await.unwrap();
        assert_eq!(letters.len(), 1);
        assert_eq!(letters[0].attempts, 2);

        let new_id = store.requeue_dead_letter(id).await.unwrap().unwrap();
        assert_ne!(new_id, id);
        assert_eq!(store.count().await.unwrap(), 1);
        assert!(store.dead_letters().await.unwrap().is_empty());
    }
}
