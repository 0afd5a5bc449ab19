//! 同步引擎 - 单次整批回放
//!
//! 流程：离线直接返回 → 按创建时间读取全部条目 → 整批提交 → 只删除端点确认的 ID。
//! 传输失败时队列原样保留，等待下一次触发；不猜测部分成功。
//!
//! 每个上下文同一时刻至多一次同步在进行；页面与 worker 之间不互斥，
//! 依靠按 ID 幂等删除与端点的逐条独立处理保证安全。

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::{debug, error, info, instrument, warn};

use fencinghub_protocol::{BatchSyncResponse, FailedItem};

use crate::error::Result;
use crate::events::{ChangeReason, OutboxEvents};
use crate::http_client::BatchSyncClient;
use crate::network::NetworkMonitor;
use crate::storage::OutboxStore;
use crate::sync::{RetryPolicy, SkipReason, SyncFailureReason, SyncOutcome};

#[derive(Debug)]
pub struct OutboxDrainer {
    store: Arc<dyn OutboxStore>,
    client: Arc<dyn BatchSyncClient>,
    network: Arc<NetworkMonitor>,
    events: Arc<OutboxEvents>,
    retry: RetryPolicy,
    syncing: AtomicBool,
}

/// 同步进行中标记，drop 时复位
struct SyncGuard<'a>(&'a AtomicBool);

impl<'a> SyncGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| SyncGuard(flag))
    }
}

impl Drop for SyncGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OutboxDrainer {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        client: Arc<dyn BatchSyncClient>,
        network: Arc<NetworkMonitor>,
        events: Arc<OutboxEvents>,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            store,
            client,
            network,
            events,
            retry,
            syncing: AtomicBool::new(false),
        }
    }

    pub fn is_syncing(&self) -> bool {
        self.syncing.load(Ordering::Acquire)
    }

    /// 执行一次同步。错误不会向上抛出，而是记录在 `SyncOutcome::error` 中
    #[instrument(skip(self))]
    pub async fn sync(&self) -> SyncOutcome {
        if !self.network.is_online().await {
            debug!("离线，跳过同步");
            return SyncOutcome::skipped(SkipReason::Offline);
        }

        let Some(_guard) = SyncGuard::acquire(&self.syncing) else {
            debug!("已有同步在进行，跳过");
            return SyncOutcome::skipped(SkipReason::AlreadySyncing);
        };

        match self.drain().await {
            Ok(outcome) => outcome,
            Err(e) => {
                let reason = SyncFailureReason::from(&e);
                if e.is_transient() {
                    warn!("同步失败，队列保持不变: {} ({:?})", e, reason);
                } else {
                    error!("同步失败（本地错误），队列保持不变: {} ({:?})", e, reason);
                }
                SyncOutcome {
                    error: Some(e.to_string()),
                    failure_reason: Some(reason),
                    ..Default::default()
                }
            }
        }
    }

    async fn drain(&self) -> Result<SyncOutcome> {
        let mut items = self.store.get_all().await?;
        if items.is_empty() {
            return Ok(SyncOutcome::skipped(SkipReason::Empty));
        }
        items.sort_by_key(|item| (item.created_at, item.id));

        let submitted: Vec<i64> = items.iter().filter_map(|item| item.id).collect();
        let response = self.client.submit_batch(&items).await?;

        let confirmed = confirmed_ids(&submitted, &response);
        let removed = self.store.delete_many(&confirmed).await?;

        let submitted_set: HashSet<i64> = submitted.iter().copied().collect();
        let rejected: Vec<FailedItem> = response
            .failed
            .iter()
            .filter(|f| f.id.is_some_and(|id| submitted_set.contains(&id)))
            .cloned()
            .collect();

        let dead_lettered = if rejected.is_empty() {
            Vec::new()
        } else {
            match self.store.record_failures(&rejected, &self.retry).await {
                Ok(ids) => ids,
                Err(e) => {
                    // 已确认的删除不回滚；计数下次再记
                    warn!("记录失败次数出错: {}", e);
                    Vec::new()
                }
            }
        };

        if removed > 0 {
            self.events.publish(ChangeReason::Drained { count: removed });
        }
        if !dead_lettered.is_empty() {
            self.events.publish(ChangeReason::DeadLettered {
                count: dead_lettered.len(),
            });
        }

        info!(
            "同步完成: 提交 {} 条, 确认 {} 条, 删除 {} 条, 失败 {} 条, 死信 {} 条",
            submitted.len(),
            confirmed.len(),
            removed,
            response.failed.len(),
            dead_lettered.len()
        );

        Ok(SyncOutcome {
            processed: confirmed.len(),
            submitted: submitted.len(),
            failed: response.failed,
            dead_lettered,
            ..Default::default()
        })
    }
}

/// 从响应中挑出可以删除的本地 ID（只限本次提交过的）
///
/// 端点未上报 `processedIds` 时视为全部处理（兼容旧端点），但明确列在
/// `failed` 里的 ID 仍然保留。
fn confirmed_ids(submitted: &[i64], response: &BatchSyncResponse) -> Vec<i64> {
    match &response.processed_ids {
        Some(processed) => {
            let processed: HashSet<i64> = processed.iter().copied().collect();
            submitted.iter().copied().filter(|id| processed.contains(id)).collect()
        }
        None => {
            let failed: HashSet<i64> = response.failed.iter().filter_map(|f| f.id).collect();
            if !response.ok && failed.is_empty() {
                warn!("端点返回 ok=false 且未上报逐条结果，按兼容路径全部视为已处理");
            }
            submitted.iter().copied().filter(|id| !failed.contains(id)).collect()
        }
    }
}
