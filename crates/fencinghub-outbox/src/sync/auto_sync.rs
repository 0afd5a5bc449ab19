//! 页面上下文的自动同步调度
//!
//! 触发源：启动时立即一次、周期定时器、离线转在线、worker 广播的 `SYNC_NOW`。
//! 手动"立即同步"走 `sync_now`，仅在在线、有待同步条目且未在同步时执行。
//! worker 广播 `OUTBOX_UPDATED` 时只刷新本地计数（发布 `RemoteSync`），不发请求。

use std::sync::Arc;
use std::time::Duration;

use tokio::select;
use tokio::sync::{broadcast, Notify, RwLock};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, instrument};

use fencinghub_protocol::ContextMessage;

use crate::channel::{ContextChannel, ContextReceiver, ContextRole};
use crate::error::{OutboxError, Result};
use crate::events::{ChangeReason, OutboxEvents};
use crate::network::NetworkMonitor;
use crate::status::OutboxStatus;
use crate::storage::OutboxStore;
use crate::sync::{OutboxDrainer, SyncOutcome};

#[derive(Debug)]
pub struct AutoSync {
    drainer: Arc<OutboxDrainer>,
    store: Arc<dyn OutboxStore>,
    network: Arc<NetworkMonitor>,
    events: Arc<OutboxEvents>,
    channel: Option<ContextChannel>,
    interval: Duration,
    shutdown_signal: Arc<Notify>,
    is_running: Arc<RwLock<bool>>,
}

impl AutoSync {
    pub fn new(
        drainer: Arc<OutboxDrainer>,
        store: Arc<dyn OutboxStore>,
        network: Arc<NetworkMonitor>,
        events: Arc<OutboxEvents>,
        channel: Option<ContextChannel>,
        interval: Duration,
    ) -> Self {
        Self {
            drainer,
            store,
            network,
            events,
            channel,
            interval,
            shutdown_signal: Arc::new(Notify::new()),
            is_running: Arc::new(RwLock::new(false)),
        }
    }

    /// 启动后台调度任务（首个定时 tick 立即触发，即启动时同步一次）
    pub async fn start(&self) -> Result<()> {
        {
            let mut running = self.is_running.write().await;
            if *running {
                return Err(OutboxError::Config("AutoSync already running".to_string()));
            }
            *running = true;
        }

        info!("启动自动同步，间隔 {:?}", self.interval);

        let drainer = self.drainer.clone();
        let events = self.events.clone();
        let shutdown = self.shutdown_signal.clone();
        let is_running = self.is_running.clone();
        let mut network_events = self.network.subscribe();
        let mut messages = self.channel.as_ref().map(|c| c.subscribe(ContextRole::Page));
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tokio::spawn(async move {
            loop {
                select! {
                    _ = shutdown.notified() => break,
                    _ = ticker.tick() => {
                        run(&drainer, "interval").await;
                    }
                    event = network_events.recv() => match event {
                        Ok(event) if event.is_reconnect() => {
                            run(&drainer, "reconnect").await;
                        }
                        Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                    message = next_message(&mut messages) => match message {
                        ContextMessage::OutboxUpdated => {
                            events.publish(ChangeReason::RemoteSync);
                        }
                        ContextMessage::SyncNow => {
                            run(&drainer, "sync-now message").await;
                        }
                    },
                }
            }
            *is_running.write().await = false;
            debug!("自动同步任务已退出");
        });

        Ok(())
    }

    #[instrument(skip(self))]
    pub async fn stop(&self) {
        info!("停止自动同步");
        // notify_one 会保留许可，调度任务正在同步时也不会丢失停止信号
        self.shutdown_signal.notify_one();
    }

    pub async fn is_running(&self) -> bool {
        *self.is_running.read().await
    }

    /// 当前状态（在线、待同步数、是否在同步）
    pub async fn status(&self) -> Result<OutboxStatus> {
        Ok(OutboxStatus {
            online: self.network.is_online().await,
            pending: self.store.count().await?,
            syncing: self.drainer.is_syncing(),
        })
    }

    /// 用户触发的"立即同步"；条件不满足时返回 None
    pub async fn sync_now(&self) -> Result<Option<SyncOutcome>> {
        let status = self.status().await?;
        if !status.can_sync() {
            debug!("立即同步条件不满足: {:?}", status);
            return Ok(None);
        }
        Ok(Some(self.drainer.sync().await))
    }
}

async fn run(drainer: &OutboxDrainer, trigger: &str) {
    debug!("触发同步: {}", trigger);
    let outcome = drainer.sync().await;
    if outcome.processed > 0 {
        info!("{} 触发的同步处理了 {} 条", trigger, outcome.processed);
    }
}

/// 下一条来自 worker 的消息；没有通道或通道已关闭时永远挂起
async fn next_message(messages: &mut Option<ContextReceiver>) -> ContextMessage {
    if let Some(receiver) = messages.as_mut() {
        if let Some(message) = receiver.recv().await {
            return message;
        }
    }
    *messages = None;
    std::future::pending().await
}
