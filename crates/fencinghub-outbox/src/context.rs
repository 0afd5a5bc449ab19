//! 执行上下文装配
//!
//! 页面启动代码和 worker 启动代码各自构造一个 `OutboxContext`，各自持有
//! 存储连接、通知总线和同步引擎；两者只通过同名持久化队列与 `ContextChannel` 协作。

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::background_sync::{BackgroundSyncPlatform, BackgroundSyncRegistrar};
use crate::channel::{ContextChannel, ContextRole};
use crate::config::OutboxConfig;
use crate::error::Result;
use crate::events::{ChangeReason, OutboxEvents};
use crate::http_client::{BatchSyncClient, HttpBatchClient};
use crate::network::NetworkMonitor;
use crate::producer::OutboxProducer;
use crate::status::OutboxStatus;
use crate::storage::{DeadLetter, OutboxStore, SqliteOutboxStore};
use crate::sync::{AutoSync, OutboxDrainer, RetryPolicy};
use crate::worker::SyncWorker;

#[derive(Debug)]
pub struct OutboxContext {
    role: ContextRole,
    config: OutboxConfig,
    store: Arc<dyn OutboxStore>,
    events: Arc<OutboxEvents>,
    network: Arc<NetworkMonitor>,
    channel: ContextChannel,
    producer: Arc<OutboxProducer>,
    drainer: Arc<OutboxDrainer>,
}

impl OutboxContext {
    pub fn builder(role: ContextRole, config: OutboxConfig) -> OutboxContextBuilder {
        OutboxContextBuilder::new(role, config)
    }

    pub fn role(&self) -> ContextRole {
        self.role
    }

    pub fn config(&self) -> &OutboxConfig {
        &self.config
    }

    pub fn store(&self) -> Arc<dyn OutboxStore> {
        self.store.clone()
    }

    pub fn events(&self) -> Arc<OutboxEvents> {
        self.events.clone()
    }

    pub fn network(&self) -> Arc<NetworkMonitor> {
        self.network.clone()
    }

    pub fn channel(&self) -> &ContextChannel {
        &self.channel
    }

    pub fn producer(&self) -> Arc<OutboxProducer> {
        self.producer.clone()
    }

    pub fn drainer(&self) -> Arc<OutboxDrainer> {
        self.drainer.clone()
    }

    /// 页面侧自动同步调度
    pub fn auto_sync(&self) -> AutoSync {
        AutoSync::new(
            self.drainer.clone(),
            self.store.clone(),
            self.network.clone(),
            self.events.clone(),
            Some(self.channel.clone()),
            Duration::from_secs(self.config.sync_interval_secs),
        )
    }

    /// worker 侧同步处理器
    pub fn worker(&self) -> SyncWorker {
        SyncWorker::new(self.drainer.clone(), self.channel.clone(), self.config.sync_tag.clone())
    }

    pub async fn status(&self) -> Result<OutboxStatus> {
        Ok(OutboxStatus {
            online: self.network.is_online().await,
            pending: self.store.count().await?,
            syncing: self.drainer.is_syncing(),
        })
    }

    pub async fn dead_letters(&self) -> Result<Vec<DeadLetter>> {
        self.store.dead_letters().await
    }

    /// 把死信条目放回队列
    pub async fn requeue_dead_letter(&self, id: i64) -> Result<Option<i64>> {
        let new_id = self.store.requeue_dead_letter(id).await?;
        if let Some(new_id) = new_id {
            self.events.publish(ChangeReason::Requeued { id: new_id });
        }
        Ok(new_id)
    }
}

pub struct OutboxContextBuilder {
    role: ContextRole,
    config: OutboxConfig,
    store: Option<Arc<dyn OutboxStore>>,
    client: Option<Arc<dyn BatchSyncClient>>,
    network: Option<Arc<NetworkMonitor>>,
    channel: Option<ContextChannel>,
    platform: Option<Arc<dyn BackgroundSyncPlatform>>,
}

impl OutboxContextBuilder {
    pub fn new(role: ContextRole, config: OutboxConfig) -> Self {
        Self {
            role,
            config,
            store: None,
            client: None,
            network: None,
            channel: None,
            platform: None,
        }
    }

    /// 替换默认的 SQLite 存储
    pub fn store(mut self, store: Arc<dyn OutboxStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// 替换默认的 HTTP 客户端
    pub fn client(mut self, client: Arc<dyn BatchSyncClient>) -> Self {
        self.client = Some(client);
        self
    }

    pub fn network(mut self, network: Arc<NetworkMonitor>) -> Self {
        self.network = Some(network);
        self
    }

    /// 与另一上下文共用的广播通道
    pub fn channel(mut self, channel: ContextChannel) -> Self {
        self.channel = Some(channel);
        self
    }

    pub fn background_sync(mut self, platform: Arc<dyn BackgroundSyncPlatform>) -> Self {
        self.platform = Some(platform);
        self
    }

    pub async fn build(self) -> Result<OutboxContext> {
        self.config.validate()?;

        let store: Arc<dyn OutboxStore> = match self.store {
            Some(store) => store,
            None => Arc::new(SqliteOutboxStore::open(&self.config.data_dir, &self.config.store_name).await?),
        };
        let client: Arc<dyn BatchSyncClient> = match self.client {
            Some(client) => client,
            None => Arc::new(HttpBatchClient::new(&self.config)?),
        };
        let network = self.network.unwrap_or_default();
        let channel = self.channel.unwrap_or_default();
        let events = Arc::new(OutboxEvents::new(self.config.event_buffer_size));
        let registrar = BackgroundSyncRegistrar::new(self.platform, self.config.sync_tag.clone());

        let producer = Arc::new(OutboxProducer::new(store.clone(), events.clone(), registrar));
        let drainer = Arc::new(OutboxDrainer::new(
            store.clone(),
            client,
            network.clone(),
            events.clone(),
            RetryPolicy::from(&self.config.retry),
        ));

        info!("发件箱上下文已就绪: {:?} (store={})", self.role, self.config.store_name);

        Ok(OutboxContext {
            role: self.role,
            config: self.config,
            store,
            events,
            network,
            channel,
            producer,
            drainer,
        })
    }
}
