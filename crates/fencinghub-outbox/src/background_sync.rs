//! 后台同步注册
//!
//! 入队后向平台登记一次唤醒（同一 tag 重复登记会被平台合并）。平台支持是可选的：
//! 没有平台实现、或登记失败，都只记 warn，不影响入队结果；周期定时器与
//! 重连事件仍然会触发同步。

use std::fmt::Debug;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::error::{OutboxError, Result};

/// 平台的后台任务能力
#[async_trait]
pub trait BackgroundSyncPlatform: Send + Sync + Debug {
    /// 登记一个命名唤醒；平台稍后向 worker 投递同名 `WakeEvent`
    async fn register(&self, tag: &str) -> Result<()>;
}

/// 平台投递给 worker 的唤醒事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakeEvent {
    pub tag: String,
}

#[derive(Debug, Clone)]
pub struct BackgroundSyncRegistrar {
    platform: Option<Arc<dyn BackgroundSyncPlatform>>,
    tag: String,
}

impl BackgroundSyncRegistrar {
    pub fn new(platform: Option<Arc<dyn BackgroundSyncPlatform>>, tag: impl Into<String>) -> Self {
        Self {
            platform,
            tag: tag.into(),
        }
    }

    /// 平台不支持后台同步
    pub fn unsupported(tag: impl Into<String>) -> Self {
        Self::new(None, tag)
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn is_supported(&self) -> bool {
        self.platform.is_some()
    }

    /// 尽力登记唤醒，所有错误就地吞掉
    pub async fn register_wakeup(&self) {
        let Some(platform) = &self.platform else {
            debug!("平台不支持后台同步，跳过登记");
            return;
        };
        if let Err(e) = platform.register(&self.tag).await {
            warn!("后台同步登记失败 (tag={}): {}", self.tag, e);
        }
    }
}

/// 进程内平台实现：唤醒事件经 mpsc 直接送到 worker
#[derive(Debug, Clone)]
pub struct ChannelBackgroundSync {
    sender: mpsc::Sender<WakeEvent>,
}

impl ChannelBackgroundSync {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<WakeEvent>) {
        let (sender, receiver) = mpsc::channel(buffer.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl BackgroundSyncPlatform for ChannelBackgroundSync {
    async fn register(&self, tag: &str) -> Result<()> {
        match self.sender.try_send(WakeEvent { tag: tag.to_string() }) {
            Ok(()) => Ok(()),
            // 已有未处理的唤醒，等价于平台合并同名登记
            Err(mpsc::error::TrySendError::Full(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Closed(_)) => {
                Err(OutboxError::Config("后台 worker 已退出".to_string()))
            }
        }
    }
}
