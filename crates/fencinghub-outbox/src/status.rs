//! 状态指示 - 在线/离线与待同步计数

use serde::{Deserialize, Serialize};

/// 界面上展示的发件箱状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboxStatus {
    pub online: bool,
    pub pending: usize,
    pub syncing: bool,
}

impl OutboxStatus {
    /// "立即同步"是否可用
    pub fn can_sync(&self) -> bool {
        self.online && self.pending > 0 && !self.syncing
    }

    pub fn status_text(&self) -> &'static str {
        if !self.online {
            "Offline — changes will sync automatically"
        } else if self.pending > 0 {
            "Online — changes queued"
        } else {
            "Online"
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_can_sync_requires_online_pending_and_idle() {
        let status = OutboxStatus { online: true, pending: 2, syncing: false };
        assert!(status.can_sync());
        assert!(!OutboxStatus { online: false, ..status }.can_sync());
        assert!(!OutboxStatus { pending: 0, ..status }.can_sync());
        assert!(!OutboxStatus { syncing: true, ..status }.can_sync());
    }

    #[test]
    fn test_status_text() {
        let offline = OutboxStatus { online: false, pending: 3, syncing: false };
        assert_eq!(offline.status_text(), "Offline — changes will sync automatically");
        let queued = OutboxStatus { online: true, pending: 3, syncing: false };
        assert_eq!(queued.status_text(), "Online — changes queued");
        let idle = OutboxStatus { online: true, pending: 0, syncing: false };
        assert_eq!(idle.status_text(), "Online");
    }
}
