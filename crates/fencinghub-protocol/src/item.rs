//! 发件箱条目

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::attachment::PhotoAttachment;
use crate::constants::PHOTOS_FIELD;

/// 条目类型（封闭集合，生产端与批量端点共同认可）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutboxKind {
    Note,
    Snag,
    SnagStatus,
    Measurement,
    QuoteRequest,
    CustomerProject,
    CustomerSnag,
}

impl OutboxKind {
    pub const ALL: [OutboxKind; 7] = [
        OutboxKind::Note,
        OutboxKind::Snag,
        OutboxKind::SnagStatus,
        OutboxKind::Measurement,
        OutboxKind::QuoteRequest,
        OutboxKind::CustomerProject,
        OutboxKind::CustomerSnag,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OutboxKind::Note => "note",
            OutboxKind::Snag => "snag",
            OutboxKind::SnagStatus => "snag_status",
            OutboxKind::Measurement => "measurement",
            OutboxKind::QuoteRequest => "quote_request",
            OutboxKind::CustomerProject => "customer_project",
            OutboxKind::CustomerSnag => "customer_snag",
        }
    }

    /// 该类型是否可能携带照片附件
    pub fn accepts_photos(&self) -> bool {
        matches!(
            self,
            OutboxKind::Snag
                | OutboxKind::QuoteRequest
                | OutboxKind::CustomerProject
                | OutboxKind::CustomerSnag
        )
    }
}

impl fmt::Display for OutboxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 无法识别的条目类型
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown outbox item type: {0}")]
pub struct UnknownOutboxKind(pub String);

impl FromStr for OutboxKind {
    type Err = UnknownOutboxKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OutboxKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownOutboxKind(s.to_string()))
    }
}

/// 延迟提交的变更单元
///
/// `id` 只用于本地队列记账（决定删除哪些条目），端点不会把它当作业务记录 ID。
/// `payload` 的结构完全由 `kind` 决定，队列本身从不检查其内容。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutboxItem {
    /// 本地自增 ID，首次持久化之前为空
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(rename = "type")]
    pub kind: OutboxKind,
    #[serde(default)]
    pub payload: serde_json::Value,
    /// 创建时间（毫秒时间戳），仅用于排序
    pub created_at: i64,
    /// 幂等键，端点据此识别重复提交；旧客户端可能没有
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl OutboxItem {
    pub fn new(kind: OutboxKind, payload: serde_json::Value, created_at: i64) -> Self {
        Self {
            id: None,
            kind,
            payload,
            created_at,
            idempotency_key: None,
        }
    }

    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// 读取 payload 中内嵌的照片列表；字段缺失或格式不对时返回空列表
    pub fn photos(&self) -> Vec<PhotoAttachment> {
        self.payload
            .get(PHOTOS_FIELD)
            .cloned()
            .and_then(|value| serde_json::from_value(value).ok())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_item_wire_shape() {
        let item = OutboxItem {
            id: Some(3),
            kind: OutboxKind::SnagStatus,
            payload: json!({ "id": "s1", "status": "closed" }),
            created_at: 1_700_000_000_000,
            idempotency_key: Some("k-1".to_string()),
        };

        let value = serde_json::to_value(&item).unwrap();
        assert_eq!(value["type"], "snag_status");
        assert_eq!(value["createdAt"], 1_700_000_000_000i64);
        assert_eq!(value["idempotencyKey"], "k-1");
        assert_eq!(value["id"], 3);
    }

    #[test]
    fn test_legacy_item_without_key_or_id() {
        let raw = json!({
            "type": "note",
            "payload": { "project_id": "p1", "content": "hello" },
            "createdAt": 5
        });
        let item: OutboxItem = serde_json::from_value(raw).unwrap();
        assert_eq!(item.id, None);
        assert_eq!(item.kind, OutboxKind::Note);
        assert!(item.idempotency_key.is_none());
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let raw = json!({ "type": "invoice", "payload": {}, "createdAt": 1 });
        assert!(serde_json::from_value::<OutboxItem>(raw).is_err());
        assert_eq!(
            "invoice".parse::<OutboxKind>(),
            Err(UnknownOutboxKind("invoice".to_string()))
        );
    }

    #[test]
    fn test_kind_from_str_covers_all() {
        for kind in OutboxKind::ALL {
            assert_eq!(kind.as_str().parse::<OutboxKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_photos_from_payload() {
        let item = OutboxItem::new(
            OutboxKind::Snag,
            json!({
                "project_id": "p1",
                "photos": [{ "name": "a.png", "dataUrl": "data:image/png;base64,AA==" }]
            }),
            1,
        );
        let photos = item.photos();
        assert_eq!(photos.len(), 1);
        assert_eq!(photos[0].name.as_deref(), Some("a.png"));

        let bare = OutboxItem::new(OutboxKind::Note, json!({ "content": "x" }), 1);
        assert!(bare.photos().is_empty());
    }
}
