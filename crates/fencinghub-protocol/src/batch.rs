//! 批量同步请求与响应

use serde::{Deserialize, Deserializer, Serialize};

use crate::item::OutboxItem;

/// `POST /api/sync/batch` 请求体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSyncRequest {
    #[serde(default)]
    pub items: Vec<OutboxItem>,
}

/// 单个失败条目
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedItem {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub error: String,
}

/// 批量同步响应
///
/// `ok` 当且仅当 `failed` 为空。`processed_ids` 缺失表示端点不上报逐条结果
/// （兼容旧端点），由客户端决定如何回退。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchSyncResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(
        default,
        deserialize_with = "deserialize_processed_ids",
        skip_serializing_if = "Option::is_none"
    )]
    pub processed_ids: Option<Vec<i64>>,
    #[serde(default)]
    pub failed: Vec<FailedItem>,
}

impl BatchSyncResponse {
    pub fn from_outcome(processed_ids: Vec<i64>, failed: Vec<FailedItem>) -> Self {
        Self {
            ok: failed.is_empty(),
            processed_ids: Some(processed_ids),
            failed,
        }
    }
}

/// null 与非正数 ID 没有记账意义，直接过滤
fn deserialize_processed_ids<'de, D>(deserializer: D) -> Result<Option<Vec<i64>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Option<i64>>> = Option::deserialize(deserializer)?;
    Ok(raw.map(|ids| ids.into_iter().flatten().filter(|id| *id > 0).collect()))
}
