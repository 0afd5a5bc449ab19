//! 条目类型到业务变更的类型化分发
//!
//! 每种 `OutboxKind` 对应一个变体，payload 在这里一次性校验成强类型结构，
//! 新增条目类型时 `from_item` 的 match 会在编译期提示补全。

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use fencinghub_protocol::{OutboxItem, OutboxKind, PhotoAttachment};

use crate::error::{IngestError, Result};

/// 记录 ID；线上既可能是字符串也可能是数字
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl RecordId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for RecordId {
    fn from(value: &str) -> Self {
        RecordId(value.to_string())
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        match Value::deserialize(deserializer)? {
            Value::String(s) if !s.trim().is_empty() => Ok(RecordId(s)),
            Value::Number(n) => Ok(RecordId(n.to_string())),
            other => Err(serde::de::Error::custom(format!("invalid record id: {}", other))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct NotePayload {
    pub project_id: RecordId,
    #[serde(default)]
    pub content: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeasurementPayload {
    pub project_id: RecordId,
    /// 已解析的测量快照
    pub data: Value,
}

#[derive(Deserialize)]
struct RawMeasurement {
    project_id: RecordId,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnagPayload {
    pub project_id: RecordId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub is_internal: Option<bool>,
    #[serde(default)]
    pub photos: Vec<PhotoAttachment>,
    /// 其余字段原样保存
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SnagStatusPayload {
    pub id: RecordId,
    pub status: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct QuoteRequestPayload {
    #[serde(default)]
    pub project_id: Option<RecordId>,
    #[serde(default)]
    pub photos: Vec<PhotoAttachment>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// 转发到 `/api/customer/projects` 的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerProjectPayload {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub site_address: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub materials: Option<Value>,
    #[serde(default)]
    pub preferred_date: Option<String>,
    #[serde(default, skip_serializing)]
    pub photos: Vec<PhotoAttachment>,
}

/// 转发到 `/api/customer/snags` 的字段
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomerSnagPayload {
    pub project_id: RecordId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default, skip_serializing)]
    pub photos: Vec<PhotoAttachment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum OutboxMutation {
    Note(NotePayload),
    Measurement(MeasurementPayload),
    Snag(SnagPayload),
    SnagStatus(SnagStatusPayload),
    QuoteRequest(QuoteRequestPayload),
    CustomerProject(CustomerProjectPayload),
    CustomerSnag(CustomerSnagPayload),
}

impl OutboxMutation {
    pub fn from_item(item: &OutboxItem) -> Result<Self> {
        let payload = &item.payload;
        let mutation = match item.kind {
            OutboxKind::Note => OutboxMutation::Note(parse(item.kind, payload)?),
            OutboxKind::Measurement => {
                let raw: RawMeasurement = parse(item.kind, payload)?;
                OutboxMutation::Measurement(MeasurementPayload {
                    project_id: raw.project_id,
                    data: parse_measurement_data(raw.data)?,
                })
            }
            OutboxKind::Snag => OutboxMutation::Snag(parse(item.kind, payload)?),
            OutboxKind::SnagStatus => OutboxMutation::SnagStatus(parse(item.kind, payload)?),
            OutboxKind::QuoteRequest => OutboxMutation::QuoteRequest(parse(item.kind, payload)?),
            OutboxKind::CustomerProject => OutboxMutation::CustomerProject(parse(item.kind, payload)?),
            OutboxKind::CustomerSnag => OutboxMutation::CustomerSnag(parse(item.kind, payload)?),
        };
        Ok(mutation)
    }

    pub fn kind(&self) -> OutboxKind {
        match self {
            OutboxMutation::Note(_) => OutboxKind::Note,
            OutboxMutation::Measurement(_) => OutboxKind::Measurement,
            OutboxMutation::Snag(_) => OutboxKind::Snag,
            OutboxMutation::SnagStatus(_) => OutboxKind::SnagStatus,
            OutboxMutation::QuoteRequest(_) => OutboxKind::QuoteRequest,
            OutboxMutation::CustomerProject(_) => OutboxKind::CustomerProject,
            OutboxMutation::CustomerSnag(_) => OutboxKind::CustomerSnag,
        }
    }
}

fn parse<T: for<'de> Deserialize<'de>>(kind: OutboxKind, payload: &Value) -> Result<T> {
    T::deserialize(payload).map_err(|e| IngestError::Validation(format!("invalid {} payload: {}", kind, e)))
}

/// 测量数据可能是 JSON 值，也可能是编码成字符串的 JSON
fn parse_measurement_data(data: Value) -> Result<Value> {
    match data {
        Value::String(raw) => serde_json::from_str(&raw)
            .map_err(|e| IngestError::Validation(format!("measurement data is not valid JSON: {}", e))),
        Value::Null => Err(IngestError::Validation("measurement data is missing".to_string())),
        other => Ok(other),
    }
}
