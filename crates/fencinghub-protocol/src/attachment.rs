//! 照片附件与 data URL 编解码
//!
//! 发件箱统一采用 base64 data URL 表示二进制附件，直接内嵌在 payload 里，
//! 这样页面上下文和 worker 上下文读到的是同一种信封，不依赖跨上下文的 blob 引用。

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};

/// payload 中的单张照片
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhotoAttachment {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// `data:<mime>;base64,<data>`
    pub data_url: String,
}

impl PhotoAttachment {
    pub fn from_bytes(name: Option<String>, mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            name,
            data_url: encode_data_url(mime_type, bytes),
        }
    }

    pub fn decode(&self) -> Result<DecodedDataUrl, DataUrlError> {
        decode_data_url(&self.data_url)
    }
}

/// 解码后的 data URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedDataUrl {
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DataUrlError {
    #[error("not a data URL")]
    MissingScheme,
    #[error("data URL has no ',' separator")]
    MissingSeparator,
    #[error("data URL is not base64 encoded")]
    NotBase64,
    #[error("invalid base64 payload: {0}")]
    InvalidBase64(String),
}

/// 编码为自描述的 data URL（带 MIME 类型）
pub fn encode_data_url(mime_type: &str, bytes: &[u8]) -> String {
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    format!("data:{};base64,{}", mime_type, STANDARD.encode(bytes))
}

/// 解码 data URL，返回 MIME 类型与原始字节
pub fn decode_data_url(data_url: &str) -> Result<DecodedDataUrl, DataUrlError> {
    let rest = data_url
        .strip_prefix("data:")
        .ok_or(DataUrlError::MissingScheme)?;
    let (header, data) = rest.split_once(',').ok_or(DataUrlError::MissingSeparator)?;

    let mut params = header.split(';');
    let mime_type = params.next().unwrap_or_default().trim();
    if !params.any(|p| p.trim().eq_ignore_ascii_case("base64")) {
        return Err(DataUrlError::NotBase64);
    }

    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| DataUrlError::InvalidBase64(e.to_string()))?;

    Ok(DecodedDataUrl {
        mime_type: if mime_type.is_empty() {
            "application/octet-stream".to_string()
        } else {
            mime_type.to_string()
        },
        bytes,
    })
}
