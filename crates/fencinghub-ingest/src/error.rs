//! 批量同步端点的错误类型与 JSON 错误响应

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use fencinghub_protocol::DataUrlError;

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// payload 缺字段、类型不对、未知条目类型
    #[error("{0}")]
    Validation(String),
    /// 照片 data URL 无法解码
    #[error("Invalid photo: {0}")]
    Decode(String),
    /// 对象存储写入失败
    #[error("Storage error: {0}")]
    Storage(String),
    #[error("Database error: {0}")]
    Database(String),
    /// 转发到单条目端点失败（包括对方返回的错误信息）
    #[error("{0}")]
    Forward(String),
    #[error("Unauthorized")]
    Unauthorized,
}

impl IngestError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            IngestError::Validation(_) | IngestError::Decode(_) => StatusCode::BAD_REQUEST,
            IngestError::Unauthorized => StatusCode::UNAUTHORIZED,
            IngestError::Forward(_) => StatusCode::BAD_GATEWAY,
            IngestError::Storage(_) | IngestError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<rusqlite::Error> for IngestError {
    fn from(error: rusqlite::Error) -> Self {
        IngestError::Database(error.to_string())
    }
}

impl From<serde_json::Error> for IngestError {
    fn from(error: serde_json::Error) -> Self {
        IngestError::Validation(error.to_string())
    }
}

impl From<std::io::Error> for IngestError {
    fn from(error: std::io::Error) -> Self {
        IngestError::Storage(error.to_string())
    }
}

impl From<reqwest::Error> for IngestError {
    fn from(error: reqwest::Error) -> Self {
        IngestError::Forward(error.to_string())
    }
}

impl From<DataUrlError> for IngestError {
    fn from(error: DataUrlError) -> Self {
        IngestError::Decode(error.to_string())
    }
}

impl IntoResponse for IngestError {
    fn into_response(self) -> Response {
        json_error(self.status_code(), &self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

/// `{"error": message}`
pub fn json_error(status: StatusCode, message: &str) -> impl IntoResponse {
    (status, axum::Json(json!({ "error": message })))
}

pub fn bad_request(message: &str) -> impl IntoResponse {
    json_error(StatusCode::BAD_REQUEST, message)
}

pub fn unauthorized() -> impl IntoResponse {
    json_error(StatusCode::UNAUTHORIZED, "Unauthorized")
}
