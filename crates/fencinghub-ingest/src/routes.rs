//! HTTP 路由

use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tower::ServiceBuilder;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use fencinghub_protocol::SYNC_BATCH_PATH;

use crate::error::{bad_request, unauthorized};
use crate::ingest::{BatchProcessor, Identity};

/// 上游鉴权层写入的用户 ID
pub const USER_ID_HEADER: &str = "x-user-id";

#[derive(Debug, Clone)]
pub struct AppState {
    pub processor: Arc<BatchProcessor>,
}

pub fn create_router(processor: Arc<BatchProcessor>, body_limit: usize) -> Router {
    Router::new()
        .route(SYNC_BATCH_PATH, post(handle_sync_batch))
        .route("/health", get(handle_health))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive())
                .layer(DefaultBodyLimit::max(body_limit)),
        )
        .with_state(AppState { processor })
}

fn identity_from_headers(headers: &HeaderMap) -> Option<Identity> {
    let user_id = headers
        .get(USER_ID_HEADER)?
        .to_str()
        .ok()
        .map(str::trim)
        .filter(|id| !id.is_empty())?;
    let mut identity = Identity::new(user_id);
    if let Some(cookie) = headers.get(axum::http::header::COOKIE).and_then(|v| v.to_str().ok()) {
        identity = identity.with_cookie(cookie);
    }
    Some(identity)
}

/// `POST /api/sync/batch`，body 为 `{ items: [...] }`
async fn handle_sync_batch(State(state): State<AppState>, headers: HeaderMap, body: axum::body::Bytes) -> Response {
    let Some(identity) = identity_from_headers(&headers) else {
        return unauthorized().into_response();
    };

    let mut body: Value = match serde_json::from_slice(&body) {
        Ok(body) => body,
        Err(e) => return bad_request(&format!("Invalid JSON body: {}", e)).into_response(),
    };
    let items = match body.get_mut("items").map(Value::take) {
        Some(Value::Array(items)) => items,
        None | Some(Value::Null) => Vec::new(),
        Some(_) => return bad_request("items must be an array").into_response(),
    };

    let response = state.processor.process(&identity, items).await;
    Json(response).into_response()
}

async fn handle_health() -> impl IntoResponse {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
