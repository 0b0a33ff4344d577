//! # auth
//!
//! Guards the monitor with an `X-API-Key` header.
//!
//! * `MONITOR_API_KEY` unset → every request passes (dev mode).
//! * `MONITOR_API_KEY` set   → `X-API-Key: <key>` required.
//!
//! The health check is always open.

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use tracing::warn;

use crate::state::SharedState;

pub const HEALTH_PATH: &str = "/api/monitor/health";

pub async fn require_api_key(
    State(state): State<SharedState>,
    request: Request,
    next: Next,
) -> Response {
    let Some(expected) = state.api_key.as_deref() else {
        return next.run(request).await;
    };

    let path = request.uri().path().to_string();
    if path == HEALTH_PATH {
        return next.run(request).await;
    }

    let provided = request
        .headers()
        .get("X-API-Key")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("");

    if provided == expected {
        next.run(request).await
    } else {
        warn!(path = %path, "❌ Unauthorized request: invalid or missing X-API-Key");
        (
            StatusCode::UNAUTHORIZED,
            Json(serde_json::json!({
                "ok":    false,
                "error": "Unauthorized: invalid or missing X-API-Key header",
            })),
        )
            .into_response()
    }
}
