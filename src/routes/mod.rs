//! HTTP surface of the bot: a read-only monitor.

pub mod monitor;

use axum::{middleware, routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

use crate::auth::{require_api_key, HEALTH_PATH};
use crate::state::SharedState;

/// | Method   | Path                  | Auth |
/// |----------|-----------------------|------|
/// | GET      | `/api/monitor/health` | no   |
/// | GET      | `/api/monitor/status` | key  |
/// | GET (WS) | `/ws/monitor`         | key  |
pub fn monitor_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route(HEALTH_PATH,           get(monitor::health))
        .route("/api/monitor/status", get(monitor::get_status))
        .route("/ws/monitor",         get(monitor::ws_monitor))
        .layer(middleware::from_fn_with_state(state.clone(), require_api_key))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
