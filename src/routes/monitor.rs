//! # routes::monitor
//!
//! Read-only view of the running bot.
//!
//! | Method    | Path                  | Description                               |
//! |-----------|-----------------------|-------------------------------------------|
//! | GET       | `/api/monitor/health` | Liveness probe                            |
//! | GET       | `/api/monitor/status` | Range, directions, latch, order, counters |
//! | GET (WS)  | `/ws/monitor`         | Snapshot, then every `BotEvent` as JSON   |

use std::sync::atomic::Ordering;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        State,
    },
    response::IntoResponse,
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info};

use crate::state::SharedState;

// ─── WebSocket ────────────────────────────────────────────────────────────────

pub async fn ws_monitor(
    ws: WebSocketUpgrade,
    State(state): State<SharedState>,
) -> impl IntoResponse {
    ws.on_upgrade(|socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: SharedState) {
    let mut rx = state.broadcast_tx.subscribe();
    let (mut sender, mut receiver) = socket.split();

    info!("🔌 WebSocket client connected");

    let snapshot = json!({
        "event":      "SNAPSHOT",
        "status":     state.snapshot(),
        "tick_count": state.tick_count.load(Ordering::Relaxed),
    })
    .to_string();

    if sender.send(Message::Text(snapshot)).await.is_err() {
        return;
    }

    loop {
        tokio::select! {
            result = rx.recv() => {
                match result {
                    Ok(json_str) => {
                        if sender.send(Message::Text(json_str)).await.is_err() {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(n)) => {
                        debug!("WS client lagged, skipped {n} events");
                    }
                    Err(RecvError::Closed) => break,
                }
            }

            result = receiver.next() => {
                match result {
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(Message::Ping(data))) => {
                        let _ = sender.send(Message::Pong(data)).await;
                    }
                    _ => {}
                }
            }
        }
    }

    info!("🔌 WebSocket client disconnected");
}

// ─── REST ─────────────────────────────────────────────────────────────────────

/// GET /api/monitor/health
pub async fn health() -> impl IntoResponse {
    Json(json!({ "ok": true, "status": "alive" }))
}

/// GET /api/monitor/status
pub async fn get_status(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({
        "ok":         true,
        "status":     state.snapshot(),
        "tick_count": state.tick_count.load(Ordering::Relaxed),
    }))
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::events::{BotEvent, RunObserver};
    use crate::models::{Direction, OpeningRange};
    use crate::routes::monitor_router;
    use crate::state::build_state;

    async fn get(state: crate::state::SharedState, uri: &str, key: Option<&str>) -> (StatusCode, Value) {
        let mut request = Request::builder().uri(uri);
        if let Some(key) = key {
            request = request.header("X-API-Key", key);
        }
        let response = monitor_router(state)
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_health_is_open() {
        let (status, body) = get(build_state(Some("k".into())), "/api/monitor/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ok"], true);
    }

    #[tokio::test]
    async fn test_status_reflects_run() {
        let state = build_state(None);
        state.notify(&BotEvent::RunStarted {
            instrument:    "EUR_USD".into(),
            granularity:   "minutes1".into(),
            opening_range: OpeningRange { high: 110.0, low: 100.0 },
            reference_at:  chrono::Utc::now(),
        });
        state.notify(&BotEvent::DirectionChanged {
            from: Direction::Neutral,
            to:   Direction::Short,
            at:   chrono::Utc::now(),
        });
        state.on_tick();

        let (status, body) = get(state, "/api/monitor/status", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"]["instrument"], "EUR_USD");
        assert_eq!(body["status"]["opening_range"]["high"], 110.0);
        assert_eq!(body["status"]["current_direction"], "SHORT");
        assert_eq!(body["status"]["order_issued"], false);
        assert_eq!(body["tick_count"], 1);
    }

    #[tokio::test]
    async fn test_api_key_required_when_configured() {
        let state = build_state(Some("secret".into()));

        let (status, body) = get(state.clone(), "/api/monitor/status", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["ok"], false);

        let (status, _) = get(state.clone(), "/api/monitor/status", Some("wrong")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = get(state, "/api/monitor/status", Some("secret")).await;
        assert_eq!(status, StatusCode::OK);
    }
}
