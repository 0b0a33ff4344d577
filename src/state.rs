//! # state
//!
//! Shared monitor state.  The orchestrator writes to it through the
//! [`RunObserver`] implementation; the Axum handlers only read.
//!
//! * `status` is a `watch` channel: the latest [`RunStatus`] snapshot, readable
//!   without blocking the tick loop.
//! * `broadcast_tx` fans pre-serialized [`BotEvent`] JSON out to every
//!   WebSocket client.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, watch};

use crate::events::{BotEvent, RunObserver};
use crate::models::{Bar, Direction, OpeningRange, OrderRecord};

/// Events buffered per WebSocket client before it starts lagging.
const BROADCAST_CAPACITY: usize = 256;

// ─── Run Status ───────────────────────────────────────────────────────────────

/// Snapshot served by `GET /api/monitor/status`.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RunStatus {
    pub instrument:         Option<String>,
    pub granularity:        Option<String>,
    pub opening_range:      Option<OpeningRange>,
    pub previous_direction: Direction,
    pub current_direction:  Direction,
    pub order_issued:       bool,
    pub order:              Option<OrderRecord>,
    pub last_bar:           Option<Bar>,
    pub bars_closed:        u64,
    pub started_at:         Option<DateTime<Utc>>,
    /// Why the tick loop ended; `None` while running.
    pub stopped:            Option<String>,
}

impl RunStatus {
    fn apply(&mut self, event: &BotEvent) {
        match event {
            BotEvent::RunStarted { instrument, granularity, opening_range, .. } => {
                self.instrument = Some(instrument.clone());
                self.granularity = Some(granularity.clone());
                self.opening_range = Some(*opening_range);
                self.started_at = Some(Utc::now());
            }
            BotEvent::BarClosed { index, bar } => {
                self.last_bar = Some(*bar);
                self.bars_closed = *index as u64 + 1;
            }
            BotEvent::DirectionChanged { from, to, .. } => {
                self.previous_direction = *from;
                self.current_direction = *to;
            }
            BotEvent::OrderSubmitted { record } | BotEvent::OrderFailed { record } => {
                self.order_issued = true;
                self.order = Some(record.as_ref().clone());
            }
            BotEvent::HandlerFailed { .. } => {}
            BotEvent::RunStopped { reason } => {
                self.stopped = Some(reason.clone());
            }
        }
    }
}

// ─── AppState ─────────────────────────────────────────────────────────────────

pub struct AppState {
    pub status:       watch::Sender<RunStatus>,
    pub broadcast_tx: broadcast::Sender<String>,
    pub tick_count:   AtomicU64,
    /// `X-API-Key` the monitor requires; `None` = open (dev mode).
    pub api_key:      Option<String>,
}

impl AppState {
    pub fn new(api_key: Option<String>) -> Self {
        let (broadcast_tx, _) = broadcast::channel(BROADCAST_CAPACITY);
        let (status, _) = watch::channel(RunStatus::default());

        Self {
            status,
            broadcast_tx,
            tick_count: AtomicU64::new(0),
            api_key,
        }
    }

    pub fn snapshot(&self) -> RunStatus {
        self.status.borrow().clone()
    }

    /// No receivers is fine (headless run).
    pub fn broadcast(&self, event: &BotEvent) {
        let _ = self.broadcast_tx.send(event.to_json());
    }
}

impl RunObserver for AppState {
    fn on_tick(&self) {
        self.tick_count.fetch_add(1, Ordering::Relaxed);
    }

    fn notify(&self, event: &BotEvent) {
        self.status.send_modify(|status| status.apply(event));
        self.broadcast(event);
    }
}

pub type SharedState = Arc<AppState>;

pub fn build_state(api_key: Option<String>) -> SharedState {
    Arc::new(AppState::new(api_key))
}
