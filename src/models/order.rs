//! # models::order
//!
//! Defines the single bracket-order decision a run can produce and the record
//! kept after it was handed to the broker.
//!
//! `OrderDecision` = what the orchestrator decided (signed units + brackets)
//! `OrderRecord`   = what happened when it was submitted, never deleted

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::Direction;

// ─── OrderDecision ────────────────────────────────────────────────────────────

/// A market order with stop-loss and optional take-profit attached on fill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderDecision {
    pub instrument:  String,
    pub direction:   Direction,
    /// `+units` for Long, `-units` for Short.
    pub units:       i64,
    /// Close of the bar that produced the breakout.
    pub entry_price: f64,
    pub stop_loss:   Option<f64>,
    pub take_profit: Option<f64>,
    /// Time of the bar that produced the breakout.
    pub decided_at:  DateTime<Utc>,
}

// ─── OrderStatus ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    /// Broker accepted the order.
    Accepted,
    /// Rejected by the broker or never reached it.  Not retried.
    Failed,
}

/// Successful broker answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderReceipt {
    /// Broker-side order / transaction id, when the broker returns one.
    pub order_id: Option<String>,
    pub message:  String,
}

// ─── OrderRecord ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRecord {
    pub record_id:       Uuid,
    pub decision:        OrderDecision,
    pub status:          OrderStatus,
    pub broker_order_id: Option<String>,
    /// Broker message or error text.
    pub status_message:  String,
    pub submitted_at:    DateTime<Utc>,
}

impl OrderRecord {
    pub fn accepted(decision: OrderDecision, receipt: OrderReceipt) -> Self {
        Self {
            record_id:       Uuid::new_v4(),
            decision,
            status:          OrderStatus::Accepted,
            broker_order_id: receipt.order_id,
            status_message:  receipt.message,
            submitted_at:    Utc::now(),
        }
    }

    pub fn failed(decision: OrderDecision, reason: String) -> Self {
        Self {
            record_id:       Uuid::new_v4(),
            decision,
            status:          OrderStatus::Failed,
            broker_order_id: None,
            status_message:  reason,
            submitted_at:    Utc::now(),
        }
    }
}
