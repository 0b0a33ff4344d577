//! # error
//!
//! Centralised error type for the whole bot.
//!
//! Startup failures (`InvalidGranularity`, `NoReferenceData`) and
//! `CapacityExceeded` abort the run.  Order submission failures are the only
//! recoverable broker errors: the orchestrator records them and keeps going.

use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum BotError {
    /// Granularity specifier did not parse (e.g. `"x"`, `"minutes0"`).
    #[error("Can't handle granularity: {0:?}")]
    InvalidGranularity(String),

    /// The historical query returned no complete bar for the reference time.
    #[error("No candle data available for {instrument} at {at}")]
    NoReferenceData {
        instrument: String,
        at:         DateTime<Utc>,
    },

    /// The bar store is full; refuse to write rather than overwrite.
    #[error("Time series capacity exceeded ({capacity} bars)")]
    CapacityExceeded { capacity: usize },

    #[error("Index {index} out of range for length {len}")]
    IndexOutOfRange { index: isize, len: usize },

    /// `unsubscribe` called with a handler that was never registered.
    #[error("Handler is not handling channel {channel:?}, so cannot unsubscribe it")]
    HandlerNotFound { channel: String },

    /// Market-data / REST call failed.
    #[error("Broker error: {0}")]
    Broker(String),

    /// Order submission failed or was rejected by the broker.
    #[error("Order rejected: {0}")]
    OrderRejected(String),

    /// Live tick feed transport failure.
    #[error("Tick feed error: {0}")]
    Feed(String),

    /// A shared component's mutex was poisoned by a panicking handler.
    #[error("Lock poisoned: {0}")]
    Lock(&'static str),

    /// Catch-all for unexpected failures.
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
