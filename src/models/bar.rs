//! # models::bar
//!
//! [`Bar`] is the fixed-interval record produced by the aggregator and kept in
//! the time-series store.  [`ReferenceBar`] is the single historical candle the
//! opening range is taken from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One completed interval: bucket start, last mid price, price-tick count.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub time:   DateTime<Utc>,
    pub close:  f64,
    pub volume: u64,
}

impl Bar {
    pub fn new(time: DateTime<Utc>, close: f64, volume: u64) -> Self {
        Self { time, close, volume }
    }
}

/// Completed historical candle returned by the market-data collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReferenceBar {
    pub time:  DateTime<Utc>,
    pub high:  f64,
    pub low:   f64,
    pub close: f64,
}

/// High / low thresholds of the breakout indicator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OpeningRange {
    pub high: f64,
    pub low:  f64,
}

impl From<&ReferenceBar> for OpeningRange {
    fn from(bar: &ReferenceBar) -> Self {
        Self { high: bar.high, low: bar.low }
    }
}
