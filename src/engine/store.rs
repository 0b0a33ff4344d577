//! # engine::store
//!
//! [`TimeSeriesStore`]: append-only, bounded storage of completed bars for one
//! instrument.
//!
//! ```text
//! append ──▶ capacity check ──▶ push ──▶ publish "on_append" ──▶ indicators
//!                 │
//!                 └─ full → CapacityExceeded (nothing written, nobody notified)
//! ```
//!
//! Indexing follows the usual sequence rules: `0..len` from the front,
//! negative indices from the back (`-1` = most recent bar).

use std::ops::Range;

use chrono::{DateTime, Utc};
use tracing::debug;

use crate::engine::event_bus::{EventBus, Handler, PublishReport};
use crate::engine::granularity::Granularity;
use crate::error::BotError;
use crate::models::Bar;

/// Channel fired after every successful append.
pub const ON_APPEND: &str = "on_append";

/// Bars kept per run unless configured otherwise.
pub const DEFAULT_CAPACITY: usize = 1000;

/// Payload of [`ON_APPEND`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarAppended {
    /// Position the bar was written at.
    pub index: usize,
    pub bar:   Bar,
}

// ─── Index helpers ────────────────────────────────────────────────────────────

/// Resolve a possibly negative index against `len`.
pub(crate) fn resolve_index(index: isize, len: usize) -> Result<usize, BotError> {
    resolve_bound(index, len)
        .filter(|&i| i < len)
        .ok_or(BotError::IndexOutOfRange { index, len })
}

/// Resolve a half-open `start..end` range; `end` may equal `len`.
pub(crate) fn resolve_range(start: isize, end: isize, len: usize) -> Result<Range<usize>, BotError> {
    let s = resolve_bound(start, len).ok_or(BotError::IndexOutOfRange { index: start, len })?;
    let e = resolve_bound(end, len).ok_or(BotError::IndexOutOfRange { index: end, len })?;
    if s > e {
        return Err(BotError::IndexOutOfRange { index: start, len });
    }
    Ok(s..e)
}

fn resolve_bound(index: isize, len: usize) -> Option<usize> {
    let resolved = if index < 0 {
        len.checked_sub(index.unsigned_abs())?
    } else {
        index as usize
    };
    (resolved <= len).then_some(resolved)
}

// ─── Store ────────────────────────────────────────────────────────────────────

pub struct TimeSeriesStore {
    instrument:  String,
    granularity: Granularity,
    capacity:    usize,
    bars:        Vec<Bar>,
    events:      EventBus<BarAppended>,
}

impl TimeSeriesStore {
    pub fn new(instrument: impl Into<String>, granularity: Granularity, capacity: usize) -> Self {
        Self {
            instrument: instrument.into(),
            granularity,
            capacity,
            bars: Vec::with_capacity(capacity),
            events: EventBus::new(),
        }
    }

    pub fn instrument(&self) -> &str {
        &self.instrument
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of bars written so far.
    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }

    pub fn last(&self) -> Option<&Bar> {
        self.bars.last()
    }

    /// Write a bar at position `len` and notify `on_append` handlers.
    pub fn append(
        &mut self,
        time: DateTime<Utc>,
        close: f64,
        volume: u64,
    ) -> Result<PublishReport, BotError> {
        self.append_bar(Bar::new(time, close, volume))
    }

    pub fn append_bar(&mut self, bar: Bar) -> Result<PublishReport, BotError> {
        if self.bars.len() >= self.capacity {
            return Err(BotError::CapacityExceeded { capacity: self.capacity });
        }

        let index = self.bars.len();
        self.bars.push(bar);
        debug!(
            instrument = %self.instrument,
            index,
            time = %bar.time,
            close = bar.close,
            volume = bar.volume,
            "Bar appended"
        );

        Ok(self.events.publish(ON_APPEND, &BarAppended { index, bar }))
    }

    pub fn get(&self, index: isize) -> Result<&Bar, BotError> {
        let i = resolve_index(index, self.bars.len())?;
        Ok(&self.bars[i])
    }

    pub fn slice(&self, start: isize, end: isize) -> Result<&[Bar], BotError> {
        let range = resolve_range(start, end, self.bars.len())?;
        Ok(&self.bars[range])
    }

    /// Register a handler on any channel of the store's bus.
    pub fn set_handler(&mut self, channel: &str, handler: Handler<BarAppended>) -> bool {
        self.events.subscribe(channel, handler)
    }

    pub fn on_append(&mut self, handler: Handler<BarAppended>) -> bool {
        self.set_handler(ON_APPEND, handler)
    }

    pub fn remove_handler(&mut self, channel: &str, handler: &Handler<BarAppended>) -> Result<(), BotError> {
        self.events.unsubscribe(channel, handler)
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
