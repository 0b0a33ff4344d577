//! # engine::indicator
//!
//! Indicators derive one value per stored bar.  They are driven by the
//! store's `on_append` channel: [`attach`] subscribes an indicator's
//! [`Indicator::recompute`] so every successful append is followed by exactly
//! one recompute, on the same call stack.
//!
//! ## BreakoutIndicator
//!
//! ```text
//!            close > high              close < low
//!   NEUTRAL ─────────────▶ LONG   NEUTRAL ────────────▶ SHORT
//!                 LONG ◀──────────────────────▶ SHORT
//! ```
//!
//! Strict inequalities on both sides; a close inside the range (or exactly on
//! a boundary) leaves the state untouched.  Nothing leads back to `NEUTRAL`.

use std::sync::{Arc, Mutex};

use tracing::debug;

use crate::engine::event_bus::{handler, Handler};
use crate::engine::store::{resolve_index, resolve_range, BarAppended, TimeSeriesStore};
use crate::error::BotError;
use crate::models::{Direction, OpeningRange};

// ─── Indicator Values ─────────────────────────────────────────────────────────

/// Append-only array of derived values, parallel to the store it follows.
#[derive(Debug, Clone)]
pub struct IndicatorValues<T> {
    capacity: usize,
    slots:    Vec<T>,
}

impl<T> IndicatorValues<T> {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, slots: Vec::with_capacity(capacity) }
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Store the value for bar `index`; must be the next free slot.
    pub fn record(&mut self, index: usize, value: T) -> Result<(), BotError> {
        if self.slots.len() >= self.capacity {
            return Err(BotError::CapacityExceeded { capacity: self.capacity });
        }
        if index != self.slots.len() {
            return Err(BotError::IndexOutOfRange {
                index: index as isize,
                len:   self.slots.len(),
            });
        }
        self.slots.push(value);
        Ok(())
    }

    pub fn get(&self, index: isize) -> Result<&T, BotError> {
        let i = resolve_index(index, self.slots.len())?;
        Ok(&self.slots[i])
    }

    pub fn slice(&self, start: isize, end: isize) -> Result<&[T], BotError> {
        let range = resolve_range(start, end, self.slots.len())?;
        Ok(&self.slots[range])
    }
}

// ─── Indicator Trait ──────────────────────────────────────────────────────────

pub trait Indicator: Send {
    type Value;

    fn name(&self) -> &str;

    /// Update internal state from the bar that was just appended.
    fn recompute(&mut self, event: &BarAppended) -> Result<(), BotError>;

    fn values(&self) -> &IndicatorValues<Self::Value>;

    fn len(&self) -> usize {
        self.values().len()
    }

    fn get(&self, index: isize) -> Result<&Self::Value, BotError> {
        self.values().get(index)
    }
}

/// Subscribe `indicator` to the store's append notifications.
///
/// The returned handle can be passed to [`TimeSeriesStore::remove_handler`].
pub fn attach<I>(store: &mut TimeSeriesStore, indicator: &Arc<Mutex<I>>) -> Handler<BarAppended>
where
    I: Indicator + 'static,
{
    let shared = Arc::clone(indicator);
    let recompute = handler(move |event: &BarAppended| {
        let mut guard = shared.lock().map_err(|_| BotError::Lock("indicator"))?;
        guard.recompute(event)?;
        Ok(())
    });
    store.on_append(Arc::clone(&recompute));
    recompute
}

// ─── Breakout Indicator ───────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct BreakoutIndicator {
    range:     OpeningRange,
    direction: Direction,
    values:    IndicatorValues<Direction>,
}

impl BreakoutIndicator {
    pub fn new(range: OpeningRange, capacity: usize) -> Self {
        Self {
            range,
            direction: Direction::Neutral,
            values: IndicatorValues::new(capacity),
        }
    }

    pub fn range(&self) -> OpeningRange {
        self.range
    }

    /// Current breakout state.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    fn transition(&self, close: f64) -> Direction {
        if close > self.range.high {
            Direction::Long
        } else if close < self.range.low {
            Direction::Short
        } else {
            self.direction
        }
    }
}

impl Indicator for BreakoutIndicator {
    type Value = Direction;

    fn name(&self) -> &str {
        "ORB"
    }

    fn recompute(&mut self, event: &BarAppended) -> Result<(), BotError> {
        let next = self.transition(event.bar.close);
        self.values.record(event.index, next)?;
        self.direction = next;

        debug!(
            indicator = self.name(),
            index = event.index,
            close = event.bar.close,
            high = self.range.high,
            low = self.range.low,
            state = %self.direction,
            "processed bar"
        );
        Ok(())
    }

    fn values(&self) -> &IndicatorValues<Direction> {
        &self.values
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Bar;
    use chrono::{Duration, TimeZone, Utc};

    const RANGE: OpeningRange = OpeningRange { high: 110.0, low: 100.0 };

    fn appended(index: usize, close: f64) -> BarAppended {
        let time = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap() + Duration::minutes(index as i64);
        BarAppended { index, bar: Bar::new(time, close, 1) }
    }

    fn run(closes: &[f64]) -> BreakoutIndicator {
        let mut ind = BreakoutIndicator::new(RANGE, 100);
        for (i, &c) in closes.iter().enumerate() {
            ind.recompute(&appended(i, c)).unwrap();
        }
        ind
    }

    #[test]
    fn test_starts_neutral() {
        let ind = BreakoutIndicator::new(RANGE, 10);
        assert_eq!(ind.direction(), Direction::Neutral);
        assert_eq!(ind.len(), 0);
    }

    #[test]
    fn test_boundaries_are_strict() {
        assert_eq!(run(&[110.0]).direction(), Direction::Neutral);
        assert_eq!(run(&[100.0]).direction(), Direction::Neutral);
        assert_eq!(run(&[110.0001]).direction(), Direction::Long);
        assert_eq!(run(&[99.9999]).direction(), Direction::Short);
    }

    #[test]
    fn test_state_is_sticky_and_flips_without_hysteresis() {
        let ind = run(&[105.0, 111.0, 105.0, 99.0, 110.0, 120.0]);
        let history: Vec<Direction> = ind.values().slice(0, 6).unwrap().to_vec();
        assert_eq!(
            history,
            vec![
                Direction::Neutral,
                Direction::Long,
                Direction::Long,
                Direction::Short,
                Direction::Short,
                Direction::Long,
            ]
        );
        assert_eq!(*ind.get(-1).unwrap(), Direction::Long);
    }

    #[test]
    fn test_values_follow_store_indexing() {
        let mut ind = BreakoutIndicator::new(RANGE, 2);
        assert!(matches!(ind.recompute(&appended(1, 105.0)), Err(BotError::IndexOutOfRange { .. })));

        ind.recompute(&appended(0, 105.0)).unwrap();
        ind.recompute(&appended(1, 115.0)).unwrap();
        assert!(matches!(ind.recompute(&appended(2, 95.0)), Err(BotError::CapacityExceeded { capacity: 2 })));
        // rejected recompute leaves the state alone
        assert_eq!(ind.direction(), Direction::Long);
        assert!(ind.get(2).is_err());
    }

    #[test]
    fn test_attach_recomputes_on_append() {
        let mut store = TimeSeriesStore::new("EUR_USD", "minutes1".parse().unwrap(), 10);
        let ind = Arc::new(Mutex::new(BreakoutIndicator::new(RANGE, 10)));
        let h = attach(&mut store, &ind);

        let t = Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap();
        store.append(t, 105.0, 4).unwrap();
        assert_eq!(ind.lock().unwrap().direction(), Direction::Neutral);

        let report = store.append(t + Duration::minutes(1), 112.0, 1).unwrap();
        assert!(report.is_clean());
        assert_eq!(ind.lock().unwrap().direction(), Direction::Long);
        assert_eq!(ind.lock().unwrap().len(), store.len());

        store.remove_handler(crate::engine::store::ON_APPEND, &h).unwrap();
        store.append(t + Duration::minutes(2), 90.0, 1).unwrap();
        assert_eq!(ind.lock().unwrap().direction(), Direction::Long);
    }
}
