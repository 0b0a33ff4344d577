//! # events
//!
//! [`BotEvent`] is everything a run reports to the outside: the monitor's
//! WebSocket clients receive each one as a JSON text frame.
//!
//! The orchestrator never depends on the monitor directly; it reports to an
//! injected [`RunObserver`].

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::models::{Bar, Direction, OpeningRange, OrderRecord};

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BotEvent {
    /// Opening range resolved; the run is consuming ticks.
    RunStarted {
        instrument:    String,
        granularity:   String,
        opening_range: OpeningRange,
        reference_at:  DateTime<Utc>,
    },

    /// A bar was appended to the store.
    BarClosed {
        index: usize,
        bar:   Bar,
    },

    /// Breakout state left its previous value.
    DirectionChanged {
        from: Direction,
        to:   Direction,
        at:   DateTime<Utc>,
    },

    /// The run's single order was accepted by the broker.
    OrderSubmitted {
        record: Box<OrderRecord>,
    },

    /// The run's single order failed; no retry will follow.
    OrderFailed {
        record: Box<OrderRecord>,
    },

    /// A store subscriber failed while handling a bar.
    HandlerFailed {
        channel: String,
        error:   String,
    },

    /// The tick loop ended (feed exhausted or fatal error).
    RunStopped {
        reason: String,
    },
}

impl BotEvent {
    #[inline]
    pub fn to_json(&self) -> String {
        serde_json::to_string(self)
            .unwrap_or_else(|_| r#"{"event":"SERIALIZATION_ERROR"}"#.to_string())
    }
}

/// Receives run telemetry.  Implementations must not block.
pub trait RunObserver: Send + Sync {
    /// Called for every tick pulled from the feed.
    fn on_tick(&self) {}

    fn notify(&self, event: &BotEvent);
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::Value;

    #[test]
    fn test_events_are_tagged() {
        let at = Utc.with_ymd_and_hms(2024, 1, 2, 9, 32, 0).unwrap();
        let json: Value = serde_json::from_str(
            &BotEvent::DirectionChanged { from: Direction::Neutral, to: Direction::Long, at }.to_json(),
        )
        .unwrap();

        assert_eq!(json["event"], "DIRECTION_CHANGED");
        assert_eq!(json["from"], "NEUTRAL");
        assert_eq!(json["to"], "LONG");

        let json: Value = serde_json::from_str(
            &BotEvent::BarClosed { index: 3, bar: Bar::new(at, 112.0, 1) }.to_json(),
        )
        .unwrap();
        assert_eq!(json["event"], "BAR_CLOSED");
        assert_eq!(json["bar"]["close"], 112.0);
        assert_eq!(json["bar"]["volume"], 1);
    }
}
