//! # broker
//!
//! Collaborators the orchestrator talks to, behind two traits:
//!
//! * [`MarketData`]: historical candle lookup for the opening range.
//! * [`OrderGateway`]: bracket order submission.
//!
//! Tick feeds are plain streams ([`TickStream`]) so live, replayed and
//! in-memory sources are interchangeable.
//!
//! | Implementation | Market data | Orders | Ticks |
//! |----------------|-------------|--------|-------|
//! | [`OandaClient`] | v20 candles | v20 orders | v20 pricing stream |
//! | [`PaperBroker`] | fixed range from config | accepted locally | |
//! | [`ReplayFeed`]  | | | JSON-lines file |

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures_util::stream::BoxStream;
use tracing::warn;

use crate::error::BotError;
use crate::models::{OrderDecision, OrderReceipt, ReferenceBar, Tick};

pub mod oanda;
pub mod paper;
pub mod replay;

pub use oanda::OandaClient;
pub use paper::PaperBroker;
pub use replay::ReplayFeed;

/// In-order, non-restartable tick source.  An `Err` item ends the run.
pub type TickStream = BoxStream<'static, Result<Tick, BotError>>;

pub trait MarketData: Send + Sync {
    /// The completed candle opening at `at`, or `None` if the broker has none.
    fn reference_bar(
        &self,
        instrument: &str,
        at: DateTime<Utc>,
        granularity: &str,
    ) -> impl Future<Output = Result<Option<ReferenceBar>, BotError>> + Send;
}

pub trait OrderGateway: Send + Sync {
    /// Submit one market order with its brackets.  `Err` means the order was
    /// not placed.
    fn submit(
        &self,
        decision: &OrderDecision,
    ) -> impl Future<Output = Result<OrderReceipt, BotError>> + Send;
}

impl<T: OrderGateway> OrderGateway for Arc<T> {
    fn submit(
        &self,
        decision: &OrderDecision,
    ) -> impl Future<Output = Result<OrderReceipt, BotError>> + Send {
        (**self).submit(decision)
    }
}

/// Decode one feed line.  Blank and malformed lines are skipped (`None`);
/// malformed ones are logged.
pub(crate) fn decode_line(line: &str) -> Option<Tick> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match Tick::from_stream_line(line) {
        Ok(tick) => Some(tick),
        Err(e) => {
            warn!(error = %e, line, "Skipping malformed feed line");
            None
        }
    }
}
