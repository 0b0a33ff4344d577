//! # broker::paper
//!
//! Offline stand-in for the broker: serves a fixed opening range and accepts
//! every order locally without sending anything anywhere.

use std::sync::Mutex;

use chrono::{DateTime, Utc};
use tracing::info;

use crate::broker::{MarketData, OrderGateway};
use crate::error::BotError;
use crate::models::{OpeningRange, OrderDecision, OrderReceipt, ReferenceBar};

#[derive(Debug, Default)]
pub struct PaperBroker {
    range:     Option<OpeningRange>,
    reject:    bool,
    submitted: Mutex<Vec<OrderDecision>>,
}

impl PaperBroker {
    pub fn new(range: Option<OpeningRange>) -> Self {
        Self { range, ..Self::default() }
    }

    /// Refuse every order (exercises the failure path).
    #[cfg(test)]
    pub fn rejecting(mut self) -> Self {
        self.reject = true;
        self
    }

    /// Orders accepted so far.
    pub fn submitted(&self) -> Result<Vec<OrderDecision>, BotError> {
        Ok(self.submitted.lock().map_err(|_| BotError::Lock("paper orders"))?.clone())
    }
}

impl MarketData for PaperBroker {
    async fn reference_bar(
        &self,
        instrument: &str,
        at: DateTime<Utc>,
        granularity: &str,
    ) -> Result<Option<ReferenceBar>, BotError> {
        let bar = self.range.map(|r| ReferenceBar {
            time:  at,
            high:  r.high,
            low:   r.low,
            close: (r.high + r.low) / 2.0,
        });
        info!(instrument, %at, granularity, ?bar, "🎭 [PAPER] Serving configured opening range");
        Ok(bar)
    }
}

impl OrderGateway for PaperBroker {
    async fn submit(&self, decision: &OrderDecision) -> Result<OrderReceipt, BotError> {
        if self.reject {
            return Err(BotError::OrderRejected("paper broker rejects all orders".into()));
        }

        let mut orders = self.submitted.lock().map_err(|_| BotError::Lock("paper orders"))?;
        orders.push(decision.clone());
        let order_id = format!("PAPER-{}", orders.len());

        info!(
            order_id   = %order_id,
            instrument = %decision.instrument,
            units      = decision.units,
            stop_loss  = ?decision.stop_loss,
            take_profit = ?decision.take_profit,
            "🎭 [PAPER] Order accepted (not sent)"
        );

        Ok(OrderReceipt { order_id: Some(order_id), message: "accepted by paper broker".into() })
    }
}
