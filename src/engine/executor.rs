//! # engine::executor
//!
//! Turns a breakout into a bracket order and hands it to the gateway.
//!
//! `execute` never fails: a broker error is logged and comes back as a
//! `Failed` [`OrderRecord`] so the run can carry on.

use tracing::{error, info};

use crate::broker::OrderGateway;
use crate::config::RunSettings;
use crate::models::{Bar, Direction, OpeningRange, OrderDecision, OrderRecord};

// ─── Build Decision ───────────────────────────────────────────────────────────

/// Bracket order for a breakout confirmed by `bar`.  `None` for `Neutral`.
///
/// * units:       `+units` long, `-units` short
/// * stop-loss:   opposite side of the opening range
/// * take-profit: `entry × (1 + pct/100 × sign)` when configured
pub fn build_decision(
    settings: &RunSettings,
    range: OpeningRange,
    direction: Direction,
    bar: &Bar,
) -> Option<OrderDecision> {
    let sign = direction.sign();
    let stop_loss = match direction {
        Direction::Long => range.low,
        Direction::Short => range.high,
        Direction::Neutral => return None,
    };

    let entry_price = bar.close;
    let take_profit = settings
        .take_profit_pct
        .map(|pct| entry_price * (1.0 + pct / 100.0 * sign as f64));

    Some(OrderDecision {
        instrument: settings.instrument.clone(),
        direction,
        units: settings.units * sign,
        entry_price,
        stop_loss: Some(stop_loss),
        take_profit,
        decided_at: bar.time,
    })
}

// ─── Execute ──────────────────────────────────────────────────────────────────

pub async fn execute<G: OrderGateway>(gateway: &G, decision: OrderDecision) -> OrderRecord {
    info!(
        instrument  = %decision.instrument,
        direction   = %decision.direction,
        units       = decision.units,
        entry       = decision.entry_price,
        stop_loss   = ?decision.stop_loss,
        take_profit = ?decision.take_profit,
        "🚀 [EXECUTOR] Submitting breakout order"
    );

    match gateway.submit(&decision).await {
        Ok(receipt) => {
            info!(order_id = ?receipt.order_id, message = %receipt.message, "✅ [EXECUTOR] Order accepted");
            OrderRecord::accepted(decision, receipt)
        }
        Err(e) => {
            error!(error = %e, "❌ [EXECUTOR] Order failed, not retried");
            OrderRecord::failed(decision, e.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use crate::models::OrderStatus;
    use chrono::{TimeZone, Utc};

    const RANGE: OpeningRange = OpeningRange { high: 110.0, low: 100.0 };

    fn settings(take_profit_pct: Option<f64>) -> RunSettings {
        RunSettings {
            instrument:            "EUR_USD".into(),
            granularity:           "minutes1".parse().unwrap(),
            units:                 10,
            take_profit_pct,
            reference_time:        Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap(),
            reference_granularity: "M1".into(),
            capacity:              100,
            gap_policy:            Default::default(),
        }
    }

    fn bar(close: f64) -> Bar {
        Bar::new(Utc.with_ymd_and_hms(2024, 1, 2, 9, 31, 0).unwrap(), close, 1)
    }

    #[test]
    fn test_long_decision() {
        let d = build_decision(&settings(Some(0.5)), RANGE, Direction::Long, &bar(112.0)).unwrap();
        assert_eq!(d.units, 10);
        assert_eq!(d.stop_loss, Some(100.0));
        assert!((d.take_profit.unwrap() - 112.56).abs() < 1e-9);
        assert_eq!(d.entry_price, 112.0);
        assert_eq!(d.decided_at, bar(112.0).time);
    }

    #[test]
    fn test_short_decision() {
        let d = build_decision(&settings(Some(1.0)), RANGE, Direction::Short, &bar(95.0)).unwrap();
        assert_eq!(d.units, -10);
        assert_eq!(d.stop_loss, Some(110.0));
        assert!((d.take_profit.unwrap() - 94.05).abs() < 1e-9);
    }

    #[test]
    fn test_no_take_profit_and_neutral() {
        let d = build_decision(&settings(None), RANGE, Direction::Long, &bar(112.0)).unwrap();
        assert_eq!(d.take_profit, None);
        assert!(build_decision(&settings(None), RANGE, Direction::Neutral, &bar(105.0)).is_none());
    }

    #[tokio::test]
    async fn test_execute_records_outcome() {
        let d = build_decision(&settings(None), RANGE, Direction::Long, &bar(112.0)).unwrap();

        let ok = execute(&PaperBroker::new(None), d.clone()).await;
        assert_eq!(ok.status, OrderStatus::Accepted);
        assert_eq!(ok.broker_order_id.as_deref(), Some("PAPER-1"));

        let failed = execute(&PaperBroker::new(None).rejecting(), d).await;
        assert_eq!(failed.status, OrderStatus::Failed);
        assert!(failed.status_message.contains("rejects"));
    }
}
