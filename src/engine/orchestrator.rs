//! # engine::orchestrator
//!
//! Drives one Opening Range Breakout run.
//!
//! ```text
//!  startup:  MarketData::reference_bar ──▶ OpeningRange ──▶ store + indicator (attached)
//!
//!  per tick: aggregator ──bar?──▶ store.append ──on_append──▶ indicator.recompute
//!                                      │
//!                                      └──▶ check_state_change ──first breakout──▶ executor
//! ```
//!
//! Each tick is processed to completion before the next one is pulled from
//! the feed.  At most one order is submitted per run; the latch is consumed
//! even when the submission fails.

use std::sync::{Arc, Mutex};

use futures_util::StreamExt;
use tracing::{debug, error, info, warn};

use crate::broker::{MarketData, OrderGateway, TickStream};
use crate::config::RunSettings;
use crate::engine::aggregator::{GapPolicy, TickAggregator};
use crate::engine::executor::{build_decision, execute};
use crate::engine::indicator::{attach, BreakoutIndicator};
use crate::engine::store::TimeSeriesStore;
use crate::error::BotError;
use crate::events::{BotEvent, RunObserver};
use crate::models::{Bar, Direction, OpeningRange, OrderRecord, OrderStatus, Tick};

/// What a finished run looked like.
#[derive(Debug, Clone)]
pub struct RunSummary {
    pub ticks:           u64,
    pub bars:            usize,
    pub final_direction: Direction,
    pub order:           Option<OrderRecord>,
}

pub struct Orchestrator<G> {
    settings:     RunSettings,
    range:        OpeningRange,
    aggregator:   TickAggregator,
    store:        TimeSeriesStore,
    indicator:    Arc<Mutex<BreakoutIndicator>>,
    gateway:      G,
    observer:     Arc<dyn RunObserver>,
    previous:     Direction,
    order_issued: bool,
    order:        Option<OrderRecord>,
    ticks:        u64,
}

impl<G: OrderGateway> Orchestrator<G> {
    /// Resolve the opening range and wire store → indicator.
    pub async fn start<M: MarketData>(
        settings: RunSettings,
        market: &M,
        gateway: G,
        observer: Arc<dyn RunObserver>,
    ) -> Result<Self, BotError> {
        let reference = market
            .reference_bar(&settings.instrument, settings.reference_time, &settings.reference_granularity)
            .await?
            .ok_or_else(|| {
                error!(
                    instrument = %settings.instrument,
                    at = %settings.reference_time,
                    "No candle data available for specified date"
                );
                BotError::NoReferenceData {
                    instrument: settings.instrument.clone(),
                    at:         settings.reference_time,
                }
            })?;

        let range = OpeningRange::from(&reference);
        info!(
            instrument = %settings.instrument,
            candle = %reference.time,
            high = range.high,
            low = range.low,
            "📐 Opening range resolved"
        );

        let mut store = TimeSeriesStore::new(
            settings.instrument.clone(),
            settings.granularity,
            settings.capacity,
        );
        let indicator = Arc::new(Mutex::new(BreakoutIndicator::new(range, settings.capacity)));
        attach(&mut store, &indicator);

        observer.notify(&BotEvent::RunStarted {
            instrument:    settings.instrument.clone(),
            granularity:   settings.granularity.to_string(),
            opening_range: range,
            reference_at:  settings.reference_time,
        });

        Ok(Self {
            aggregator: TickAggregator::new(settings.granularity),
            settings,
            range,
            store,
            indicator,
            gateway,
            observer,
            previous: Direction::Neutral,
            order_issued: false,
            order: None,
            ticks: 0,
        })
    }

    pub fn store(&self) -> &TimeSeriesStore {
        &self.store
    }

    pub fn order_issued(&self) -> bool {
        self.order_issued
    }

    /// Current indicator state.
    pub fn direction(&self) -> Result<Direction, BotError> {
        let indicator = self.indicator.lock().map_err(|_| BotError::Lock("indicator"))?;
        Ok(indicator.direction())
    }

    // ─── Tick Loop ────────────────────────────────────────────────────────────

    /// Consume `feed` until it ends or a fatal error occurs.
    pub async fn run(mut self, mut feed: TickStream) -> Result<RunSummary, BotError> {
        info!(
            instrument = %self.store.instrument(),
            granularity = %self.store.granularity(),
            capacity = self.store.capacity(),
            "▶️  Run started"
        );

        let outcome = async {
            while let Some(item) = feed.next().await {
                let tick = item?;
                self.process_tick(&tick).await?;
            }
            Ok::<(), BotError>(())
        }
        .await;

        let reason = match &outcome {
            Ok(()) => "tick feed ended".to_string(),
            Err(e) => e.to_string(),
        };
        match &outcome {
            Ok(()) => info!(ticks = self.ticks, bars = self.store.len(), "⏹️  {reason}"),
            Err(e) => error!(error = %e, ticks = self.ticks, bars = self.store.len(), "⏹️  Run aborted"),
        }
        self.observer.notify(&BotEvent::RunStopped { reason });

        outcome?;
        Ok(RunSummary {
            ticks:           self.ticks,
            bars:            self.store.len(),
            final_direction: self.direction()?,
            order:           self.order,
        })
    }

    /// Aggregate one tick, append any completed bar, then check for a breakout.
    pub async fn process_tick(&mut self, tick: &Tick) -> Result<(), BotError> {
        self.ticks += 1;
        self.observer.on_tick();

        let bars = match self.settings.gap_policy {
            GapPolicy::SingleStep => self.aggregator.ingest(tick).into_iter().collect(),
            GapPolicy::CatchUp => self.aggregator.ingest_catching_up(tick),
        };
        for bar in bars {
            self.append(bar)?;
        }

        self.check_state_change().await
    }

    fn append(&mut self, bar: Bar) -> Result<(), BotError> {
        let report = self.store.append_bar(bar)?;
        for failure in &report.failures {
            warn!(channel = %report.channel, position = failure.position, "Bar subscriber failed");
            self.observer.notify(&BotEvent::HandlerFailed {
                channel: report.channel.clone(),
                error:   failure.error.clone(),
            });
        }

        self.observer.notify(&BotEvent::BarClosed { index: self.store.len() - 1, bar });
        Ok(())
    }

    /// Compare the indicator against the last seen state; the first move out
    /// of the range triggers the run's only order.
    pub async fn check_state_change(&mut self) -> Result<(), BotError> {
        let current = self.direction()?;
        let previous = std::mem::replace(&mut self.previous, current);

        if current == previous || current == Direction::Neutral {
            return Ok(());
        }

        let bar = *self.store.get(-1)?;
        info!(from = %previous, to = %current, close = bar.close, "state change: from {previous} to {current}");
        self.observer.notify(&BotEvent::DirectionChanged { from: previous, to: current, at: bar.time });

        if self.order_issued {
            debug!(direction = %current, "Order already issued this run, no new order");
            return Ok(());
        }

        let Some(decision) = build_decision(&self.settings, self.range, current, &bar) else {
            return Ok(());
        };
        let record = execute(&self.gateway, decision).await;
        self.order_issued = true;

        let event = match record.status {
            OrderStatus::Accepted => BotEvent::OrderSubmitted { record: Box::new(record.clone()) },
            OrderStatus::Failed => BotEvent::OrderFailed { record: Box::new(record.clone()) },
        };
        self.observer.notify(&event);
        self.order = Some(record);
        Ok(())
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::PaperBroker;
    use chrono::{DateTime, Duration, TimeZone, Utc};
    use futures_util::stream;

    const RANGE: OpeningRange = OpeningRange { high: 110.0, low: 100.0 };

    #[derive(Default)]
    struct Recorder {
        events: Mutex<Vec<BotEvent>>,
    }

    impl Recorder {
        fn events(&self) -> Vec<BotEvent> {
            self.events.lock().unwrap().clone()
        }

        fn count(&self, pred: impl Fn(&BotEvent) -> bool) -> usize {
            self.events().iter().filter(|e| pred(*e)).count()
        }
    }

    impl RunObserver for Recorder {
        fn notify(&self, event: &BotEvent) {
            self.events.lock().unwrap().push(event.clone());
        }
    }

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
    }

    fn px(secs: i64, price: f64) -> Tick {
        Tick::price(t0() + Duration::seconds(secs), price, price)
    }

    fn settings() -> RunSettings {
        RunSettings {
            instrument:            "EUR_USD".into(),
            granularity:           "minutes1".parse().unwrap(),
            units:                 10,
            take_profit_pct:       Some(0.5),
            reference_time:        Utc.with_ymd_and_hms(2024, 1, 2, 9, 15, 0).unwrap(),
            reference_granularity: "M1".into(),
            capacity:              100,
            gap_policy:            GapPolicy::SingleStep,
        }
    }

    fn feed(ticks: Vec<Tick>) -> TickStream {
        stream::iter(ticks.into_iter().map(Ok)).boxed()
    }

    /// One price tick per minute, at `:05`.
    fn minute_closes(closes: &[f64]) -> Vec<Tick> {
        closes.iter().enumerate().map(|(i, &c)| px(i as i64 * 60 + 5, c)).collect()
    }

    async fn start_with(
        settings: RunSettings,
        broker: &Arc<PaperBroker>,
        recorder: &Arc<Recorder>,
    ) -> Orchestrator<Arc<PaperBroker>> {
        let observer: Arc<dyn RunObserver> = recorder.clone();
        Orchestrator::start(settings, broker.as_ref(), Arc::clone(broker), observer)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_long_breakout_scenario() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let mut orb = start_with(settings(), &broker, &recorder).await;

        for s in [0, 10, 20, 30] {
            orb.process_tick(&px(s, 105.0)).await.unwrap();
        }
        assert!(orb.store().is_empty());

        orb.process_tick(&px(61, 112.0)).await.unwrap();
        assert_eq!(*orb.store().get(-1).unwrap(), Bar::new(t0(), 105.0, 4));
        assert_eq!(orb.direction().unwrap(), Direction::Neutral);
        assert!(!orb.order_issued());

        orb.process_tick(&px(125, 113.0)).await.unwrap();
        assert_eq!(*orb.store().get(-1).unwrap(), Bar::new(t0() + Duration::seconds(60), 112.0, 1));
        assert_eq!(orb.direction().unwrap(), Direction::Long);
        assert!(orb.order_issued());

        let orders = broker.submitted().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, 10);
        assert_eq!(orders[0].stop_loss, Some(100.0));
        assert!((orders[0].take_profit.unwrap() - 112.56).abs() < 1e-9);

        assert_eq!(recorder.count(|e| matches!(e, BotEvent::RunStarted { .. })), 1);
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::BarClosed { .. })), 2);
        assert_eq!(
            recorder.count(|e| matches!(
                e,
                BotEvent::DirectionChanged { from: Direction::Neutral, to: Direction::Long, .. }
            )),
            1
        );
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::OrderSubmitted { .. })), 1);
    }

    #[tokio::test]
    async fn test_only_first_breakout_orders() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(settings(), &broker, &recorder).await;

        let ticks = minute_closes(&[105.0, 112.0, 95.0, 120.0, 90.0, 105.0]);
        let summary = orb.run(feed(ticks)).await.unwrap();

        assert_eq!(summary.ticks, 6);
        assert_eq!(summary.bars, 5);
        assert_eq!(summary.final_direction, Direction::Short);
        assert_eq!(summary.order.unwrap().decision.direction, Direction::Long);
        assert_eq!(broker.submitted().unwrap().len(), 1);
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::DirectionChanged { .. })), 4);
        assert!(matches!(recorder.events().last(), Some(BotEvent::RunStopped { .. })));
    }

    #[tokio::test]
    async fn test_short_breakout_brackets() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(settings(), &broker, &recorder).await;

        orb.run(feed(minute_closes(&[104.0, 99.0, 99.0]))).await.unwrap();

        let orders = broker.submitted().unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, -10);
        assert_eq!(orders[0].stop_loss, Some(110.0));
        assert_eq!(orders[0].entry_price, 99.0);
        assert!(orders[0].take_profit.unwrap() < 99.0);
    }

    #[tokio::test]
    async fn test_failed_order_still_consumes_latch() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)).rejecting());
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(settings(), &broker, &recorder).await;

        let summary = orb
            .run(feed(minute_closes(&[105.0, 112.0, 95.0, 115.0, 115.0])))
            .await
            .unwrap();

        let order = summary.order.unwrap();
        assert_eq!(order.status, OrderStatus::Failed);
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::OrderFailed { .. })), 1);
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::OrderSubmitted { .. })), 0);
    }

    #[tokio::test]
    async fn test_range_boundaries_do_not_trigger() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(settings(), &broker, &recorder).await;

        let summary = orb.run(feed(minute_closes(&[110.0, 100.0, 110.0, 100.0]))).await.unwrap();

        assert_eq!(summary.final_direction, Direction::Neutral);
        assert!(summary.order.is_none());
        assert!(broker.submitted().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_reference_data() {
        let broker = Arc::new(PaperBroker::new(None));
        let observer: Arc<dyn RunObserver> = Arc::new(Recorder::default());
        let err = Orchestrator::start(settings(), broker.as_ref(), Arc::clone(&broker), observer)
            .await
            .err()
            .unwrap();
        assert!(matches!(err, BotError::NoReferenceData { ref instrument, .. } if instrument == "EUR_USD"));
    }

    #[tokio::test]
    async fn test_full_store_stops_the_run() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(RunSettings { capacity: 2, ..settings() }, &broker, &recorder).await;

        let err = orb
            .run(feed(minute_closes(&[105.0, 105.0, 105.0, 105.0, 105.0])))
            .await
            .unwrap_err();

        assert!(matches!(err, BotError::CapacityExceeded { capacity: 2 }));
        assert_eq!(recorder.count(|e| matches!(e, BotEvent::BarClosed { .. })), 2);
        assert!(matches!(
            recorder.events().last(),
            Some(BotEvent::RunStopped { reason }) if reason.contains("capacity")
        ));
    }

    #[tokio::test]
    async fn test_feed_error_stops_the_run() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let orb = start_with(settings(), &broker, &recorder).await;

        let items = vec![Ok(px(0, 105.0)), Err(BotError::Feed("connection reset".into())), Ok(px(70, 120.0))];
        let err = orb.run(stream::iter(items).boxed()).await.unwrap_err();

        assert!(matches!(err, BotError::Feed(_)));
        assert!(broker.submitted().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_catch_up_policy_keeps_bar_times_in_step() {
        let broker = Arc::new(PaperBroker::new(Some(RANGE)));
        let recorder = Arc::new(Recorder::default());
        let mut orb = start_with(
            RunSettings { gap_policy: GapPolicy::CatchUp, ..settings() },
            &broker,
            &recorder,
        )
        .await;

        orb.process_tick(&px(0, 105.0)).await.unwrap();
        orb.process_tick(&px(190, 111.0)).await.unwrap();

        assert_eq!(orb.store().len(), 3);
        assert_eq!(orb.store().get(-1).unwrap().time, t0() + Duration::seconds(120));
        assert_eq!(orb.store().get(-1).unwrap().volume, 0);
        assert_eq!(orb.direction().unwrap(), Direction::Neutral);
    }
}
