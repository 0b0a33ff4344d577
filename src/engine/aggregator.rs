//! # engine::aggregator
//!
//! Builds fixed-width bars from the raw tick stream.
//!
//! A bucket is opened by the first *price* tick at the epoch-aligned interval
//! boundary.  When a tick arrives at or after `bucket_start + interval` the
//! open bucket is closed and emitted as a [`Bar`] carrying the last mid price
//! and the number of price ticks it saw.  The close price carries over into
//! the next bucket, so an interval without price ticks still yields a bar with
//! the previous close and zero volume.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use tracing::debug;

use crate::engine::granularity::Granularity;
use crate::error::BotError;
use crate::models::{Bar, Tick};

// ─── Gap Policy ───────────────────────────────────────────────────────────────

/// What to do when a tick skips more than one interval.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum GapPolicy {
    /// Close one bucket per tick and advance by exactly one interval; bar
    /// timestamps lag behind the clock until enough ticks arrive.
    #[default]
    SingleStep,
    /// Close every fully elapsed bucket before applying the tick.
    CatchUp,
}

impl FromStr for GapPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "single-step" | "single_step" => Ok(GapPolicy::SingleStep),
            "catch-up" | "catch_up" => Ok(GapPolicy::CatchUp),
            other => anyhow::bail!("Unknown gap policy: '{other}'. Use 'single-step' or 'catch-up'"),
        }
    }
}

// ─── Open Bucket ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy)]
struct OpenBucket {
    start:      DateTime<Utc>,
    last_close: f64,
    tick_count: u64,
}

impl OpenBucket {
    /// Emit the bucket and roll forward by one interval.  `last_close` is kept.
    fn close(&mut self, interval: Duration) -> Bar {
        let bar = Bar::new(self.start, self.last_close, self.tick_count);
        self.start = self.start + interval;
        self.tick_count = 0;
        bar
    }

    fn apply(&mut self, tick: &Tick) {
        if let Some(mid) = tick.mid() {
            self.last_close = mid;
            self.tick_count += 1;
        }
    }
}

// ─── Aggregator ───────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct TickAggregator {
    granularity: Granularity,
    bucket:      Option<OpenBucket>,
}

impl TickAggregator {
    pub fn new(granularity: Granularity) -> Self {
        Self { granularity, bucket: None }
    }

    /// Start of the currently open bucket (`None` before the first price tick).
    pub fn bucket_start(&self) -> Option<DateTime<Utc>> {
        self.bucket.map(|b| b.start)
    }

    /// Feed one tick; returns the bar it completed, if any.
    ///
    /// At most one bar per call. After a long quiet period successive calls
    /// keep emitting the stale buckets one at a time.
    pub fn ingest(&mut self, tick: &Tick) -> Option<Bar> {
        let interval = self.granularity.as_duration();
        let bucket = self.bucket_for(tick)?;

        let emitted = (tick.time >= bucket.start + interval).then(|| bucket.close(interval));
        bucket.apply(tick);
        emitted
    }

    /// Like [`ingest`](Self::ingest) but emits one bar per elapsed interval so
    /// bar times stay in step with the tick clock.
    pub fn ingest_catching_up(&mut self, tick: &Tick) -> Vec<Bar> {
        let interval = self.granularity.as_duration();
        let Some(bucket) = self.bucket_for(tick) else {
            return Vec::new();
        };

        let mut bars = Vec::new();
        while tick.time >= bucket.start + interval {
            bars.push(bucket.close(interval));
        }
        bucket.apply(tick);
        bars
    }

    /// Open bucket for this tick, opening one on the first price tick.
    /// Non-price ticks are ignored until then.
    fn bucket_for(&mut self, tick: &Tick) -> Option<&mut OpenBucket> {
        if self.bucket.is_none() {
            let mid = tick.mid()?;
            let start = floor_to_interval(tick.time, self.granularity.seconds());
            debug!(%start, granularity = %self.granularity, "Opening first bucket");
            self.bucket = Some(OpenBucket { start, last_close: mid, tick_count: 0 });
        }
        self.bucket.as_mut()
    }
}

/// `t - (t mod interval)`, dropping fractional seconds.
fn floor_to_interval(time: DateTime<Utc>, interval_secs: i64) -> DateTime<Utc> {
    let offset = time.timestamp().rem_euclid(interval_secs);
    time - Duration::seconds(offset) - Duration::nanoseconds(i64::from(time.timestamp_subsec_nanos()))
}

impl TryFrom<&str> for TickAggregator {
    type Error = BotError;

    fn try_from(spec: &str) -> Result<Self, Self::Error> {
        Ok(Self::new(spec.parse()?))
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 2, 9, 30, 0).unwrap()
    }

    fn at(secs: i64) -> DateTime<Utc> {
        t0() + Duration::seconds(secs)
    }

    fn px(secs: i64, price: f64) -> Tick {
        Tick::price(at(secs), price, price)
    }

    fn minutes1() -> TickAggregator {
        TickAggregator::try_from("minutes1").unwrap()
    }

    #[test]
    fn test_no_bar_within_bucket() {
        let mut agg = minutes1();
        for s in [0, 10, 20, 30] {
            assert_eq!(agg.ingest(&px(s, 105.0)), None);
        }
        assert_eq!(agg.bucket_start(), Some(t0()));
    }

    #[test]
    fn test_boundary_emits_last_close_and_volume() {
        let mut agg = minutes1();
        for s in [0, 10, 20, 30] {
            agg.ingest(&px(s, 105.0));
        }

        let bar = agg.ingest(&Tick::price(at(61), 111.0, 113.0)).unwrap();
        assert_eq!(bar, Bar::new(t0(), 105.0, 4));

        let bar = agg.ingest(&px(125, 113.0)).unwrap();
        assert_eq!(bar, Bar::new(at(60), 112.0, 1));
        assert_eq!(agg.bucket_start(), Some(at(120)));
    }

    #[test]
    fn test_tick_exactly_on_boundary_closes_bucket() {
        let mut agg = minutes1();
        agg.ingest(&px(0, 100.0));
        assert_eq!(agg.ingest(&px(59, 101.0)), None);
        assert_eq!(agg.ingest(&px(60, 102.0)), Some(Bar::new(t0(), 101.0, 2)));
    }

    #[test]
    fn test_heartbeat_before_first_price_is_ignored() {
        let mut agg = minutes1();
        assert_eq!(agg.ingest(&Tick::heartbeat(at(5))), None);
        assert_eq!(agg.bucket_start(), None);

        agg.ingest(&px(70, 100.0));
        assert_eq!(agg.bucket_start(), Some(at(60)));
    }

    #[test]
    fn test_heartbeats_close_buckets_and_carry_over() {
        let mut agg = minutes1();
        agg.ingest(&px(0, 100.0));

        // heartbeat closes the first bucket but is not counted
        assert_eq!(agg.ingest(&Tick::heartbeat(at(65))), Some(Bar::new(t0(), 100.0, 1)));
        // empty bucket → previous close, zero volume
        assert_eq!(agg.ingest(&Tick::heartbeat(at(130))), Some(Bar::new(at(60), 100.0, 0)));
    }

    #[test]
    fn test_single_step_lags_after_gap() {
        let mut agg = minutes1();
        agg.ingest(&px(0, 100.0));

        assert_eq!(agg.ingest(&px(250, 101.0)), Some(Bar::new(t0(), 100.0, 1)));
        assert_eq!(agg.bucket_start(), Some(at(60)));

        // the 250s tick landed in the stale 60s bucket
        assert_eq!(agg.ingest(&px(251, 102.0)), Some(Bar::new(at(60), 101.0, 1)));
        assert_eq!(agg.ingest(&px(252, 103.0)), Some(Bar::new(at(120), 102.0, 1)));
        assert_eq!(agg.bucket_start(), Some(at(180)));
    }

    #[test]
    fn test_catch_up_emits_one_bar_per_elapsed_interval() {
        let mut agg = minutes1();
        assert!(agg.ingest_catching_up(&px(0, 100.0)).is_empty());

        let bars = agg.ingest_catching_up(&px(250, 101.0));
        assert_eq!(
            bars,
            vec![
                Bar::new(t0(), 100.0, 1),
                Bar::new(at(60), 100.0, 0),
                Bar::new(at(120), 100.0, 0),
                Bar::new(at(180), 100.0, 0),
            ]
        );
        assert_eq!(agg.bucket_start(), Some(at(240)));
        assert_eq!(agg.ingest_catching_up(&px(300, 102.0)), vec![Bar::new(at(240), 101.0, 1)]);
    }

    #[test]
    fn test_bucket_start_is_epoch_aligned() {
        let mut agg = minutes1();
        agg.ingest(&Tick::price(at(45) + Duration::milliseconds(500), 1.0, 1.0));
        assert_eq!(agg.bucket_start(), Some(t0()));

        let mut agg = TickAggregator::try_from("hours2").unwrap();
        agg.ingest(&px(0, 1.0));
        assert_eq!(agg.bucket_start(), Some(Utc.with_ymd_and_hms(2024, 1, 2, 8, 0, 0).unwrap()));
    }

    #[test]
    fn test_invalid_granularity() {
        assert!(matches!(TickAggregator::try_from("x"), Err(BotError::InvalidGranularity(_))));
    }

    #[test]
    fn test_gap_policy_parse() {
        assert_eq!("single-step".parse::<GapPolicy>().unwrap(), GapPolicy::SingleStep);
        assert_eq!("CATCH-UP".parse::<GapPolicy>().unwrap(), GapPolicy::CatchUp);
        assert!("sometimes".parse::<GapPolicy>().is_err());
    }
}
