//! # config
//!
//! Run configuration, read once from the environment at startup (after
//! `dotenvy` loaded `.env`) and passed down explicitly.
//!
//! ## Environment Variables
//!
//! | Variable            | Default                               | Description                         |
//! |---------------------|---------------------------------------|-------------------------------------|
//! | `INSTRUMENT`        | required                              | Instrument to trade, e.g. `EUR_USD` |
//! | `GRANULARITY`       | required                              | Bar width, e.g. `minutes1`          |
//! | `UNITS`             | required                              | Order size (positive)               |
//! | `TAKE_PROFIT_PCT`   | `0.5`                                 | Take-profit in percent, `0` = none  |
//! | `ORB_TIME`          | today `09:15:00Z`                     | Opening-range reference time        |
//! | `ORB_GRANULARITY`   | broker code of `GRANULARITY`          | Candle granularity for the range    |
//! | `STORE_CAPACITY`    | `1000`                                | Bars kept per run                   |
//! | `GAP_POLICY`        | `single-step`                         | or `catch-up`                       |
//! | `OANDA_API_URL`     | `https://api-fxpractice.oanda.com`    | `paper` = offline paper broker      |
//! | `OANDA_STREAM_URL`  | `https://stream-fxpractice.oanda.com` | Pricing stream host                 |
//! | `OANDA_ACCOUNT_ID`  | required unless paper                 | v20 account                         |
//! | `OANDA_TOKEN`       | required unless paper                 | v20 bearer token                    |
//! | `PAPER_RANGE_HIGH`  | required in paper mode                | Opening range high (paper)          |
//! | `PAPER_RANGE_LOW`   | required in paper mode                | Opening range low (paper)           |
//! | `TICK_REPLAY_FILE`  | unset (required in paper mode)        | Replay ticks from a JSON-lines file |
//! | `MONITOR_ADDR`      | `127.0.0.1:3000`                      | Monitor bind address, `off` = none  |
//! | `MONITOR_API_KEY`   | unset                                 | Required `X-API-Key` when set       |

use std::fmt::Display;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};

use crate::engine::aggregator::GapPolicy;
use crate::engine::granularity::Granularity;
use crate::engine::store::DEFAULT_CAPACITY;
use crate::models::OpeningRange;

const DEFAULT_API_URL: &str = "https://api-fxpractice.oanda.com";
const DEFAULT_STREAM_URL: &str = "https://stream-fxpractice.oanda.com";
const DEFAULT_MONITOR_ADDR: &str = "127.0.0.1:3000";
const DEFAULT_TAKE_PROFIT_PCT: f64 = 0.5;

// ─── Settings ─────────────────────────────────────────────────────────────────

/// Everything a single run needs; immutable once the run starts.
#[derive(Debug, Clone, PartialEq)]
pub struct RunSettings {
    pub instrument:            String,
    pub granularity:           Granularity,
    /// Unsigned order size; the breakout direction supplies the sign.
    pub units:                 i64,
    /// `None` = no take-profit bracket.
    pub take_profit_pct:       Option<f64>,
    pub reference_time:        DateTime<Utc>,
    pub reference_granularity: String,
    pub capacity:              usize,
    pub gap_policy:            GapPolicy,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OandaConfig {
    pub api_url:    String,
    pub stream_url: String,
    pub account_id: String,
    pub token:      String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum BrokerMode {
    Oanda(OandaConfig),
    /// Offline: fixed opening range, orders accepted locally.
    Paper(OpeningRange),
}

#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    pub addr:    SocketAddr,
    pub api_key: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BotConfig {
    pub run:         RunSettings,
    pub broker:      BrokerMode,
    pub replay_file: Option<PathBuf>,
    pub monitor:     Option<MonitorConfig>,
}

// ─── Loading ──────────────────────────────────────────────────────────────────

impl BotConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), Utc::now().date_naive())
    }

    /// Build from any key → value source; blank values count as unset.
    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
        today: NaiveDate,
    ) -> anyhow::Result<Self> {
        let var = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let required = |key: &str| var(key).with_context(|| format!("{key} must be set"));

        // ── Run ──────────────────────────────────────────────────────────────
        let instrument = required("INSTRUMENT")?;
        let granularity: Granularity = required("GRANULARITY")?.parse()?;

        let units: i64 = parse_value("UNITS", &required("UNITS")?)?;
        if units <= 0 {
            bail!("UNITS must be a positive integer, got {units}");
        }

        let take_profit_pct = parse_or(&var, "TAKE_PROFIT_PCT", DEFAULT_TAKE_PROFIT_PCT)?;
        if take_profit_pct.is_nan() || take_profit_pct < 0.0 {
            bail!("TAKE_PROFIT_PCT must be >= 0, got {take_profit_pct}");
        }

        let reference_time = match var("ORB_TIME") {
            Some(raw) => DateTime::parse_from_rfc3339(&raw)
                .with_context(|| format!("ORB_TIME is not an RFC 3339 timestamp: {raw:?}"))?
                .with_timezone(&Utc),
            None => default_reference_time(today)?,
        };

        let run = RunSettings {
            reference_granularity: var("ORB_GRANULARITY").unwrap_or_else(|| granularity.broker_code()),
            take_profit_pct: (take_profit_pct > 0.0).then_some(take_profit_pct),
            capacity: parse_or(&var, "STORE_CAPACITY", DEFAULT_CAPACITY)?,
            gap_policy: var("GAP_POLICY").map(|p| p.parse()).transpose()?.unwrap_or_default(),
            instrument,
            granularity,
            units,
            reference_time,
        };

        // ── Broker ───────────────────────────────────────────────────────────
        let replay_file = var("TICK_REPLAY_FILE").map(PathBuf::from);
        let api_url = var("OANDA_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let broker = if api_url.eq_ignore_ascii_case("paper") {
            let high: f64 = parse_value("PAPER_RANGE_HIGH", &required("PAPER_RANGE_HIGH")?)?;
            let low: f64 = parse_value("PAPER_RANGE_LOW", &required("PAPER_RANGE_LOW")?)?;
            if high < low {
                bail!("PAPER_RANGE_HIGH ({high}) is below PAPER_RANGE_LOW ({low})");
            }
            if replay_file.is_none() {
                bail!("paper mode has no live feed: set TICK_REPLAY_FILE");
            }
            BrokerMode::Paper(OpeningRange { high, low })
        } else {
            BrokerMode::Oanda(OandaConfig {
                api_url,
                stream_url: var("OANDA_STREAM_URL").unwrap_or_else(|| DEFAULT_STREAM_URL.to_string()),
                account_id: required("OANDA_ACCOUNT_ID")?,
                token:      required("OANDA_TOKEN")?,
            })
        };

        // ── Monitor ──────────────────────────────────────────────────────────
        let addr = var("MONITOR_ADDR").unwrap_or_else(|| DEFAULT_MONITOR_ADDR.to_string());
        let monitor = if addr.eq_ignore_ascii_case("off") {
            None
        } else {
            Some(MonitorConfig {
                addr:    parse_value("MONITOR_ADDR", &addr)?,
                api_key: var("MONITOR_API_KEY"),
            })
        };

        Ok(Self { run, broker, replay_file, monitor })
    }
}

/// Opening-range reference time when none is configured: `today` at 09:15 UTC.
fn default_reference_time(today: NaiveDate) -> anyhow::Result<DateTime<Utc>> {
    let naive = today.and_hms_opt(9, 15, 0).context("invalid default ORB time")?;
    Ok(Utc.from_utc_datetime(&naive))
}

fn parse_value<T>(key: &str, raw: &str) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    raw.parse::<T>()
        .map_err(|e| anyhow::anyhow!("{key}={raw:?} is invalid: {e}"))
}

fn parse_or<T>(var: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    var(key).map_or(Ok(default), |raw| parse_value(key, &raw))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
