//! # models::tick
//!
//! Defines [`Tick`], the raw market pulse coming from the pricing stream (or a
//! replay file in the same format).
//!
//! The v20 stream sends newline-delimited JSON messages.  `PRICE` messages
//! carry quote data; anything else (`HEARTBEAT`, …) is a *non-price* tick that
//! only contributes its timestamp to the aggregator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};

use crate::error::BotError;

// ─── Tick ─────────────────────────────────────────────────────────────────────

/// A single event from the live feed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    /// UTC timestamp the broker attached to the message.
    pub time: DateTime<Utc>,
    pub kind: TickKind,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickKind {
    /// Quote update (closeout bid / ask).
    Price { bid: f64, ask: f64 },
    /// Keep-alive or any other message type without a price.
    Heartbeat,
}

impl Tick {
    pub fn price(time: DateTime<Utc>, bid: f64, ask: f64) -> Self {
        Self { time, kind: TickKind::Price { bid, ask } }
    }

    pub fn heartbeat(time: DateTime<Utc>) -> Self {
        Self { time, kind: TickKind::Heartbeat }
    }

    /// Mid price `(bid + ask) / 2`, `None` for non-price ticks.
    #[inline]
    pub fn mid(&self) -> Option<f64> {
        match self.kind {
            TickKind::Price { bid, ask } => Some((bid + ask) / 2.0),
            TickKind::Heartbeat => None,
        }
    }

    /// Parse one line of the v20 pricing stream.
    pub fn from_stream_line(line: &str) -> Result<Self, BotError> {
        let msg: StreamMessage = serde_json::from_str(line)
            .map_err(|e| BotError::Feed(format!("malformed stream message: {e}")))?;

        if msg.kind != "PRICE" {
            return Ok(Self::heartbeat(msg.time));
        }

        match (msg.closeout_bid, msg.closeout_ask) {
            (Some(bid), Some(ask)) => Ok(Self::price(msg.time, bid, ask)),
            _ => Err(BotError::Feed(format!(
                "PRICE message at {} without closeoutBid/closeoutAsk",
                msg.time
            ))),
        }
    }
}

// ─── Wire format ──────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct StreamMessage {
    #[serde(rename = "type")]
    kind: String,
    time: DateTime<Utc>,
    #[serde(rename = "closeoutBid", default, deserialize_with = "de_opt_price")]
    closeout_bid: Option<f64>,
    #[serde(rename = "closeoutAsk", default, deserialize_with = "de_opt_price")]
    closeout_ask: Option<f64>,
}

/// v20 encodes prices as decimal strings; replay files sometimes use numbers.
#[derive(Deserialize)]
#[serde(untagged)]
enum PriceRepr {
    Number(f64),
    Text(String),
}

pub(crate) fn de_opt_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<PriceRepr>::deserialize(deserializer)? {
        None => Ok(None),
        Some(PriceRepr::Number(v)) => Ok(Some(v)),
        Some(PriceRepr::Text(s)) => s
            .trim()
            .parse::<f64>()
            .map(Some)
            .map_err(serde::de::Error::custom),
    }
}

// ─── Tests ────────────────────────────────────────────────────────────────────
