//! # broker::oanda
//!
//! OANDA v20 REST + streaming adapter.
//!
//! | Call            | Endpoint                                         |
//! |-----------------|--------------------------------------------------|
//! | reference candle| `GET  /v3/instruments/{instrument}/candles`       |
//! | pricing stream  | `GET  /v3/accounts/{account}/pricing/stream`      |
//! | market order    | `POST /v3/accounts/{account}/orders`              |
//!
//! Every request carries `Authorization: Bearer <token>`.

use std::fmt::Display;
use std::pin::Pin;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use futures_util::{stream, Stream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::broker::{decode_line, MarketData, OrderGateway, TickStream};
use crate::config::OandaConfig;
use crate::error::BotError;
use crate::models::tick::de_opt_price;
use crate::models::{OrderDecision, OrderReceipt, ReferenceBar};

/// REST calls only; the pricing stream stays open for the whole run.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

// ─── Client ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct OandaClient {
    http:       reqwest::Client,
    api_url:    String,
    stream_url: String,
    account_id: String,
    token:      String,
}

impl OandaClient {
    pub fn new(config: &OandaConfig) -> Self {
        Self {
            http:       reqwest::Client::new(),
            api_url:    config.api_url.trim_end_matches('/').to_string(),
            stream_url: config.stream_url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            token:      config.token.clone(),
        }
    }

    /// Open the pricing stream for `instrument`.
    pub async fn price_stream(&self, instrument: &str) -> Result<TickStream, BotError> {
        let url = format!("{}/v3/accounts/{}/pricing/stream", self.stream_url, self.account_id);
        info!(instrument, url = %url, "📡 Connecting to pricing stream");

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[("instruments", instrument)])
            .send()
            .await
            .map_err(|e| BotError::Feed(format!("pricing stream unreachable: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!(http_status = %status, body = %body, "Pricing stream refused");
            return Err(BotError::Feed(format!("pricing stream HTTP {status}: {body}")));
        }

        Ok(ticks_from_chunks(response.bytes_stream()))
    }
}

impl MarketData for OandaClient {
    async fn reference_bar(
        &self,
        instrument: &str,
        at: DateTime<Utc>,
        granularity: &str,
    ) -> Result<Option<ReferenceBar>, BotError> {
        let url = format!("{}/v3/instruments/{instrument}/candles", self.api_url);
        let from = at.to_rfc3339_opts(SecondsFormat::Secs, true);

        let response = self
            .http
            .get(&url)
            .bearer_auth(&self.token)
            .query(&[
                ("count", "1"),
                ("from", from.as_str()),
                ("granularity", granularity),
                ("price", "M"),
            ])
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BotError::Broker(format!("candles request failed: {e}")))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| BotError::Broker(format!("candles response unreadable: {e}")))?;
        if !status.is_success() {
            return Err(BotError::Broker(format!("candles HTTP {status}: {}", error_message(&body))));
        }

        parse_candles(&body)
    }
}

impl OrderGateway for OandaClient {
    async fn submit(&self, decision: &OrderDecision) -> Result<OrderReceipt, BotError> {
        let url = format!("{}/v3/accounts/{}/orders", self.api_url, self.account_id);
        let body = order_body(decision);

        info!(order = %body, url = %url, "🚀 Sending order to OANDA");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(|e| BotError::Broker(format!("OANDA unreachable: {e}")))?;

        let status = response.status();
        let text = response.text().await.unwrap_or_default();
        info!(http_status = status.as_u16(), body = %text, "Response");

        if !status.is_success() {
            return Err(BotError::OrderRejected(format!("HTTP {status}: {}", error_message(&text))));
        }
        parse_order_response(&text)
    }
}

// ─── Candles ──────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CandlesResponse {
    #[serde(default)]
    candles: Vec<Candle>,
}

#[derive(Debug, Deserialize)]
struct Candle {
    time:     DateTime<Utc>,
    complete: bool,
    mid:      Option<CandleMid>,
}

#[derive(Debug, Deserialize)]
struct CandleMid {
    #[serde(default, deserialize_with = "de_opt_price")]
    h: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_price")]
    l: Option<f64>,
    #[serde(default, deserialize_with = "de_opt_price")]
    c: Option<f64>,
}

/// Last complete candle with mid prices, if any.
pub(crate) fn parse_candles(body: &str) -> Result<Option<ReferenceBar>, BotError> {
    let parsed: CandlesResponse = serde_json::from_str(body)
        .map_err(|e| BotError::Broker(format!("unexpected candles payload: {e}")))?;

    let bar = parsed
        .candles
        .iter()
        .filter(|c| c.complete)
        .filter_map(|c| {
            let mid = c.mid.as_ref()?;
            Some(ReferenceBar { time: c.time, high: mid.h?, low: mid.l?, close: mid.c? })
        })
        .last();

    if bar.is_none() && !parsed.candles.is_empty() {
        warn!(candles = parsed.candles.len(), "No complete mid candle in response");
    }
    Ok(bar)
}

// ─── Orders ───────────────────────────────────────────────────────────────────

/// v20 `MarketOrderRequest` body with brackets attached on fill.
pub(crate) fn order_body(decision: &OrderDecision) -> Value {
    let mut order = json!({
        "type":         "MARKET",
        "instrument":   decision.instrument,
        "units":        decision.units.to_string(),
        "timeInForce":  "FOK",
        "positionFill": "DEFAULT",
    });
    if let Some(tp) = decision.take_profit {
        order["takeProfitOnFill"] = json!({ "price": format_price(tp) });
    }
    if let Some(sl) = decision.stop_loss {
        order["stopLossOnFill"] = json!({ "price": format_price(sl) });
    }
    json!({ "order": order })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderResponse {
    order_create_transaction: Option<Transaction>,
    order_fill_transaction:   Option<Transaction>,
    order_cancel_transaction: Option<Transaction>,
}

#[derive(Debug, Deserialize)]
struct Transaction {
    id:     String,
    #[serde(default)]
    reason: Option<String>,
}

pub(crate) fn parse_order_response(body: &str) -> Result<OrderReceipt, BotError> {
    let parsed: OrderResponse = serde_json::from_str(body)
        .map_err(|e| BotError::Broker(format!("unexpected order payload: {e}")))?;

    if let Some(cancel) = parsed.order_cancel_transaction {
        let reason = cancel.reason.unwrap_or_else(|| "unknown".to_string());
        return Err(BotError::OrderRejected(format!("order cancelled: {reason}")));
    }

    let created = parsed
        .order_create_transaction
        .ok_or_else(|| BotError::Broker("order response without orderCreateTransaction".into()))?;

    let message = match parsed.order_fill_transaction {
        Some(fill) => format!("filled (transaction {})", fill.id),
        None => "created".to_string(),
    };
    Ok(OrderReceipt { order_id: Some(created.id), message })
}

/// `errorMessage` of a v20 error body, or the raw body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v.get("errorMessage").and_then(Value::as_str).map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

/// Six significant digits as v20 expects them: `12004.1`, `1.05455`.
pub fn format_price(value: f64) -> String {
    let int_digits = (value.trunc() as i64).to_string().len();
    let precision = 6usize.saturating_sub(int_digits);
    format!("{value:.precision$}")
}

// ─── Streaming ────────────────────────────────────────────────────────────────

struct LineSplitter<S> {
    chunks: Pin<Box<S>>,
    buf:    Vec<u8>,
    done:   bool,
}

/// Turn a byte-chunk stream into decoded ticks, one per newline-terminated
/// line.  A transport error is yielded once and ends the stream.
pub(crate) fn ticks_from_chunks<S, B, E>(chunks: S) -> TickStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Display + Send + 'static,
{
    let state = LineSplitter { chunks: Box::pin(chunks), buf: Vec::new(), done: false };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(pos) = st.buf.iter().position(|&b| b == b'\n') {
                let line: Vec<u8> = st.buf.drain(..=pos).collect();
                if let Some(tick) = decode_line(&String::from_utf8_lossy(&line)) {
                    return Some((Ok(tick), st));
                }
                continue;
            }

            if st.done {
                let rest = std::mem::take(&mut st.buf);
                return decode_line(&String::from_utf8_lossy(&rest)).map(|tick| (Ok(tick), st));
            }

            match st.chunks.next().await {
                Some(Ok(chunk)) => st.buf.extend_from_slice(chunk.as_ref()),
                Some(Err(e)) => {
                    st.done = true;
                    st.buf.clear();
                    return Some((Err(BotError::Feed(format!("pricing stream interrupted: {e}"))), st));
                }
                None => st.done = true,
            }
        }
    })
    .boxed()
}

// ─── Tests ────────────────────────────────────────────────────────────────────
