//! # orbot: Opening Range Breakout Bot
//!
//! ## Architecture Overview
//!
//! ```text
//!  ┌──────────────┐  candles (once)   ┌──────────────────────────────────────┐
//!  │  OANDA v20   │ ─────────────────▶│  Orchestrator                        │
//!  │  REST/stream │  pricing stream   │   TickAggregator → TimeSeriesStore   │──▶ one bracket order
//!  │  (or replay) │ ─────────────────▶│        on_append → BreakoutIndicator │
//!  └──────────────┘                   └──────────────────────────────────────┘
//!                                                      │ RunObserver
//!  ┌──────────────┐   GET /api/monitor/status          ▼
//!  │  Dashboard   │ ◀──────────────────────────  AppState (watch + broadcast)
//!  └──────────────┘   WS  /ws/monitor
//! ```
//!
//! Configuration is read from the environment; see [`config`].

use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

mod auth;
mod broker;
mod config;
mod engine;
mod error;
mod events;
mod models;
mod routes;
mod state;

use broker::{OandaClient, OrderGateway, PaperBroker, ReplayFeed, TickStream};
use config::{BotConfig, BrokerMode};
use engine::orchestrator::{Orchestrator, RunSummary};
use events::RunObserver;
use routes::monitor_router;
use state::build_state;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Load .env ──────────────────────────────────────────────────────────
    dotenvy::dotenv().ok();

    // ── 2. Structured logging ─────────────────────────────────────────────────
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::from_default_env()
                .add_directive("orbot=debug".parse()?)
                .add_directive("tower_http=info".parse()?),
        )
        .init();

    info!(r#"

  ╔═══════════════════════════════════════════════════════╗
  ║              ORBOT · Opening Range Breakout           ║
  ║   Ticks · Bars · Breakout · One Bracket Order         ║
  ╚═══════════════════════════════════════════════════════╝"#);

    // ── 3. Configuration ──────────────────────────────────────────────────────
    let config = BotConfig::from_env().context("invalid configuration")?;
    info!(
        instrument  = %config.run.instrument,
        granularity = %config.run.granularity,
        units       = config.run.units,
        take_profit = ?config.run.take_profit_pct,
        orb_time    = %config.run.reference_time,
        gap_policy  = ?config.run.gap_policy,
        "Configuration loaded"
    );

    // ── 4. Monitor ────────────────────────────────────────────────────────────
    let state = build_state(config.monitor.as_ref().and_then(|m| m.api_key.clone()));
    if let Some(monitor) = &config.monitor {
        let app = monitor_router(state.clone());
        let listener = tokio::net::TcpListener::bind(monitor.addr)
            .await
            .with_context(|| format!("cannot bind monitor to {}", monitor.addr))?;

        info!(addr = %monitor.addr, "🚀 Monitor listening");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                error!(error = %e, "Monitor server stopped");
            }
        });
    }
    let observer: Arc<dyn RunObserver> = state.clone();

    // ── 5. Run ────────────────────────────────────────────────────────────────
    let summary = match &config.broker {
        BrokerMode::Oanda(oanda) => {
            let client = OandaClient::new(oanda);
            let orb = Orchestrator::start(config.run.clone(), &client, client.clone(), observer).await?;
            let feed = match &config.replay_file {
                Some(path) => ReplayFeed::open(path).await?,
                None => client.price_stream(&config.run.instrument).await?,
            };
            run_until_interrupted(orb, feed).await?
        }
        BrokerMode::Paper(range) => {
            let paper = Arc::new(PaperBroker::new(Some(*range)));
            let orb =
                Orchestrator::start(config.run.clone(), paper.as_ref(), Arc::clone(&paper), observer).await?;
            let path = config
                .replay_file
                .as_ref()
                .context("paper mode needs TICK_REPLAY_FILE")?;
            let summary = run_until_interrupted(orb, ReplayFeed::open(path).await?).await?;
            info!(orders = paper.submitted()?.len(), "🎭 Paper orders accepted");
            summary
        }
    };

    if let Some(summary) = summary {
        info!(
            ticks     = summary.ticks,
            bars      = summary.bars,
            direction = %summary.final_direction,
            order     = ?summary.order.as_ref().map(|o| o.status),
            "✅ Run finished"
        );
    }
    Ok(())
}

/// `None` when stopped with Ctrl-C.
async fn run_until_interrupted<G: OrderGateway>(
    orb: Orchestrator<G>,
    feed: TickStream,
) -> anyhow::Result<Option<RunSummary>> {
    tokio::select! {
        result = orb.run(feed) => Ok(Some(result?)),
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping run");
            Ok(None)
        }
    }
}
