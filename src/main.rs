// =============================================================================
// Exit Sentinel — Main Entry Point
// =============================================================================
//
// A read-only monitor for leveraged futures positions: every cycle it reloads
// the position book, recomputes targets and ETAs from fresh candles, and
// publishes an atomic snapshot for the panel. It never places orders.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod config;
mod engine;
mod evaluator;
mod indicators;
mod market_data;
mod positions;
mod snapshot;
mod types;

use std::sync::Arc;

use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::config::MonitorConfig;
use crate::market_data::FuturesFeed;
use crate::snapshot::SnapshotBuilder;

const CONFIG_PATH: &str = "monitor_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Exit Sentinel — Starting Up                      ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let mut config = MonitorConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        MonitorConfig::default()
    });

    // Env overrides.
    if let Ok(dir) = std::env::var("DATA_DIR") {
        if !dir.trim().is_empty() {
            config.data_dir = dir;
        }
    }
    if let Ok(syms) = std::env::var("SENTINEL_SYMBOLS") {
        let universe: Vec<String> = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if !universe.is_empty() {
            config.universe = universe;
        }
    }

    info!(
        eval_mode = %config.eval_mode,
        poll_interval_secs = config.poll_interval_secs,
        universe = config.universe.len(),
        data_dir = %config.data_dir,
        "Monitor configured"
    );

    // ── 2. Build shared state & market data feed ─────────────────────────
    let state = AppState::new(config.clone());
    let feed = Arc::new(FuturesFeed::new(config.http_timeout_secs)?);

    // ── 3. Start the API server ──────────────────────────────────────────
    let api_state = state.clone();
    let bind_addr =
        std::env::var("SENTINEL_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3001".into());
    let bind_addr_clone = bind_addr.clone();

    tokio::spawn(async move {
        let app = api::rest::router(api_state);
        let listener = match tokio::net::TcpListener::bind(&bind_addr_clone).await {
            Ok(l) => l,
            Err(e) => {
                error!(addr = %bind_addr_clone, error = %e, "Failed to bind API server");
                return;
            }
        };
        info!(addr = %bind_addr_clone, "API server listening");
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 4. Monitor loop ──────────────────────────────────────────────────
    let loop_state = state.clone();
    let loop_feed = feed.clone();
    let monitor = tokio::spawn(async move {
        let mut interval = tokio::time::interval(tokio::time::Duration::from_secs(
            loop_state.config.read().poll_interval_secs.max(1),
        ));
        loop {
            interval.tick().await;

            let cfg = loop_state.config.read().clone();
            let builder = SnapshotBuilder::new(cfg);
            let positions = loop_state.book.load();

            match builder.run(&positions, loop_feed.as_ref()).await {
                Ok(snapshot) => loop_state.record_snapshot(snapshot),
                // The cycle failed to persist; keep the loop alive and retry
                // on the next tick.
                Err(e) => error!(error = %e, "monitoring cycle failed"),
            }
        }
    });

    // ── 5. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");
    monitor.abort();

    let cfg = state.config.read().clone();
    if let Err(e) = cfg.save(CONFIG_PATH) {
        warn!(error = %e, "Failed to save config on shutdown");
    }

    info!("Exit Sentinel stopped");
    Ok(())
}
