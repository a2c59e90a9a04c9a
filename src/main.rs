//! Level Sizer
//!
//! One background task keeps the trade window fed from Binance; the HTTP
//! server answers `GET /` from snapshots of that window.

use anyhow::{Context, Result};
use clap::Parser;
use dotenv::dotenv;
use std::sync::Arc;
use tokio::{net::TcpListener, task::LocalSet};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use level_sizer::{
    api::{self, LevelSizeState},
    models::AppConfig,
    scrapers::{BinanceTradeFeed, TradeIngestor, TradeWindow},
};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    dotenv().ok();
    init_tracing();

    let config = AppConfig::parse();
    let window_config = config.window();
    info!(
        symbol = %config.symbol(),
        horizon_secs = config.horizon_secs,
        relevant_secs = config.relevant_secs,
        "Level sizer starting"
    );

    let window = Arc::new(TradeWindow::new(window_config.horizon));
    let feed = BinanceTradeFeed::new(&config.base, &config.quote, &config.rest_base)?;
    let cancel = CancellationToken::new();

    // The barter-data stream is `!Send`, so ingestion lives on a LocalSet.
    let local = LocalSet::new();
    local
        .run_until(async move {
            let ingest = TradeIngestor::new(feed, Arc::clone(&window), config.bootstrap_limit)
                .spawn_local(cancel.clone());

            let app = api::app(LevelSizeState::new(Arc::clone(&window), window_config));
            let listener = TcpListener::bind(&config.bind)
                .await
                .with_context(|| format!("Failed to bind {}", config.bind))?;
            info!("API server listening on {}", config.bind);

            axum::serve(listener, app)
                .with_graceful_shutdown(shutdown_signal(cancel.clone()))
                .await
                .context("Server error")?;

            cancel.cancel();
            match ingest.await {
                Ok(Ok(stats)) => info!(
                    bootstrapped = stats.bootstrapped,
                    upserts = stats.upserts,
                    superseded = stats.superseded,
                    "Trade ingestion stopped"
                ),
                // Already logged by the task.
                Ok(Err(_)) => {}
                Err(e) => error!(error = %e, "Trade ingestion task panicked"),
            }

            Ok::<_, anyhow::Error>(())
        })
        .await
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!(error = %e, "failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    info!("Shutdown requested");
    cancel.cancel();
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,level_sizer=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
