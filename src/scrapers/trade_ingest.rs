//! Trade ingestion task
//!
//! Drives a `TradeWindow` from a `TradeFeed` for the life of the process:
//! - BOOTSTRAPPING: subscribe, fetch a recent batch, `replace_all`
//! - STREAMING: await arrivals, upsert the latest trade of each wake-up
//! - TERMINATING: release the feed on every exit path (failure or cancel)
//!
//! Failures are not retried here; they end the task and the window keeps its
//! last contents.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, trace, warn};

use super::trade_feed::TradeFeed;
use super::trade_window::TradeWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IngestState {
    Bootstrapping,
    Streaming,
    Terminating,
}

impl std::fmt::Display for IngestState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bootstrapping => write!(f, "BOOTSTRAPPING"),
            Self::Streaming => write!(f, "STREAMING"),
            Self::Terminating => write!(f, "TERMINATING"),
        }
    }
}

/// Counters reported when ingestion stops on cancellation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    /// Trades in the bootstrap batch, 0 if cancelled before it landed.
    pub bootstrapped: usize,
    /// Upserts applied while streaming.
    pub upserts: u64,
    /// Arrivals dropped because a later trade arrived in the same wake-up.
    pub superseded: u64,
}

pub struct TradeIngestor<F> {
    feed: F,
    window: Arc<TradeWindow>,
    bootstrap_limit: usize,
    state: IngestState,
    stats: IngestStats,
}

impl<F: TradeFeed + 'static> TradeIngestor<F> {
    pub fn new(feed: F, window: Arc<TradeWindow>, bootstrap_limit: usize) -> Self {
        Self {
            feed,
            window,
            bootstrap_limit,
            state: IngestState::Bootstrapping,
            stats: IngestStats::default(),
        }
    }

    /// Spawn on the current `LocalSet`. Must be called from inside one.
    pub fn spawn_local(self, cancel: CancellationToken) -> JoinHandle<Result<IngestStats>> {
        tokio::task::spawn_local(async move {
            let result = self.run(cancel).await;
            if let Err(e) = &result {
                error!(error = %format!("{e:#}"), "trade ingestion stopped");
            }
            result
        })
    }

    /// Run until cancelled or the feed fails. The feed is closed before returning.
    pub async fn run(mut self, cancel: CancellationToken) -> Result<IngestStats> {
        let outcome = self.drive(&cancel).await;

        self.transition(IngestState::Terminating);
        if let Err(e) = self.feed.close().await {
            // Never replaces the error that ended the task.
            warn!(error = %e, "failed to release trade feed");
        }

        outcome.map(|()| self.stats)
    }

    async fn drive(&mut self, cancel: &CancellationToken) -> Result<()> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!("trade ingestion cancelled during bootstrap");
                return Ok(());
            }
            res = self.bootstrap() => res?,
        }

        self.transition(IngestState::Streaming);

        loop {
            let batch = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!(upserts = self.stats.upserts, "trade ingestion cancelled");
                    return Ok(());
                }
                batch = self.feed.next_trades() => batch.context("trade stream failed")?,
            };

            let arrivals = batch.len();
            // Latest wins: only the newest trade of a wake-up is applied.
            let Some(latest) = batch.into_iter().last() else {
                continue;
            };
            self.stats.superseded += arrivals.saturating_sub(1) as u64;

            let id = latest.id.clone();
            let evicted = self.window.upsert(latest);
            self.stats.upserts += 1;
            trace!(trade_id = %id, arrivals, evicted, "trade applied");
        }
    }

    async fn bootstrap(&mut self) -> Result<()> {
        self.feed
            .subscribe()
            .await
            .context("failed to subscribe to trade stream")?;

        let trades = self
            .feed
            .fetch_recent(self.bootstrap_limit)
            .await
            .context("failed to fetch bootstrap trades")?;

        let fetched = trades.len();
        self.window.replace_all(trades);
        self.stats.bootstrapped = fetched;

        info!(
            fetched,
            retained = self.window.len().unwrap_or(0),
            "trade window bootstrapped"
        );
        Ok(())
    }

    fn transition(&mut self, next: IngestState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "trade ingestion state change");
            self.state = next;
        }
    }
}
