use chrono::{DateTime, Utc};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One executed trade on the market pair.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    /// Exchange trade id, the upsert key.
    pub id: String,
    /// Quote currency per unit.
    pub price: f64,
    /// Base currency quantity.
    pub amount: f64,
    pub timestamp: DateTime<Utc>,
}

impl Trade {
    /// Build a trade from an epoch-millisecond exchange timestamp.
    pub fn from_millis(id: impl Into<String>, price: f64, amount: f64, ts_ms: i64) -> Option<Self> {
        let timestamp = DateTime::<Utc>::from_timestamp_millis(ts_ms)?;
        Some(Self {
            id: id.into(),
            price,
            amount,
            timestamp,
        })
    }
}

/// Retention horizon and the shorter sub-window used for sizing.
#[derive(Debug, Clone, Copy)]
pub struct WindowConfig {
    pub horizon: Duration,
    pub relevant: Duration,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            horizon: Duration::from_secs(60),
            relevant: Duration::from_secs(10),
        }
    }
}

/// Application configuration
#[derive(Parser, Debug, Clone)]
#[command(name = "level-sizer")]
#[command(about = "Serve a volatility-scaled level size from a rolling Binance trade window")]
pub struct AppConfig {
    /// Base asset of the market pair
    #[arg(long, env = "LEVEL_SIZER_BASE", default_value = "btc")]
    pub base: String,

    /// Quote asset of the market pair
    #[arg(long, env = "LEVEL_SIZER_QUOTE", default_value = "fdusd")]
    pub quote: String,

    /// Number of recent trades requested for the bootstrap batch
    #[arg(long, env = "LEVEL_SIZER_BOOTSTRAP_LIMIT", default_value_t = 10_000)]
    pub bootstrap_limit: usize,

    /// Binance REST base URL
    #[arg(long, env = "BINANCE_REST_BASE", default_value = "https://api.binance.com")]
    pub rest_base: String,

    /// Address the HTTP server binds to
    #[arg(long, env = "LEVEL_SIZER_BIND", default_value = "127.0.0.1:8000")]
    pub bind: String,

    /// Retention horizon of the trade window, in seconds
    #[arg(long, env = "LEVEL_SIZER_HORIZON_SECS", default_value_t = 60)]
    pub horizon_secs: u64,

    /// Sub-window used for the level size statistic, in seconds
    #[arg(long, env = "LEVEL_SIZER_RELEVANT_SECS", default_value_t = 10)]
    pub relevant_secs: u64,
}

impl AppConfig {
    pub fn window(&self) -> WindowConfig {
        WindowConfig {
            horizon: Duration::from_secs(self.horizon_secs),
            relevant: Duration::from_secs(self.relevant_secs),
        }
    }

    /// Exchange symbol, e.g. `BTCFDUSD`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote).to_ascii_uppercase()
    }
}
