//! Volatility-scaled level size.
//!
//! Maps the sample standard deviation of recent trade prices onto a fixed
//! calibration curve (size as a fraction of price), then scales by the latest
//! price.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::scrapers::trade_window::WindowSnapshot;

const CURVE_POINTS: usize = 10;
const STD_DEV_LOW: f64 = 5.0;
const STD_DEV_HIGH: f64 = 50.0;
const FRACTION_LOW: f64 = 0.00005;
const FRACTION_HIGH: f64 = 0.0004;

/// Piecewise-linear curve from price std-dev to size fraction.
///
/// Knots are log-spaced on x and linear on y. Inputs outside the knot range
/// clamp to the endpoint outputs.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationCurve {
    xs: Vec<f64>,
    ys: Vec<f64>,
}

impl Default for CalibrationCurve {
    fn default() -> Self {
        let step = (STD_DEV_HIGH / STD_DEV_LOW).ln() / (CURVE_POINTS - 1) as f64;
        let xs = (0..CURVE_POINTS)
            .map(|i| STD_DEV_LOW * (step * i as f64).exp())
            .collect();
        let ys = (0..CURVE_POINTS)
            .map(|i| {
                FRACTION_LOW + (FRACTION_HIGH - FRACTION_LOW) * i as f64 / (CURVE_POINTS - 1) as f64
            })
            .collect();
        Self { xs, ys }
    }
}

impl CalibrationCurve {
    pub fn min_output(&self) -> f64 {
        self.ys[0]
    }

    pub fn max_output(&self) -> f64 {
        self.ys[self.ys.len() - 1]
    }

    pub fn knots(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.xs.iter().copied().zip(self.ys.iter().copied())
    }

    pub fn interpolate(&self, x: f64) -> f64 {
        let last = self.xs.len() - 1;
        if x <= self.xs[0] {
            return self.ys[0];
        }
        if x >= self.xs[last] {
            return self.ys[last];
        }

        // First knot strictly above x; x lies in [xs[i-1], xs[i]).
        let i = self.xs.partition_point(|&k| k <= x);
        let (x0, x1) = (self.xs[i - 1], self.xs[i]);
        let (y0, y1) = (self.ys[i - 1], self.ys[i]);
        y0 + (y1 - y0) * (x - x0) / (x1 - x0)
    }
}

/// Result served by `GET /`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LevelSize {
    pub level_size: f64,
    pub level_size_relative: f64,
    /// Trades in the whole window.
    pub trades: usize,
    /// Trades inside the relevant sub-window.
    pub relevant_trades: usize,
    pub first_trade: DateTime<Utc>,
    pub first_relevant_trade: DateTime<Utc>,
}

impl LevelSize {
    /// `None` when no trade falls inside the relevant sub-window.
    pub fn compute(
        snapshot: &WindowSnapshot,
        now: DateTime<Utc>,
        relevant: Duration,
        curve: &CalibrationCurve,
    ) -> Option<Self> {
        let relevant_trades = snapshot.since(now - relevant);
        let first_relevant = relevant_trades.first()?;
        let latest = relevant_trades.last()?;
        let first_trade = snapshot.trades().first()?;

        let dispersion = price_std_dev(relevant_trades.iter().map(|t| t.price));
        let fraction = curve.interpolate(dispersion);
        let level_size = fraction * latest.price;

        Some(Self {
            level_size,
            level_size_relative: level_size / latest.price,
            trades: snapshot.len(),
            relevant_trades: relevant_trades.len(),
            first_trade: first_trade.timestamp,
            first_relevant_trade: first_relevant.timestamp,
        })
    }
}

/// Sample (n-1) standard deviation; a single price has zero dispersion.
fn price_std_dev(prices: impl Iterator<Item = f64>) -> f64 {
    let prices: Vec<f64> = prices.collect();
    if prices.len() < 2 {
        return 0.0;
    }
    let sd = prices.std_dev();
    if sd.is_finite() {
        sd
    } else {
        0.0
    }
}
