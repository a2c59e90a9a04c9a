//! Level Sizer
//!
//! Keeps a rolling one-minute window of Binance trades for one market pair
//! and serves a volatility-scaled order level size computed from it.

pub mod api;
pub mod middleware;
pub mod models;
pub mod scrapers;
pub mod sizing;
