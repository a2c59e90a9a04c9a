pub mod binance_trade_feed; // Binance spot trades (barter-data stream + REST bootstrap)
pub mod trade_feed;
pub mod trade_ingest; // Bootstrap + streaming state machine
pub mod trade_window; // Horizon-bounded window shared with the HTTP layer

pub use binance_trade_feed::BinanceTradeFeed;
pub use trade_feed::TradeFeed;
pub use trade_ingest::{IngestState, IngestStats, TradeIngestor};
pub use trade_window::{TradeWindow, WindowSnapshot};
