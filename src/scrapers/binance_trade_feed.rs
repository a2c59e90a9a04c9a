//! Binance spot trade feed for a single market pair.
//!
//! - Live trades: barter-data `PublicTrades` stream
//! - Bootstrap batch: REST `GET /api/v3/trades`
//!
//! Transport reconnects are handled inside barter-data; this feed only logs
//! them. A stream that ends is reported as an error to the ingestion task.

use anyhow::{anyhow, bail, Context, Result};
use barter_data::{
    exchange::binance::spot::BinanceSpot,
    streams::{reconnect::Event as ReconnectEvent, Streams},
    subscription::trade::PublicTrades,
};
use barter_instrument::instrument::market_data::kind::MarketDataInstrumentKind;
use futures_util::{stream::LocalBoxStream, FutureExt, StreamExt};
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::trade_feed::TradeFeed;
use crate::models::Trade;

/// Binance caps `/api/v3/trades` at this many rows per request.
const MAX_REST_TRADES_LIMIT: usize = 1000;

pub struct BinanceTradeFeed {
    base: String,
    quote: String,
    rest_base: String,
    client: Client,
    stream: Option<LocalBoxStream<'static, Trade>>,
}

impl BinanceTradeFeed {
    pub fn new(base: &str, quote: &str, rest_base: &str) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent("level-sizer/0.1")
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base: base.to_ascii_lowercase(),
            quote: quote.to_ascii_lowercase(),
            rest_base: rest_base.trim_end_matches('/').to_string(),
            client,
            stream: None,
        })
    }

    /// Exchange symbol, e.g. `BTCFDUSD`.
    pub fn symbol(&self) -> String {
        format!("{}{}", self.base, self.quote).to_ascii_uppercase()
    }
}

#[async_trait::async_trait(?Send)]
impl TradeFeed for BinanceTradeFeed {
    async fn subscribe(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        // NOTE: barter-data's `StreamBuilder` futures are `!Send`; this runs on a LocalSet.
        let streams = Streams::<PublicTrades>::builder()
            .subscribe([(
                BinanceSpot::default(),
                self.base.as_str(),
                self.quote.as_str(),
                MarketDataInstrumentKind::Spot,
                PublicTrades,
            )])
            .init()
            .await
            .context("failed to init barter-data binance trade stream")?;

        let trades = streams
            .select_all()
            .filter_map(|event| async move {
                match event {
                    ReconnectEvent::Reconnecting(exchange) => {
                        warn!(?exchange, "binance trade stream reconnecting");
                        None
                    }
                    ReconnectEvent::Item(Ok(market_event)) => {
                        let trade = Trade {
                            id: market_event.kind.id.to_string(),
                            price: market_event.kind.price,
                            amount: market_event.kind.amount,
                            timestamp: market_event.time_exchange,
                        };
                        if trade.price.is_finite() && trade.price > 0.0 {
                            Some(trade)
                        } else {
                            debug!(trade_id = %trade.id, price = trade.price, "dropping trade with invalid price");
                            None
                        }
                    }
                    ReconnectEvent::Item(Err(e)) => {
                        debug!(error = %e, "binance trade stream error");
                        None
                    }
                }
            })
            .boxed_local();

        self.stream = Some(trades);
        info!(symbol = %self.symbol(), "subscribed to binance trade stream");
        Ok(())
    }

    async fn fetch_recent(&mut self, limit: usize) -> Result<Vec<Trade>> {
        let capped = limit.clamp(1, MAX_REST_TRADES_LIMIT);
        if capped != limit {
            warn!(
                requested = limit,
                capped, "bootstrap limit outside binance range, clamping"
            );
        }

        let url = format!("{}/api/v3/trades", self.rest_base);
        let symbol = self.symbol();
        let limit_param = capped.to_string();
        let response = self
            .client
            .get(&url)
            .query(&[("symbol", symbol.as_str()), ("limit", limit_param.as_str())])
            .send()
            .await
            .with_context(|| format!("request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            bail!("binance API error {}: {}", status, text);
        }

        let rows: Vec<RestTrade> = response
            .json()
            .await
            .context("Failed to parse binance trades response")?;

        let trades = rows
            .into_iter()
            .map(RestTrade::into_trade)
            .collect::<Result<Vec<_>>>()?;

        debug!(symbol = %symbol, count = trades.len(), "fetched recent trades");
        Ok(trades)
    }

    async fn next_trades(&mut self) -> Result<Vec<Trade>> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| anyhow!("binance trade stream not subscribed"))?;

        let first = stream
            .next()
            .await
            .ok_or_else(|| anyhow!("binance trade stream ended"))?;

        // Drain whatever is already buffered without suspending again.
        let mut batch = vec![first];
        while let Some(Some(trade)) = stream.next().now_or_never() {
            batch.push(trade);
        }
        Ok(batch)
    }

    async fn close(&mut self) -> Result<()> {
        if self.stream.take().is_some() {
            info!(symbol = %self.symbol(), "binance trade stream released");
        }
        Ok(())
    }
}

/// Row of `GET /api/v3/trades`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RestTrade {
    id: u64,
    price: String,
    qty: String,
    /// Epoch milliseconds.
    time: i64,
}

impl RestTrade {
    fn into_trade(self) -> Result<Trade> {
        let price: f64 = fast_float::parse(&self.price)
            .map_err(|_| anyhow!("invalid price {:?} for trade {}", self.price, self.id))?;
        let amount: f64 = fast_float::parse(&self.qty)
            .map_err(|_| anyhow!("invalid qty {:?} for trade {}", self.qty, self.id))?;

        Trade::from_millis(self.id.to_string(), price, amount, self.time)
            .ok_or_else(|| anyhow!("invalid timestamp {} for trade {}", self.time, self.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"[
        {"id":28457,"price":"4.00000100","qty":"12.00000000","quoteQty":"48.000012","time":1499865549590,"isBuyerMaker":true,"isBestMatch":true},
        {"id":28458,"price":"4.00000200","qty":"0.50000000","quoteQty":"2.000001","time":1499865549591,"isBuyerMaker":false,"isBestMatch":true}
    ]"#;

    #[test]
    fn test_rest_trades_parse() {
        let rows: Vec<RestTrade> = serde_json::from_str(SAMPLE).unwrap();
        let trades: Vec<Trade> = rows
            .into_iter()
            .map(RestTrade::into_trade)
            .collect::<Result<_>>()
            .unwrap();

        assert_eq!(trades.len(), 2);
        assert_eq!(trades[0].id, "28457");
        assert!((trades[0].price - 4.000001).abs() < 1e-12);
        assert_eq!(trades[0].amount, 12.0);
        assert_eq!(trades[1].timestamp.timestamp_millis(), 1_499_865_549_591);
    }

    #[test]
    fn test_rest_trade_rejects_bad_price() {
        let row = RestTrade {
            id: 1,
            price: "abc".into(),
            qty: "1".into(),
            time: 0,
        };
        assert!(row.into_trade().is_err());
    }

    #[test]
    fn test_symbol_normalisation() {
        let feed = BinanceTradeFeed::new("BTC", "fdusd", "https://api.binance.com/").unwrap();
        assert_eq!(feed.symbol(), "BTCFDUSD");
        assert_eq!(feed.rest_base, "https://api.binance.com");
    }

    #[tokio::test]
    async fn test_next_trades_requires_subscription() {
        let mut feed = BinanceTradeFeed::new("btc", "fdusd", "https://api.binance.com").unwrap();
        assert!(feed.next_trades().await.is_err());
        // Closing an unopened feed is a no-op.
        feed.close().await.unwrap();
        feed.close().await.unwrap();
    }
}
