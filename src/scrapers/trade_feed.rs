//! Trade feed collaborator contract.
//!
//! The ingestion task only sees this trait; the Binance implementation lives
//! in `binance_trade_feed`, tests drive ingestion through `ScriptedFeed`.

use anyhow::Result;

use crate::models::Trade;

/// Source of recent and live trades for one market pair.
///
/// Futures are `?Send` because the exchange stream initialisation is not
/// `Send`; feeds run on a `LocalSet`.
#[async_trait::async_trait(?Send)]
pub trait TradeFeed {
    /// Open the live subscription.
    async fn subscribe(&mut self) -> Result<()>;

    /// Fetch up to `limit` of the most recent trades, oldest first.
    async fn fetch_recent(&mut self, limit: usize) -> Result<Vec<Trade>>;

    /// Wait for the next arrival(s). Never returns an empty batch; a feed that
    /// can no longer produce trades returns an error.
    async fn next_trades(&mut self) -> Result<Vec<Trade>>;

    /// Release the subscription. Safe to call more than once.
    async fn close(&mut self) -> Result<()>;
}

#[cfg(test)]
pub mod scripted {
    use super::*;
    use anyhow::anyhow;
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Step yielded by `next_trades`.
    pub enum Step {
        Trades(Vec<Trade>),
        Fail(&'static str),
    }

    /// In-memory feed for ingestion tests.
    ///
    /// Once the script runs out, `next_trades` pends forever, like an idle
    /// exchange stream.
    pub struct ScriptedFeed {
        pub bootstrap: Vec<Trade>,
        pub steps: VecDeque<Step>,
        pub fail_subscribe: bool,
        pub fail_fetch: bool,
        pub fail_close: bool,
        pub closes: Rc<Cell<u32>>,
        pub subscribed: bool,
        pub requested_limit: Option<usize>,
    }

    impl ScriptedFeed {
        pub fn new(bootstrap: Vec<Trade>, steps: Vec<Step>) -> Self {
            Self {
                bootstrap,
                steps: steps.into(),
                fail_subscribe: false,
                fail_fetch: false,
                fail_close: false,
                closes: Rc::new(Cell::new(0)),
                subscribed: false,
                requested_limit: None,
            }
        }

        pub fn close_counter(&self) -> Rc<Cell<u32>> {
            Rc::clone(&self.closes)
        }
    }

    #[async_trait::async_trait(?Send)]
    impl TradeFeed for ScriptedFeed {
        async fn subscribe(&mut self) -> Result<()> {
            if self.fail_subscribe {
                return Err(anyhow!("subscribe refused"));
            }
            self.subscribed = true;
            Ok(())
        }

        async fn fetch_recent(&mut self, limit: usize) -> Result<Vec<Trade>> {
            if self.fail_fetch {
                return Err(anyhow!("fetch failed"));
            }
            self.requested_limit = Some(limit);
            let skip = self.bootstrap.len().saturating_sub(limit);
            Ok(self.bootstrap.iter().skip(skip).cloned().collect())
        }

        async fn next_trades(&mut self) -> Result<Vec<Trade>> {
            match self.steps.pop_front() {
                Some(Step::Trades(trades)) => Ok(trades),
                Some(Step::Fail(msg)) => Err(anyhow!(msg)),
                None => std::future::pending().await,
            }
        }

        async fn close(&mut self) -> Result<()> {
            self.closes.set(self.closes.get() + 1);
            self.subscribed = false;
            if self.fail_close {
                return Err(anyhow!("close failed"));
            }
            Ok(())
        }
    }
}
