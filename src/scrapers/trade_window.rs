//! Rolling Trade Window
//!
//! Authoritative, horizon-bounded set of recent trades for one market pair.
//!
//! - One writer (the ingestion task) calls `replace_all` / `upsert`
//! - Any number of readers call `snapshot` and get an owned copy
//! - Every mutation runs the horizon eviction pass under the same write guard,
//!   so a reader never sees a half-applied upsert or a half-evicted window
//!
//! The lock is a `parking_lot::RwLock` held only for the copy-out or the
//! upsert+evict sequence, never across an `.await`.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use crate::models::Trade;

/// Price/amount/time stored per trade id.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TradeFields {
    price: f64,
    amount: f64,
    timestamp: DateTime<Utc>,
}

/// Keyed storage with arrival-order iteration.
///
/// `by_seq` keeps arrival order, `seq_by_id` gives O(log n) upsert by id. An
/// overwrite keeps the original arrival slot.
#[derive(Debug, Default)]
struct WindowState {
    by_seq: BTreeMap<u64, (String, TradeFields)>,
    seq_by_id: HashMap<String, u64>,
    next_seq: u64,
}

impl WindowState {
    fn from_trades(trades: impl IntoIterator<Item = Trade>) -> Self {
        let mut state = Self::default();
        for trade in trades {
            state.upsert(trade);
        }
        state
    }

    fn upsert(&mut self, trade: Trade) {
        let fields = TradeFields {
            price: trade.price,
            amount: trade.amount,
            timestamp: trade.timestamp,
        };

        if let Some(seq) = self.seq_by_id.get(&trade.id) {
            if let Some(slot) = self.by_seq.get_mut(seq) {
                slot.1 = fields;
                return;
            }
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.seq_by_id.insert(trade.id.clone(), seq);
        self.by_seq.insert(seq, (trade.id, fields));
    }

    /// Drop every entry not strictly newer than `cutoff`. Returns evicted count.
    fn evict_before(&mut self, cutoff: DateTime<Utc>) -> usize {
        let before = self.by_seq.len();
        let seq_by_id = &mut self.seq_by_id;
        self.by_seq.retain(|_, (id, fields)| {
            let keep = fields.timestamp > cutoff;
            if !keep {
                seq_by_id.remove(id);
            }
            keep
        });
        before - self.by_seq.len()
    }

    fn to_trades(&self) -> Vec<Trade> {
        self.by_seq
            .values()
            .map(|(id, f)| Trade {
                id: id.clone(),
                price: f.price,
                amount: f.amount,
                timestamp: f.timestamp,
            })
            .collect()
    }
}

/// Immutable point-in-time copy of the window, oldest arrival first.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowSnapshot {
    trades: Vec<Trade>,
}

impl WindowSnapshot {
    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    pub fn len(&self) -> usize {
        self.trades.len()
    }

    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Trade> {
        self.trades.iter().find(|t| t.id == id)
    }

    /// Trades strictly newer than `cutoff`, in arrival order.
    pub fn since(&self, cutoff: DateTime<Utc>) -> Vec<&Trade> {
        self.trades.iter().filter(|t| t.timestamp > cutoff).collect()
    }
}

#[derive(Debug)]
pub struct TradeWindow {
    /// `None` until the first bootstrap write.
    inner: RwLock<Option<WindowState>>,
    horizon: Duration,
}

impl TradeWindow {
    pub fn new(horizon: std::time::Duration) -> Self {
        Self {
            inner: RwLock::new(None),
            horizon: Duration::from_std(horizon).unwrap_or_else(|_| Duration::seconds(60)),
        }
    }

    pub fn is_initialized(&self) -> bool {
        self.inner.read().is_some()
    }

    /// Bootstrap write: overwrite the whole window with `trades`.
    ///
    /// A stale batch is trimmed to the horizon right away.
    pub fn replace_all(&self, trades: Vec<Trade>) {
        self.replace_all_at(trades, Utc::now());
    }

    pub fn replace_all_at(&self, trades: Vec<Trade>, now: DateTime<Utc>) {
        let mut state = WindowState::from_trades(trades);
        state.evict_before(now - self.horizon);
        *self.inner.write() = Some(state);
    }

    /// Insert or overwrite `trade` by id, then evict everything older than the horizon.
    ///
    /// Returns the number of evicted trades. Before the first `replace_all`
    /// there is no window to write to and the trade is dropped.
    pub fn upsert(&self, trade: Trade) -> usize {
        self.upsert_at(trade, Utc::now())
    }

    pub fn upsert_at(&self, trade: Trade, now: DateTime<Utc>) -> usize {
        let cutoff = now - self.horizon;
        let mut guard = self.inner.write();
        let Some(state) = guard.as_mut() else {
            debug!(trade_id = %trade.id, "trade window not bootstrapped, dropping upsert");
            return 0;
        };
        state.upsert(trade);
        state.evict_before(cutoff)
    }

    /// Owned copy of the current contents, or `None` before bootstrap.
    pub fn snapshot(&self) -> Option<WindowSnapshot> {
        self.inner.read().as_ref().map(|state| WindowSnapshot {
            trades: state.to_trades(),
        })
    }

    /// Number of trades held, `None` before bootstrap.
    pub fn len(&self) -> Option<usize> {
        self.inner.read().as_ref().map(|s| s.by_seq.len())
    }
}
