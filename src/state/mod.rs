//! The concurrent in-memory state engine: the single authority for markets,
//! order books, and trade logs, shared by every producer (ingestion) and
//! consumer (signals, scanner, alerts, API) via dependency injection of one
//! `Arc<StateEngine>`.

pub mod timeseries;

use crate::error::{EngineError, EngineResult};
use crate::models::{Market, MarketSnapshot, OrderBook, PriceLevel, Trade};
use parking_lot::RwLock;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use timeseries::TimeSeriesStore;

pub struct StateEngine {
    markets: RwLock<HashMap<String, Market>>,
    books: RwLock<HashMap<String, OrderBook>>,
    trades: RwLock<HashMap<String, VecDeque<Trade>>>,
    timeseries: TimeSeriesStore,
    trade_ring_capacity: usize,
    invariant_violations: RwLock<VecDeque<String>>,
}

impl StateEngine {
    pub fn new(trade_ring_capacity: usize, snapshot_ring_capacity: usize) -> Arc<Self> {
        Arc::new(Self {
            markets: RwLock::new(HashMap::new()),
            books: RwLock::new(HashMap::new()),
            trades: RwLock::new(HashMap::new()),
            timeseries: TimeSeriesStore::new(snapshot_ring_capacity),
            trade_ring_capacity,
            invariant_violations: RwLock::new(VecDeque::with_capacity(256)),
        })
    }

    /// Registers a market on first appearance, or refreshes its fields on
    /// re-poll. Never removes a market. Gives it an empty book if it has
    /// none yet, so reads never see a 404 for a known-but-bookless market.
    pub fn register_market(&self, market: Market) {
        let ticker = market.ticker.clone();
        self.markets.write().insert(ticker.clone(), market);
        self.books.write().entry(ticker).or_insert_with(|| OrderBook::new(""));
    }

    pub fn get_market(&self, ticker: &str) -> Option<Market> {
        self.markets.read().get(ticker).cloned()
    }

    pub fn get_all_markets(&self) -> Vec<Market> {
        self.markets.read().values().cloned().collect()
    }

    pub fn market_count(&self) -> usize {
        self.markets.read().len()
    }

    /// Replaces a market's order book wholesale from an upstream full-book
    /// response, applying the binary-market derivation rule inside
    /// [`OrderBook`]. Returns `NotFound` if the ticker was never registered.
    pub fn update_from_upstream(
        &self,
        ticker: &str,
        yes_bids: Vec<PriceLevel>,
        no_bids: Vec<PriceLevel>,
        sequence: u64,
    ) -> EngineResult<()> {
        if !self.markets.read().contains_key(ticker) {
            return Err(EngineError::NotFound(format!("unknown market {ticker}")));
        }
        self.check_invariants(ticker, &yes_bids, &no_bids);
        {
            let mut books = self.books.write();
            let book = books.entry(ticker.to_string()).or_insert_with(|| OrderBook::new(ticker));
            book.ticker = ticker.to_string();
            book.replace_side(yes_bids, no_bids, sequence);
        }
        // Snapshot only after the exclusive book lock is released: it reacquires
        // its own (trade-log) lock and must not nest inside the engine's lock.
        self.record_snapshot(ticker);
        Ok(())
    }

    /// Applies an incremental delta from the stream. Same invariant handling
    /// as [`Self::update_from_upstream`], just against one side/price/size.
    pub fn apply_delta(&self, ticker: &str, side_is_yes: bool, price: u32, size: u64, sequence: u64) -> EngineResult<()> {
        if price > 10_000 {
            self.record_violation(format!("{ticker}: price {price} outside 0-10000"));
        }
        {
            let mut books = self.books.write();
            let book = books.entry(ticker.to_string()).or_insert_with(|| OrderBook::new(ticker));
            book.apply_delta(side_is_yes, price, size, sequence);
            if book.yes_spread().is_none() && book.best_yes_bid().is_some() && book.best_yes_ask().is_some() {
                drop(books);
                self.record_violation(format!("{ticker}: crossed book after delta"));
                self.record_snapshot(ticker);
                return Ok(());
            }
        }
        self.record_snapshot(ticker);
        Ok(())
    }

    /// Captures a [`MarketSnapshot`] for `ticker` from its current book plus
    /// the trades from the last five minutes, per the snapshot-on-every-update
    /// contract. Called only after the engine's own lock has been released.
    fn record_snapshot(&self, ticker: &str) {
        let Some(book) = self.get_order_book(ticker) else { return };
        let trades = self.recent_trades(ticker, 300);
        let best_bid = book.best_yes_bid();
        let best_ask = book.best_yes_ask();
        let mid = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((b + a) as f64 / 200.0),
            _ => None,
        };
        let last_trade = trades.last();
        self.push_snapshot(MarketSnapshot {
            ticker: ticker.to_string(),
            timestamp: chrono::Utc::now(),
            best_yes_bid: best_bid,
            best_yes_ask: best_ask,
            mid,
            spread: book.yes_spread(),
            bid_depth: book.bid_depth(usize::MAX),
            ask_depth: book.ask_depth(usize::MAX),
            imbalance_ratio: book.imbalance_ratio(usize::MAX),
            microprice: book.microprice(),
            trade_count_window: trades.len() as u64,
            last_trade_price: last_trade.map(|t| t.yes_price),
            last_trade_time: last_trade.map(|t| t.created_time),
        });
    }

    fn check_invariants(&self, ticker: &str, yes_bids: &[PriceLevel], no_bids: &[PriceLevel]) {
        for (price, size) in yes_bids.iter().chain(no_bids.iter()) {
            if *price > 10_000 {
                self.record_violation(format!("{ticker}: price {price} outside 0-10000"));
            }
            if (*size as i64) < 0 {
                self.record_violation(format!("{ticker}: negative quantity {size}"));
            }
        }
    }

    fn record_violation(&self, message: String) {
        tracing::debug!(violation = %message, "invariant violation");
        let mut log = self.invariant_violations.write();
        if log.len() >= 256 {
            log.pop_front();
        }
        log.push_back(message);
    }

    pub fn recent_invariant_violations(&self) -> Vec<String> {
        self.invariant_violations.read().iter().cloned().collect()
    }

    pub fn get_order_book(&self, ticker: &str) -> Option<OrderBook> {
        self.books.read().get(ticker).cloned()
    }

    /// Appends a trade to the per-market ring, rotating the oldest out at capacity.
    pub fn add_trade(&self, trade: Trade) {
        let mut trades = self.trades.write();
        let ring = trades.entry(trade.ticker.clone()).or_insert_with(VecDeque::new);
        if ring.len() >= self.trade_ring_capacity {
            ring.pop_front();
        }
        ring.push_back(trade);
    }

    /// Trades for `ticker` within the last `window_secs`, oldest first.
    pub fn recent_trades(&self, ticker: &str, window_secs: i64) -> Vec<Trade> {
        let cutoff = chrono::Utc::now() - chrono::Duration::seconds(window_secs);
        let trades = self.trades.read();
        match trades.get(ticker) {
            Some(ring) => ring.iter().filter(|t| t.created_time >= cutoff).cloned().collect(),
            None => Vec::new(),
        }
    }

    pub fn all_trades(&self, ticker: &str) -> Vec<Trade> {
        self.trades.read().get(ticker).map(|r| r.iter().cloned().collect()).unwrap_or_default()
    }

    pub fn push_snapshot(&self, snapshot: MarketSnapshot) {
        self.timeseries.push(snapshot);
    }

    pub fn recent_snapshots(&self, ticker: &str, limit: usize) -> Vec<MarketSnapshot> {
        self.timeseries.recent(ticker, limit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_a_market_gives_it_an_empty_book() {
        let engine = StateEngine::new(100, 100);
        engine.register_market(Market::new("TICK-1", "Test", "EVT-1"));
        let book = engine.get_order_book("TICK-1").unwrap();
        assert!(book.best_yes_bid().is_none());
    }

    #[test]
    fn update_from_upstream_rejects_unknown_ticker() {
        let engine = StateEngine::new(100, 100);
        let result = engine.update_from_upstream("GHOST", vec![], vec![], 1);
        assert!(matches!(result, Err(EngineError::NotFound(_))));
    }

    #[test]
    fn reregistering_a_market_does_not_clear_its_book() {
        let engine = StateEngine::new(100, 100);
        engine.register_market(Market::new("TICK-1", "v1", "EVT-1"));
        engine.update_from_upstream("TICK-1", vec![(50, 10)], vec![(45, 20)], 1).unwrap();
        engine.register_market(Market::new("TICK-1", "v2", "EVT-1"));
        let book = engine.get_order_book("TICK-1").unwrap();
        assert_eq!(book.best_yes_bid(), Some(50));
    }

    #[test]
    fn out_of_range_price_is_recorded_but_still_accepted() {
        let engine = StateEngine::new(100, 100);
        engine.register_market(Market::new("TICK-1", "t", "EVT-1"));
        engine.update_from_upstream("TICK-1", vec![(20_000, 10)], vec![], 1).unwrap();
        assert!(!engine.recent_invariant_violations().is_empty());
        assert_eq!(engine.get_order_book("TICK-1").unwrap().best_yes_bid(), Some(20_000));
    }

    #[test]
    fn update_from_upstream_records_a_snapshot() {
        let engine = StateEngine::new(100, 100);
        engine.register_market(Market::new("TICK-1", "t", "EVT-1"));
        engine.update_from_upstream("TICK-1", vec![(50, 10)], vec![(45, 20)], 1).unwrap();
        let snapshots = engine.recent_snapshots("TICK-1", 10);
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].best_yes_bid, Some(50));
    }

    #[test]
    fn trade_ring_rotates_at_capacity() {
        use crate::models::TradeSide;
        let engine = StateEngine::new(2, 100);
        for i in 0..5 {
            engine.add_trade(Trade {
                ticker: "TICK-1".to_string(),
                trade_id: i.to_string(),
                yes_price: 50,
                no_price: 50,
                count: 1,
                taker_side: TradeSide::Yes,
                created_time: chrono::Utc::now(),
            });
        }
        assert_eq!(engine.all_trades("TICK-1").len(), 2);
    }
}
