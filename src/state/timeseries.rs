//! Time-series store for per-market rolling snapshots.
//!
//! A single-lock map-of-vectors becomes a hot spot at thousands of markets
//! times hundreds of updates/sec; `DashMap` partitions the keyspace into
//! independently-locked shards internally, which is the sharding this store
//! needs rather than a hand-rolled variant.

use crate::models::MarketSnapshot;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

pub struct TimeSeriesStore {
    series: DashMap<String, Mutex<VecDeque<MarketSnapshot>>>,
    capacity_per_market: usize,
}

impl TimeSeriesStore {
    pub fn new(capacity_per_market: usize) -> Self {
        Self { series: DashMap::new(), capacity_per_market }
    }

    /// Appends a snapshot, rotating the oldest entry out once the per-market
    /// ring reaches capacity.
    pub fn push(&self, snapshot: MarketSnapshot) {
        let ring = self
            .series
            .entry(snapshot.ticker.clone())
            .or_insert_with(|| Mutex::new(VecDeque::new()));
        let mut ring = ring.lock();
        if ring.len() >= self.capacity_per_market {
            ring.pop_front();
        }
        ring.push_back(snapshot);
    }

    /// Returns a clone of the most recent `limit` snapshots, oldest first.
    pub fn recent(&self, ticker: &str, limit: usize) -> Vec<MarketSnapshot> {
        match self.series.get(ticker) {
            Some(ring) => {
                let ring = ring.lock();
                ring.iter().rev().take(limit).rev().cloned().collect()
            }
            None => Vec::new(),
        }
    }

    pub fn len(&self, ticker: &str) -> usize {
        self.series.get(ticker).map(|r| r.lock().len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn snap(ticker: &str) -> MarketSnapshot {
        MarketSnapshot {
            ticker: ticker.to_string(),
            timestamp: Utc::now(),
            best_yes_bid: Some(50),
            best_yes_ask: Some(55),
            mid: Some(52.5),
            spread: Some(5),
            bid_depth: 100,
            ask_depth: 80,
            microprice: Some(52.5),
            imbalance_ratio: 0.1,
            trade_count_window: 10,
            last_trade_price: Some(51),
            last_trade_time: Some(Utc::now()),
        }
    }

    #[test]
    fn rotates_at_capacity() {
        let store = TimeSeriesStore::new(3);
        for _ in 0..5 {
            store.push(snap("TICK-A"));
        }
        assert_eq!(store.len("TICK-A"), 3);
    }

    #[test]
    fn shards_keep_markets_independent() {
        let store = TimeSeriesStore::new(10);
        store.push(snap("TICK-A"));
        store.push(snap("TICK-B"));
        assert_eq!(store.len("TICK-A"), 1);
        assert_eq!(store.len("TICK-B"), 1);
        assert_eq!(store.recent("TICK-C", 5).len(), 0);
    }
}
