//! Opportunity scanner: per-market liquidity/execution scoring.

pub mod noarb;

use crate::models::{MarketStatus, Opportunity};
use crate::state::StateEngine;
use std::sync::Arc;

/// Band, in cents either side of mid, used for the scanner's "top-5" depth figure.
const DEPTH_BAND_CENTS: u32 = 5;
const STALE_SECS: i64 = 5;
const EXECUTE_MIN_DEPTH: u64 = 100;
const EXECUTE_MAX_SPREAD_CENTS: u32 = 50;
const REFERENCE_SELL_QTY: u64 = 100;

pub use noarb::NoArbDetector;

pub struct Scanner {
    state: Arc<StateEngine>,
}

impl Scanner {
    pub fn new(state: Arc<StateEngine>) -> Self {
        Self { state }
    }

    /// Scans every active market with a book and returns opportunities sorted
    /// descending by liquidity score. Runs the per-market derivation in
    /// parallel since markets are independent.
    pub fn scan(&self) -> Vec<Opportunity> {
        use rayon::prelude::*;

        let markets: Vec<_> = self
            .state
            .get_all_markets()
            .into_iter()
            .filter(|m| m.status == MarketStatus::Active)
            .collect();

        let mut opportunities: Vec<Opportunity> = markets
            .par_iter()
            .filter_map(|m| self.derive_opportunity(&m.ticker))
            .collect();

        opportunities.sort_by(|a, b| b.liquidity_score.partial_cmp(&a.liquidity_score).unwrap_or(std::cmp::Ordering::Equal));
        opportunities
    }

    /// Whether a 100-contract sell would clear given top-5 depth and spread,
    /// per the scanner's `canExecute100` rule.
    pub fn can_execute_100(&self, ticker: &str) -> bool {
        let Some(book) = self.state.get_order_book(ticker) else { return false };
        let (bid_qty, ask_qty) = book.depth_at_price(DEPTH_BAND_CENTS);
        let spread = book.yes_spread().unwrap_or(u32::MAX);
        bid_qty + ask_qty >= EXECUTE_MIN_DEPTH && spread < EXECUTE_MAX_SPREAD_CENTS
    }

    pub fn derive_opportunity(&self, ticker: &str) -> Option<Opportunity> {
        let book = self.state.get_order_book(ticker)?;

        let best_bid = book.best_yes_bid();
        let best_ask = book.best_yes_ask();
        // Same cents-equivalent scale as `best_bid`/`best_ask`/`microprice`, so
        // `microprice_minus_mid` below is a plain difference, not a unit conversion.
        let mid = match (best_bid, best_ask) {
            (Some(b), Some(a)) => Some((b + a) as f64 / 2.0),
            _ => None,
        };
        let spread_cents = book.yes_spread();
        let spread_pct = spread_cents.map(|s| s as f64 / 100.0);

        let (bid_depth_top5, ask_depth_top5) = book.depth_at_price(DEPTH_BAND_CENTS);
        let bid_depth_total = book.bid_depth(usize::MAX);
        let ask_depth_total = book.ask_depth(usize::MAX);

        let spread_score = spread_cents.map(|s| (1.0 - s as f64 / 100.0).max(0.0)).unwrap_or(0.0);
        let depth_score = ((bid_depth_top5 + ask_depth_top5) as f64 / 1000.0).min(1.0);
        let liquidity_score = 0.6 * spread_score + 0.4 * depth_score;

        let imbalance = book.imbalance_ratio(usize::MAX);
        let microprice = book.microprice();
        let microprice_minus_mid = match (microprice, mid) {
            (Some(mp), Some(m)) => Some(mp - m),
            _ => None,
        };

        let trades = self.state.recent_trades(ticker, 30);
        let trade_count_30s = trades.len() as u64;
        let last_trade = trades.last();
        // Trades/min, extrapolated from a 30s window.
        let trade_intensity = trade_count_30s as f64 * 2.0;

        let staleness_secs = book.staleness_secs();
        let book_stale = staleness_secs >= STALE_SECS;

        // Slippage is the gap between the walked fill price and mid, truncated
        // to whole cents (S5: avg=59.10, mid=61 -> 1, not the 59.10 itself);
        // the 10000 sentinel covers both "book can't fill" and "no mid yet".
        let slippage_100 = match (book.slippage_walk_yes_sell(REFERENCE_SELL_QTY), mid) {
            (Some(avg), Some(m)) => (avg - m).abs().trunc(),
            _ => 10_000.0,
        };
        let can_execute_100 = self.can_execute_100(ticker);

        Some(Opportunity {
            ticker: ticker.to_string(),
            best_bid,
            best_ask,
            mid,
            spread_cents,
            spread_pct,
            bid_depth_total,
            ask_depth_total,
            bid_depth_top5,
            ask_depth_top5,
            liquidity_score,
            imbalance,
            microprice,
            microprice_minus_mid,
            trade_count_30s,
            last_trade_price: last_trade.map(|t| t.yes_price),
            last_trade_time: last_trade.map(|t| t.created_time),
            trade_intensity,
            staleness_secs,
            book_stale,
            slippage_100,
            can_execute_100,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;

    #[test]
    fn liquidity_score_rewards_tight_spread_and_depth() {
        let state = StateEngine::new(100, 100);
        state.register_market(Market::new("TICK-1", "t", "EVT-1"));
        // no_bid near 9949 derives a yes-ask of 51, one cent off the 50 bid,
        // keeping both the spread and the depth band tight around the mid.
        state.update_from_upstream("TICK-1", vec![(50, 600)], vec![(9949, 600)], 1).unwrap();
        let scanner = Scanner::new(state);
        let opp = scanner.derive_opportunity("TICK-1").unwrap();
        assert!(opp.liquidity_score > 0.0);
    }

    #[test]
    fn scan_sorts_descending_by_liquidity() {
        let state = StateEngine::new(100, 100);
        let mut wide = Market::new("WIDE", "t", "EVT-1");
        wide.status = MarketStatus::Active;
        let mut tight = Market::new("TIGHT", "t", "EVT-2");
        tight.status = MarketStatus::Active;
        state.register_market(wide);
        state.register_market(tight);
        // WIDE: no_bid of 9000 derives a yes-ask of 1000, a wide spread far
        // from the thin bid, so neither the spread nor the depth band scores.
        state.update_from_upstream("WIDE", vec![(50, 10)], vec![(9000, 10)], 1).unwrap();
        // TIGHT: same near-mid convention as the test above.
        state.update_from_upstream("TIGHT", vec![(50, 600)], vec![(9949, 600)], 1).unwrap();
        let scanner = Scanner::new(state);
        let opportunities = scanner.scan();
        assert_eq!(opportunities.len(), 2);
        for pair in opportunities.windows(2) {
            assert!(pair[0].liquidity_score >= pair[1].liquidity_score);
        }
    }
}
