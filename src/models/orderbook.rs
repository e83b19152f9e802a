use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single price level: cents (1-9999) mapped to contracts resting at that price.
pub type PriceLevel = (u32, u64);

/// Bid-only order book for one side of a binary market.
///
/// Kalshi-style venues only publish bids for each outcome; the ask side of
/// one outcome is derived from the bid side of the opposite outcome
/// (`p_ask = 10000 - p_no_bid`), see [`OrderBook::best_ask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrderBook {
    pub ticker: String,
    /// Yes-side bids, sorted descending by price.
    pub yes_bids: Vec<PriceLevel>,
    /// No-side bids, sorted descending by price.
    pub no_bids: Vec<PriceLevel>,
    pub sequence: u64,
    pub last_update: DateTime<Utc>,
}

impl Default for OrderBook {
    fn default() -> Self {
        Self::new("")
    }
}

impl OrderBook {
    pub fn new(ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            yes_bids: Vec::new(),
            no_bids: Vec::new(),
            sequence: 0,
            last_update: Utc::now(),
        }
    }

    /// Seconds elapsed since the book last changed, from either ingestion path.
    pub fn staleness_secs(&self) -> i64 {
        (Utc::now() - self.last_update).num_seconds().max(0)
    }

    pub fn best_yes_bid(&self) -> Option<u32> {
        self.yes_bids.first().map(|(p, _)| *p)
    }

    pub fn best_no_bid(&self) -> Option<u32> {
        self.no_bids.first().map(|(p, _)| *p)
    }

    /// The implied best ask on the yes side, derived from the best no bid.
    pub fn best_yes_ask(&self) -> Option<u32> {
        self.best_no_bid().map(|p| 10_000 - p)
    }

    /// The implied best ask on the no side, derived from the best yes bid.
    pub fn best_no_ask(&self) -> Option<u32> {
        self.best_yes_bid().map(|p| 10_000 - p)
    }

    /// Yes-side spread in cents: implied ask minus best bid. `None` if either side is empty.
    pub fn yes_spread(&self) -> Option<u32> {
        match (self.best_yes_ask(), self.best_yes_bid()) {
            (Some(ask), Some(bid)) if ask >= bid => Some(ask - bid),
            _ => None,
        }
    }

    /// Notional depth on the yes-bid side: Σ price × quantity over the first
    /// `levels` price levels.
    pub fn bid_depth(&self, levels: usize) -> u64 {
        self.yes_bids.iter().take(levels).map(|(p, sz)| *p as u64 * sz).sum()
    }

    /// Notional depth on the yes-ask side: Σ derived-ask-price × quantity over
    /// the first `levels` no-bid levels, priced at the derived ask
    /// (`10000 - p_no`) so it is on the same cents scale as [`Self::bid_depth`].
    pub fn ask_depth(&self, levels: usize) -> u64 {
        self.no_bids.iter().take(levels).map(|(p, sz)| (10_000 - *p) as u64 * sz).sum()
    }

    /// Midpoint of best bid and best (derived) ask, on the same cents scale
    /// as both. `None` if either side is empty.
    pub fn mid_cents(&self) -> Option<f64> {
        match (self.best_yes_bid(), self.best_yes_ask()) {
            (Some(b), Some(a)) => Some((b + a) as f64 / 2.0),
            _ => None,
        }
    }

    /// Imbalance ratio in `[-1.0, 1.0]`: positive means yes-side depth dominates.
    pub fn imbalance_ratio(&self, levels: usize) -> f64 {
        let bid = self.bid_depth(levels) as f64;
        let ask = self.ask_depth(levels) as f64;
        if bid + ask == 0.0 {
            return 0.0;
        }
        (bid - ask) / (bid + ask)
    }

    /// Size-weighted midpoint between best yes bid and implied best yes ask.
    pub fn microprice(&self) -> Option<f64> {
        let bid = self.best_yes_bid()? as f64;
        let ask = self.best_yes_ask()? as f64;
        let bid_sz = self.yes_bids.first()?.1 as f64;
        let ask_sz = self.no_bids.first()?.1 as f64;
        if bid_sz + ask_sz == 0.0 {
            return Some((bid + ask) / 2.0);
        }
        Some((bid * ask_sz + ask * bid_sz) / (bid_sz + ask_sz))
    }

    /// Quantity resting within `band_cents` of the current mid, summed
    /// separately for each side. `(0, 0)` if the book has no mid yet.
    pub fn depth_at_price(&self, band_cents: u32) -> (u64, u64) {
        let Some(mid) = self.mid_cents() else { return (0, 0) };
        let band = band_cents as f64;
        let bid = self
            .yes_bids
            .iter()
            .filter(|(p, _)| (*p as f64 - mid).abs() <= band)
            .map(|(_, sz)| sz)
            .sum();
        let ask = self
            .no_bids
            .iter()
            .filter(|(p, _)| ((10_000 - *p) as f64 - mid).abs() <= band)
            .map(|(_, sz)| sz)
            .sum();
        (bid, ask)
    }

    /// Replaces one side wholesale from an upstream snapshot, keeping descending order.
    pub fn replace_side(&mut self, yes_bids: Vec<PriceLevel>, no_bids: Vec<PriceLevel>, sequence: u64) {
        self.yes_bids = yes_bids;
        self.no_bids = no_bids;
        self.yes_bids.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        self.no_bids.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        self.sequence = sequence;
        self.last_update = Utc::now();
    }

    /// Applies a single delta (price, new_size; 0 removes the level) to one side.
    pub fn apply_delta(&mut self, side_is_yes: bool, price: u32, size: u64, sequence: u64) {
        let side = if side_is_yes { &mut self.yes_bids } else { &mut self.no_bids };
        side.retain(|(p, _)| *p != price);
        if size > 0 {
            side.push((price, size));
            side.sort_unstable_by(|a, b| b.0.cmp(&a.0));
        }
        self.sequence = sequence;
        self.last_update = Utc::now();
    }

    /// Walks the book to estimate the average execution price for buying `qty`
    /// contracts on the yes side, crossing the (derived) ask ladder built from
    /// no-side bids. Returns `None` if depth is insufficient.
    pub fn slippage_walk_yes_buy(&self, qty: u64) -> Option<f64> {
        let mut remaining = qty;
        let mut cost: u128 = 0;
        for (no_price, size) in &self.no_bids {
            if remaining == 0 {
                break;
            }
            let ask_price = 10_000 - no_price;
            let take = remaining.min(*size);
            cost += ask_price as u128 * take as u128;
            remaining -= take;
        }
        if remaining > 0 {
            return None;
        }
        Some(cost as f64 / qty as f64)
    }

    /// Walks the yes-bid ladder to estimate the average fill price for
    /// selling `qty` contracts. Returns `None` if the bids cannot absorb it.
    pub fn slippage_walk_yes_sell(&self, qty: u64) -> Option<f64> {
        let mut remaining = qty;
        let mut proceeds: u128 = 0;
        for (price, size) in &self.yes_bids {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(*size);
            proceeds += *price as u128 * take as u128;
            remaining -= take;
        }
        if remaining > 0 {
            return None;
        }
        Some(proceeds as f64 / qty as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> OrderBook {
        let mut b = OrderBook::new("TICK-1");
        b.replace_side(vec![(47, 100), (45, 200)], vec![(53, 150), (50, 300)], 1);
        b
    }

    #[test]
    fn derives_ask_from_opposite_bid() {
        let b = book();
        assert_eq!(b.best_yes_bid(), Some(47));
        assert_eq!(b.best_no_bid(), Some(53));
        assert_eq!(b.best_yes_ask(), Some(10_000 - 53));
        assert_eq!(b.best_no_ask(), Some(10_000 - 47));
    }

    #[test]
    fn spread_is_nonnegative_when_crossed_is_absent() {
        let b = book();
        let spread = b.yes_spread().unwrap();
        assert_eq!(spread, (10_000 - 53) - 47);
    }

    #[test]
    fn imbalance_ratio_bounds() {
        let b = book();
        let r = b.imbalance_ratio(2);
        assert!((-1.0..=1.0).contains(&r));
    }

    #[test]
    fn empty_book_has_neutral_imbalance() {
        let b = OrderBook::new("EMPTY");
        assert_eq!(b.imbalance_ratio(5), 0.0);
        assert_eq!(b.best_yes_bid(), None);
    }

    #[test]
    fn apply_delta_removes_on_zero_size() {
        let mut b = book();
        b.apply_delta(true, 47, 0, 2);
        assert_eq!(b.best_yes_bid(), Some(45));
    }

    #[test]
    fn slippage_walk_sums_across_levels() {
        let b = book();
        let avg = b.slippage_walk_yes_buy(400).unwrap();
        let expected = ((10_000 - 53) as f64 * 150.0 + (10_000 - 50) as f64 * 250.0) / 400.0;
        assert!((avg - expected).abs() < 1e-9);
    }

    #[test]
    fn slippage_walk_returns_none_when_depth_insufficient() {
        let b = book();
        assert!(b.slippage_walk_yes_buy(10_000).is_none());
    }

    #[test]
    fn fresh_book_has_near_zero_staleness() {
        let b = book();
        assert!(b.staleness_secs() < 2);
    }

    #[test]
    fn sell_slippage_walk_sums_across_bid_levels() {
        let mut b = OrderBook::new("TICK-1");
        b.replace_side(vec![(60, 40), (59, 30), (58, 50)], vec![(38, 100)], 1);
        let avg = b.slippage_walk_yes_sell(100).unwrap();
        let expected = (60.0 * 40.0 + 59.0 * 30.0 + 58.0 * 30.0) / 100.0;
        assert!((avg - expected).abs() < 1e-9);
    }

    #[test]
    fn depth_is_notional_not_raw_quantity() {
        // S2 from the worked scenarios: bids=[(55,800)], asks=[(56,200)], so the
        // no-bid that derives a 56-cent ask sits at 10000-56=9944.
        let mut b = OrderBook::new("TICK-1");
        b.replace_side(vec![(55, 800)], vec![(9_944, 200)], 1);
        assert_eq!(b.bid_depth(usize::MAX), 55 * 800);
        assert_eq!(b.ask_depth(usize::MAX), 56 * 200);
    }

    #[test]
    fn imbalance_matches_worked_scenario_s2() {
        // S2: bidDepth=44000, askDepth=11200, ratio ~= 0.594.
        let mut b = OrderBook::new("TICK-1");
        b.replace_side(vec![(55, 800)], vec![(9_944, 200)], 1);
        let r = b.imbalance_ratio(usize::MAX);
        assert!((r - 0.594_202_898_550_7).abs() < 1e-9);
    }

    #[test]
    fn depth_at_price_bands_quantity_around_mid() {
        let b = book();
        let mid = b.mid_cents().unwrap();
        let (bid_qty, ask_qty) = b.depth_at_price(1);
        // Only levels within 1 cent of mid on each side contribute.
        let expected_bid: u64 = b.yes_bids.iter().filter(|(p, _)| (*p as f64 - mid).abs() <= 1.0).map(|(_, q)| q).sum();
        let expected_ask: u64 = b
            .no_bids
            .iter()
            .filter(|(p, _)| ((10_000 - *p) as f64 - mid).abs() <= 1.0)
            .map(|(_, q)| q)
            .sum();
        assert_eq!(bid_qty, expected_bid);
        assert_eq!(ask_qty, expected_ask);
    }
}
