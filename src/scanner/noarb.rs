//! Cross-market no-arbitrage detector.
//!
//! The cost model is deliberately crude (flat per-leg fee and slippage) —
//! a threshold prior for detection, not an execution model.

use crate::models::{MarketStatus, NoArbViolation};
use crate::state::StateEngine;
use std::collections::HashMap;
use std::sync::Arc;

const FEE_PER_LEG: f64 = 0.05;
const SLIPPAGE_PER_LEG: f64 = 0.01;

pub struct NoArbDetector {
    state: Arc<StateEngine>,
}

impl NoArbDetector {
    pub fn new(state: Arc<StateEngine>) -> Self {
        Self { state }
    }

    /// Groups active markets by event ticker and checks every group with at
    /// least two members whose books are non-empty on both sides.
    pub fn scan(&self) -> Vec<NoArbViolation> {
        let markets = self.state.get_all_markets();
        let mut groups: HashMap<String, Vec<String>> = HashMap::new();
        for m in markets.iter().filter(|m| m.status == MarketStatus::Active) {
            groups.entry(m.event_ticker.clone()).or_default().push(m.ticker.clone());
        }

        groups
            .into_iter()
            .filter(|(_, legs)| legs.len() >= 2)
            .filter_map(|(event_ticker, legs)| self.check_group(&event_ticker, legs))
            .collect()
    }

    fn check_group(&self, event_ticker: &str, legs: Vec<String>) -> Option<NoArbViolation> {
        let mut sum_buy = 0.0;
        let mut sum_sell = 0.0;
        let mut min_liquidity = u64::MAX;

        for ticker in &legs {
            let book = self.state.get_order_book(ticker)?;
            let best_bid = book.best_yes_bid()?;
            let best_ask = book.best_yes_ask()?;
            let bid_qty = book.yes_bids.first()?.1;
            let ask_qty = book.no_bids.first()?.1;

            sum_buy += best_ask as f64 / 100.0;
            sum_sell += best_bid as f64 / 100.0;
            min_liquidity = min_liquidity.min(bid_qty.min(ask_qty));
        }

        let member_count = legs.len() as f64;
        let (gross, basis) = if sum_buy < 1.0 {
            (1.0 - sum_buy, sum_buy)
        } else if sum_sell > 1.0 {
            (sum_sell - 1.0, sum_sell)
        } else {
            return None;
        };

        let fees = FEE_PER_LEG * basis * member_count;
        let slippage = SLIPPAGE_PER_LEG * member_count;
        let net_arb = gross - fees - slippage;

        Some(NoArbViolation {
            event_ticker: event_ticker.to_string(),
            legs,
            sum_buy_cost: sum_buy,
            sum_sell_proceeds: sum_sell,
            net_arb,
            min_leg_liquidity: min_liquidity,
            timestamp: chrono::Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;

    fn active_market(ticker: &str, event: &str) -> Market {
        let mut m = Market::new(ticker, "t", event);
        m.status = MarketStatus::Active;
        m
    }

    #[test]
    fn detects_underpriced_basket() {
        let state = StateEngine::new(100, 100);
        state.register_market(active_market("LEG-A", "EVT-1"));
        state.register_market(active_market("LEG-B", "EVT-1"));
        // best_ask = 10000 - best_no_bid; a high no-bid yields a cheap derived ask.
        state.update_from_upstream("LEG-A", vec![(10, 50)], vec![(9990, 50)], 1).unwrap();
        state.update_from_upstream("LEG-B", vec![(10, 50)], vec![(9990, 50)], 1).unwrap();
        let detector = NoArbDetector::new(state);
        let violations = detector.scan();
        assert_eq!(violations.len(), 1);
        assert!(violations[0].sum_buy_cost < 1.0);
    }

    #[test]
    fn single_member_group_is_skipped() {
        let state = StateEngine::new(100, 100);
        state.register_market(active_market("LEG-A", "EVT-1"));
        state.update_from_upstream("LEG-A", vec![(50, 10)], vec![(50, 10)], 1).unwrap();
        let detector = NoArbDetector::new(state);
        assert!(detector.scan().is_empty());
    }

    #[test]
    fn actionable_requires_both_thresholds() {
        let v = NoArbViolation {
            event_ticker: "EVT".to_string(),
            legs: vec!["A".to_string(), "B".to_string()],
            sum_buy_cost: 0.5,
            sum_sell_proceeds: 0.0,
            net_arb: 0.03,
            min_leg_liquidity: 10,
            timestamp: chrono::Utc::now(),
        };
        assert!(v.is_actionable());

        let v_illiquid = NoArbViolation { min_leg_liquidity: 1, ..v };
        assert!(!v_illiquid.is_actionable());
    }
}
