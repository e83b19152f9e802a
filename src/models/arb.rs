use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A detected cross-market no-arbitrage violation within one event group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoArbViolation {
    pub event_ticker: String,
    pub legs: Vec<String>,
    /// Sum of best-ask costs to buy one contract of every leg, after fees and slippage.
    pub sum_buy_cost: f64,
    /// Sum of best-bid proceeds to sell one contract of every leg, after fees and slippage.
    pub sum_sell_proceeds: f64,
    /// `1.0 - sum_buy_cost` (underpriced basket) or `sum_sell_proceeds - 1.0` (overpriced basket),
    /// whichever side is actionable; net of modeled fees and slippage.
    pub net_arb: f64,
    pub min_leg_liquidity: u64,
    pub timestamp: DateTime<Utc>,
}

impl NoArbViolation {
    pub const ACTIONABLE_NET_ARB: f64 = 0.02;
    pub const ACTIONABLE_MIN_LIQUIDITY: u64 = 10;
    /// Per-leg slippage cost in cents, mirroring the detector's dollar-scale constant.
    pub const SLIPPAGE_PER_LEG_CENTS: f64 = 1.0;

    pub fn is_actionable(&self) -> bool {
        self.net_arb > Self::ACTIONABLE_NET_ARB && self.min_leg_liquidity >= Self::ACTIONABLE_MIN_LIQUIDITY
    }
}
