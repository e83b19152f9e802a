use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeSide {
    Yes,
    No,
}

/// A single executed trade on a market, as reported by the fill feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trade {
    pub ticker: String,
    pub trade_id: String,
    pub yes_price: u32,
    pub no_price: u32,
    pub count: u64,
    pub taker_side: TradeSide,
    pub created_time: DateTime<Utc>,
}

impl Trade {
    /// The implied probability of the yes outcome at the moment of this trade, in `[0, 1]`.
    pub fn implied_probability(&self) -> f64 {
        self.yes_price as f64 / 10_000.0
    }
}
