use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A periodic rolling snapshot of a market's derived state, appended to the
/// per-market time series shard every time its order book is updated.
/// Forms the historical series the volatility and backtest helpers read.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketSnapshot {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,
    pub best_yes_bid: Option<u32>,
    pub best_yes_ask: Option<u32>,
    pub mid: Option<f64>,
    pub spread: Option<u32>,
    pub bid_depth: u64,
    pub ask_depth: u64,
    pub imbalance_ratio: f64,
    pub microprice: Option<f64>,
    /// Count of trades within the snapshot window (trailing five minutes).
    pub trade_count_window: u64,
    pub last_trade_price: Option<u32>,
    pub last_trade_time: Option<DateTime<Utc>>,
}
