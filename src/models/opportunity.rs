use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A scored, tradeable condition on a single market produced by the scanner.
/// Every field beyond `ticker`/`timestamp` is optional or zeroed when the
/// book is incomplete, rather than the whole record being absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Opportunity {
    pub ticker: String,

    // Top-of-book.
    pub best_bid: Option<u32>,
    pub best_ask: Option<u32>,
    /// Mid in probability-percent units (0..100), i.e. `(bid+ask)/200 * 100`.
    pub mid: Option<f64>,
    pub spread_cents: Option<u32>,
    pub spread_pct: Option<f64>,

    // Depth.
    pub bid_depth_total: u64,
    pub ask_depth_total: u64,
    pub bid_depth_top5: u64,
    pub ask_depth_top5: u64,
    pub liquidity_score: f64,

    // Microstructure.
    pub imbalance: f64,
    pub microprice: Option<f64>,
    /// `microprice - mid`, in probability-percent units.
    pub microprice_minus_mid: Option<f64>,

    // Activity.
    pub trade_count_30s: u64,
    pub last_trade_price: Option<u32>,
    pub last_trade_time: Option<DateTime<Utc>>,
    /// Trades per minute, extrapolated from the 30s activity window.
    pub trade_intensity: f64,

    // Staleness.
    pub staleness_secs: i64,
    pub book_stale: bool,

    // Execution.
    /// Execution slippage in cents for a reference 100-contract sell walk
    /// across the bids: `|avg_fill_price - mid|`, truncated to whole cents.
    /// The sentinel 10000 when depth cannot absorb the walk (or mid is undefined).
    pub slippage_100: f64,
    pub can_execute_100: bool,

    pub timestamp: DateTime<Utc>,
}
