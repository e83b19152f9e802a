use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    OrderBookImbalance,
    ImpliedProbabilityDrift,
    VolumeSurge,
}

/// Metadata common to every signal, independent of its type-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalMetadata {
    /// Whether this emission crossed a configured threshold. The always-on
    /// quantitative bundle is emitted with this `false` — it is informational,
    /// not an actionable crossing, and the alert dispatcher gates on it.
    pub threshold_crossed: bool,
    pub confidence: f64,
    pub prior_value: Option<f64>,
}

/// One type-specific payload per signal, mirroring `SignalType`. Exactly one
/// variant is populated per `Signal` — a tagged union rather than a bag of
/// optional fields, so the dispatcher and JSON serializer both get exhaustive
/// matches instead of guessing which fields are meaningful.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalPayload {
    OrderbookImbalance { bid_ratio: f64, spread_cents: u32 },
    ImpliedProbabilityDrift { delta: f64, window_secs: u64 },
    VolumeSurge { multiplier: f64, window_secs: u64 },
    QuantBundle(Box<QuantMetrics>),
}

/// A single emitted signal from one tick of the signal processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Signal {
    pub ticker: String,
    pub signal_type: SignalType,
    /// Primary numeric value: imbalance ratio, drift z-score, or volume
    /// multiplier, depending on `signal_type`.
    pub value: f64,
    pub timestamp: DateTime<Utc>,
    pub metadata: SignalMetadata,
    pub payload: SignalPayload,
}

impl Signal {
    pub fn new(ticker: impl Into<String>, signal_type: SignalType, value: f64, payload: SignalPayload) -> Self {
        Self {
            ticker: ticker.into(),
            signal_type,
            value,
            timestamp: Utc::now(),
            metadata: SignalMetadata { threshold_crossed: true, confidence: 1.0, prior_value: None },
            payload,
        }
    }

    pub fn with_metadata(mut self, metadata: SignalMetadata) -> Self {
        self.metadata = metadata;
        self
    }
}

/// Always-on bundle of quantitative metrics computed every tick alongside signals,
/// independent of whether any threshold was crossed. Combines book-derived
/// microstructure (mid/spread/depth/imbalance) with trade-window statistics
/// (mean, volatility, z-score, trend, information flow) and, when the market's
/// expiration is known, a countdown to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuantMetrics {
    pub ticker: String,
    pub timestamp: DateTime<Utc>,

    // Book-derived.
    pub mid: Option<f64>,
    pub spread_cents: Option<u32>,
    pub bid_depth: u64,
    pub ask_depth: u64,
    pub imbalance: f64,

    // Trade-window statistics, over the drift window.
    pub mean_implied_prob: f64,
    pub stddev_implied_prob: f64,
    pub z_score: f64,
    /// `clamp(|slope| * 10, 0, 1)` from a linear regression of trade price on ordinal index.
    pub trend_strength: f64,
    /// Trades per minute over the trailing five minutes.
    pub information_flow: f64,
    /// `min(1, (spread/100) / volatility)`.
    pub efficiency: f64,
    /// `(mid_prob - mean) / volatility`.
    pub sharpe: f64,

    pub trade_count_window: u64,
    pub volume_window: u64,

    /// Seconds until expiration, when the market's expiration instant is known.
    pub seconds_to_expiry: Option<i64>,
}
