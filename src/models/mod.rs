//! Core data types shared across the state engine, ingestion, signals,
//! scanner, and alert layers.

pub mod alert;
pub mod arb;
pub mod market;
pub mod opportunity;
pub mod orderbook;
pub mod signal;
pub mod snapshot;
pub mod trade;

pub use alert::{Alert, AlertType, HitRateStats, SuggestedAction};
pub use arb::NoArbViolation;
pub use market::{Market, MarketStatus};
pub use opportunity::Opportunity;
pub use orderbook::{OrderBook, PriceLevel};
pub use signal::{QuantMetrics, Signal, SignalMetadata, SignalPayload, SignalType};
pub use snapshot::MarketSnapshot;
pub use trade::{Trade, TradeSide};
