use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle status of a market as reported by the upstream venue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Initialized,
    Inactive,
    Active,
    Closed,
    Determined,
    Disputed,
    Amended,
    Finalized,
    /// Upstream sent a status string we don't recognize yet; kept rather than rejected.
    #[serde(other)]
    Unknown,
}

impl Default for MarketStatus {
    fn default() -> Self {
        MarketStatus::Initialized
    }
}

/// A single binary-outcome market, as registered from the upstream market-list feed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Market {
    pub ticker: String,
    pub title: String,
    pub category: String,
    /// Binds mutually-exclusive outcomes into an event group for the no-arb detector.
    pub event_ticker: String,
    pub status: MarketStatus,
    pub expiration_time: Option<DateTime<Utc>>,
    pub yes_sub_title: Option<String>,
    pub no_sub_title: Option<String>,
}

impl Market {
    pub fn new(ticker: impl Into<String>, title: impl Into<String>, event_ticker: impl Into<String>) -> Self {
        Self {
            ticker: ticker.into(),
            title: title.into(),
            category: String::new(),
            event_ticker: event_ticker.into(),
            status: MarketStatus::Initialized,
            expiration_time: None,
            yes_sub_title: None,
            no_sub_title: None,
        }
    }
}
