//! REST Poller: market discovery / refresh loop plus per-market order-book loop.

use crate::auth::KalshiSigner;
use crate::config::Config;
use crate::ingestion::ratelimit::TokenBucket;
use crate::models::{Market, MarketStatus, PriceLevel};
use crate::state::StateEngine;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

#[derive(Debug, Deserialize)]
struct SeriesEntry {
    ticker: String,
}

#[derive(Debug, Deserialize)]
struct SeriesResponse {
    series: Vec<SeriesEntry>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketEntry {
    ticker: String,
    title: String,
    #[serde(default)]
    category: String,
    status: String,
    expiration_time: Option<chrono::DateTime<chrono::Utc>>,
    event_ticker: String,
    yes_sub_title: Option<String>,
    no_sub_title: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MarketsResponse {
    markets: Vec<MarketEntry>,
    cursor: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBookFootprint {
    #[serde(default)]
    yes_dollars: Vec<[String; 2]>,
    #[serde(default)]
    no_dollars: Vec<[String; 2]>,
}

#[derive(Debug, Deserialize)]
struct OrderBookResponse {
    orderbook_fp: OrderBookFootprint,
}

fn parse_status(raw: &str) -> MarketStatus {
    match raw {
        "initialized" => MarketStatus::Initialized,
        "inactive" => MarketStatus::Inactive,
        "active" | "open" => MarketStatus::Active,
        "closed" => MarketStatus::Closed,
        "determined" => MarketStatus::Determined,
        "disputed" => MarketStatus::Disputed,
        "amended" => MarketStatus::Amended,
        "finalized" => MarketStatus::Finalized,
        _ => MarketStatus::Unknown,
    }
}

/// Converts `(price_str, qty_str)` dollar-denominated levels into integer cents.
///
/// Cents are floored, not rounded: `"0.735"` is 73 cents, matching the venue's
/// own truncation rather than banker's rounding. Parsed against the decimal
/// string directly rather than via `f64 * 100.0`: binary floating point can't
/// represent most two-decimal dollar amounts exactly, so `"0.29" * 100.0`
/// lands at `28.999999999999996` and a subsequent `.floor()` silently drops a
/// cent.
fn parse_dollars_to_cents(price: &str) -> Option<u32> {
    let trimmed = price.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let whole: u32 = whole.parse().ok()?;
    let mut frac_digits = frac.chars();
    let tenths = frac_digits.next().map_or(Ok(0), |c| c.to_digit(10).ok_or(())).ok()?;
    let hundredths = frac_digits.next().map_or(Ok(0), |c| c.to_digit(10).ok_or(())).ok()?;
    Some(whole * 100 + tenths * 10 + hundredths)
}

fn parse_levels(levels: &[[String; 2]]) -> Vec<PriceLevel> {
    levels
        .iter()
        .filter_map(|[price, qty]| {
            let price_cents = parse_dollars_to_cents(price)?;
            let size = qty.parse::<f64>().ok()? as u64;
            Some((price_cents, size))
        })
        .collect()
}

pub struct RestPoller {
    client: Client,
    config: Config,
    signer: Option<KalshiSigner>,
    bucket: Arc<TokenBucket>,
    state: Arc<StateEngine>,
}

impl RestPoller {
    pub fn new(config: Config, signer: Option<KalshiSigner>, state: Arc<StateEngine>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent("kalshi-signal-engine/0.1")
            .build()
            .expect("failed to build HTTP client");
        let bucket = Arc::new(TokenBucket::new(config.rate_limit_per_second));
        Self { client, config, signer, bucket, state }
    }

    /// Market discovery / refresh loop: series → markets, paginated, 60s cycle.
    pub async fn run_discovery_loop(&self, category: &str, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("discovery loop cancelled");
                    return;
                }
                _ = self.discovery_cycle(category) => {}
            }
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_secs(60)) => {}
            }
        }
    }

    async fn discovery_cycle(&self, category: &str) {
        let series = match self.fetch_all_series(category).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "series discovery failed");
                return;
            }
        };
        let mut registered = 0usize;
        for series_ticker in series {
            match self.fetch_all_markets(&series_ticker).await {
                Ok(markets) => {
                    for m in markets {
                        registered += 1;
                        self.state.register_market(m);
                    }
                }
                Err(e) => warn!(series = %series_ticker, error = %e, "market page fetch failed"),
            }
        }
        info!(registered, "discovery cycle complete");
    }

    async fn fetch_all_series(&self, category: &str) -> Result<Vec<String>, reqwest::Error> {
        let mut cursor: Option<String> = None;
        let mut out = Vec::new();
        loop {
            self.bucket.acquire().await;
            let mut req = self.client.get(format!("{}/series", self.config.rest_base_url)).query(&[
                ("category", category),
                ("limit", "100"),
            ]);
            if let Some(c) = &cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }
            let resp: SeriesResponse = req.send().await?.error_for_status()?.json().await?;
            out.extend(resp.series.into_iter().map(|s| s.ticker));
            match resp.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    async fn fetch_all_markets(&self, series_ticker: &str) -> Result<Vec<Market>, reqwest::Error> {
        let mut cursor: Option<String> = None;
        let mut out = Vec::new();
        loop {
            self.bucket.acquire().await;
            let mut req = self.client.get(format!("{}/markets", self.config.rest_base_url)).query(&[
                ("status", "open"),
                ("series_ticker", series_ticker),
                ("limit", "100"),
            ]);
            if let Some(c) = &cursor {
                req = req.query(&[("cursor", c.as_str())]);
            }
            let resp: MarketsResponse = req.send().await?.error_for_status()?.json().await?;
            for entry in resp.markets {
                let mut market = Market::new(entry.ticker, entry.title, entry.event_ticker);
                market.status = parse_status(&entry.status);
                market.expiration_time = entry.expiration_time;
                market.yes_sub_title = entry.yes_sub_title;
                market.no_sub_title = entry.no_sub_title;
                market.category = if entry.category.is_empty() {
                    crate::category::derive_category(&market.title, &market.ticker)
                } else {
                    entry.category
                };
                out.push(market);
            }
            match resp.cursor {
                Some(next) if !next.is_empty() => cursor = Some(next),
                _ => break,
            }
        }
        Ok(out)
    }

    /// Per-market order-book loop: every `rest_poll_interval_secs`, fetches one
    /// book per active market with a 5s per-request timeout.
    pub async fn run_orderbook_loop(&self, cancel: CancellationToken) {
        let interval = Duration::from_secs(self.config.rest_poll_interval_secs);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("orderbook loop cancelled");
                    return;
                }
                _ = tokio::time::sleep(interval) => {}
            }
            self.orderbook_cycle().await;
        }
    }

    async fn orderbook_cycle(&self) {
        let markets = self.state.get_all_markets();
        let mut attempts = 0u64;
        let mut successes = 0u64;
        for market in markets.iter().filter(|m| m.status == MarketStatus::Active) {
            attempts += 1;
            self.bucket.acquire().await;
            match self.fetch_order_book(&market.ticker).await {
                Ok((yes_bids, no_bids)) => {
                    if self.state.update_from_upstream(&market.ticker, yes_bids, no_bids, 0).is_ok() {
                        successes += 1;
                    }
                }
                Err(e) => debug!(ticker = %market.ticker, error = %e, "order book fetch failed"),
            }
        }
        info!(attempts, successes, "order book cycle complete");
    }

    async fn fetch_order_book(&self, ticker: &str) -> Result<(Vec<PriceLevel>, Vec<PriceLevel>), reqwest::Error> {
        let path = format!("/markets/{ticker}/orderbook");
        let url = format!("{}{}", self.config.rest_base_url, path);
        let mut req = self.client.get(&url).timeout(Duration::from_secs(5));

        if let Some(signer) = &self.signer {
            let timestamp_ms = chrono::Utc::now().timestamp_millis();
            let headers = signer.sign("GET", &path, timestamp_ms, b"");
            req = req
                .header("KALSHI-ACCESS-KEY", headers.key_id)
                .header("KALSHI-ACCESS-SIGNATURE", headers.signature_b64)
                .header("KALSHI-ACCESS-TIMESTAMP", headers.timestamp_ms.to_string());
        }

        let resp: OrderBookResponse = req.send().await?.error_for_status()?.json().await?;
        Ok((parse_levels(&resp.orderbook_fp.yes_dollars), parse_levels(&resp.orderbook_fp.no_dollars)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_dollar_levels_into_cents() {
        let levels = vec![["0.47".to_string(), "100".to_string()], ["0.45".to_string(), "50".to_string()]];
        let parsed = parse_levels(&levels);
        assert_eq!(parsed, vec![(47, 100), (45, 50)]);
    }

    #[test]
    fn floors_rather_than_rounds_fractional_cents() {
        let levels = vec![["0.735".to_string(), "10".to_string()]];
        assert_eq!(parse_levels(&levels), vec![(73, 10)]);
    }

    #[test]
    fn exact_cent_prices_do_not_lose_a_cent_to_float_imprecision() {
        // "0.29" * 100.0 as f64 lands at 28.999999999999996; a naive
        // `.floor()` over that product silently truncates to 28 cents.
        let levels = vec![
            ["0.29".to_string(), "1".to_string()],
            ["0.57".to_string(), "1".to_string()],
            ["0.58".to_string(), "1".to_string()],
        ];
        assert_eq!(parse_levels(&levels), vec![(29, 1), (57, 1), (58, 1)]);
    }

    #[test]
    fn skips_unparseable_levels() {
        let levels = vec![["not-a-number".to_string(), "10".to_string()]];
        assert!(parse_levels(&levels).is_empty());
    }

    #[test]
    fn status_strings_map_to_known_variants() {
        assert_eq!(parse_status("open"), MarketStatus::Active);
        assert_eq!(parse_status("weird"), MarketStatus::Unknown);
    }
}
