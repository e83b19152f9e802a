//! Read API: the HTTP surface plus a 1 Hz server-push signal stream.
//!
//! Routing, CORS and request-logging wiring follow the teacher's
//! `Router::new().merge(...).layer(CorsLayer::permissive())` shape in
//! `main.rs`; this module just owns the routes and their shared state
//! instead of the teacher's.

use crate::category::derive_category;
use crate::models::{Alert, AlertType, OrderBook, Signal, SignalPayload, SignalType};
use crate::scanner::{NoArbDetector, Scanner};
use crate::state::StateEngine;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use parking_lot::Mutex;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::debug;

const SIGNAL_RING_CAPACITY: usize = 1000;
const ALERT_RING_CAPACITY: usize = 1000;
const DEFAULT_QUERY_LIMIT: usize = 100;

/// Shared read-side state: the engine itself plus the two ring buffers the
/// background drain tasks feed and every handler reads a defensive copy of.
#[derive(Clone)]
pub struct ApiState {
    state: Arc<StateEngine>,
    scanner: Arc<Scanner>,
    noarb: Arc<NoArbDetector>,
    signals: Arc<Mutex<VecDeque<Signal>>>,
    alerts: Arc<Mutex<VecDeque<Alert>>>,
    /// Total signals ever pushed, never reset or capped by the ring's
    /// capacity — lets the stream endpoint detect "new since last poll"
    /// after the ring itself has wrapped.
    signal_seq: Arc<AtomicU64>,
}

impl ApiState {
    pub fn new(state: Arc<StateEngine>) -> Self {
        Self {
            scanner: Arc::new(Scanner::new(state.clone())),
            noarb: Arc::new(NoArbDetector::new(state.clone())),
            state,
            signals: Arc::new(Mutex::new(VecDeque::with_capacity(SIGNAL_RING_CAPACITY))),
            alerts: Arc::new(Mutex::new(VecDeque::with_capacity(ALERT_RING_CAPACITY))),
            signal_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Drains the signal channel into the ring buffer until the channel
    /// closes or cancellation fires. One of the server's always-running tasks
    /// when nothing else also needs this channel's output.
    pub async fn run_signal_drain(&self, mut signals: Receiver<Signal>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe_signal = signals.recv() => {
                    match maybe_signal {
                        Some(signal) => self.record_signal(signal),
                        None => return,
                    }
                }
            }
        }
    }

    /// Records one signal into the ring. Synchronous and called directly from
    /// the fan-out task that also forwards the same signal to the alert
    /// dispatcher, since the processor's output channel has exactly one receiver.
    pub fn record_signal(&self, signal: Signal) {
        let mut ring = self.signals.lock();
        if ring.len() >= SIGNAL_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(signal);
        self.signal_seq.fetch_add(1, Ordering::Release);
    }

    /// Records one alert into the ring. Synchronous: the alert engine's
    /// output only ever feeds this ring, unlike the signal channel.
    pub fn record_alert(&self, alert: Alert) {
        let mut ring = self.alerts.lock();
        if ring.len() >= ALERT_RING_CAPACITY {
            ring.pop_front();
        }
        ring.push_back(alert);
    }
}

/// Builds the `/api/v1` router over the shared read-side state. The
/// background drain/tick tasks that feed it are spawned separately by the
/// caller, alongside every other long-running loop.
pub fn router(api_state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/markets", get(list_markets))
        .route("/markets/:ticker", get(get_market))
        .route("/markets/:ticker/orderbook", get(get_orderbook))
        .route("/markets/:ticker/debug", get(get_debug))
        .route("/categories", get(get_categories))
        .route("/scanner/opportunities", get(get_opportunities))
        .route("/scanner/noarb", get(get_noarb))
        .route("/signals", get(get_signals))
        .route("/alerts", get(get_alerts))
        .route("/stream/signals", get(stream_signals))
        .with_state(api_state)
}

async fn health(State(state): State<ApiState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now(),
        "markets": state.state.market_count(),
    }))
}

async fn list_markets(State(state): State<ApiState>) -> Json<Value> {
    let markets = state.state.get_all_markets();
    Json(json!({
        "count": markets.len(),
        "timestamp": chrono::Utc::now(),
        "markets": markets,
    }))
}

async fn get_market(State(state): State<ApiState>, Path(ticker): Path<String>) -> Response {
    match state.state.get_market(&ticker) {
        Some(market) => Json(json!({
            "timestamp": chrono::Utc::now(),
            "market": market,
        }))
        .into_response(),
        None => not_found(&ticker),
    }
}

/// Bids descending and (derived) asks ascending, per the binary-market
/// derivation rule. A known market with no book yet still returns empty
/// lists rather than 404; only a never-registered ticker 404s.
fn orderbook_json(book: &OrderBook) -> Value {
    let asks: Vec<(u32, u64)> = book.no_bids.iter().map(|(p, sz)| (10_000 - p, *sz)).collect();
    json!({
        "bids": book.yes_bids,
        "asks": asks,
        "sequence": book.sequence,
        "staleness_secs": book.staleness_secs(),
    })
}

async fn get_orderbook(State(state): State<ApiState>, Path(ticker): Path<String>) -> Response {
    if state.state.get_market(&ticker).is_none() {
        return not_found(&ticker);
    }
    let book = state.state.get_order_book(&ticker).unwrap_or_else(|| OrderBook::new(ticker.clone()));
    Json(json!({
        "ticker": ticker,
        "timestamp": chrono::Utc::now(),
        "orderbook": orderbook_json(&book),
    }))
    .into_response()
}

async fn get_debug(State(state): State<ApiState>, Path(ticker): Path<String>) -> Response {
    let Some(market) = state.state.get_market(&ticker) else { return not_found(&ticker) };
    let book = state.state.get_order_book(&ticker).unwrap_or_else(|| OrderBook::new(ticker.clone()));
    let violations: Vec<String> = state
        .state
        .recent_invariant_violations()
        .into_iter()
        .filter(|v| v.contains(ticker.as_str()))
        .collect();
    let recent_snapshots = state.state.recent_snapshots(&ticker, 20);
    let opportunity = state.scanner.derive_opportunity(&ticker);
    Json(json!({
        "timestamp": chrono::Utc::now(),
        "market": market,
        "orderbook": orderbook_json(&book),
        "recent_snapshots": recent_snapshots,
        "opportunity": opportunity,
        "invariant_violations": violations,
    }))
    .into_response()
}

async fn get_categories(State(state): State<ApiState>) -> Json<Value> {
    use std::collections::BTreeMap;
    let mut grouped: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for market in state.state.get_all_markets() {
        let label = if market.category.is_empty() {
            derive_category(&market.title, &market.ticker)
        } else {
            market.category.clone()
        };
        grouped.entry(label).or_default().push(market.ticker);
    }
    Json(json!({
        "count": grouped.len(),
        "timestamp": chrono::Utc::now(),
        "categories": grouped,
    }))
}

async fn get_opportunities(State(state): State<ApiState>) -> Json<Value> {
    let opportunities = state.scanner.scan();
    Json(json!({
        "count": opportunities.len(),
        "timestamp": chrono::Utc::now(),
        "opportunities": opportunities,
    }))
}

async fn get_noarb(State(state): State<ApiState>) -> Json<Value> {
    let violations: Vec<_> = state.noarb.scan().into_iter().filter(|v| v.is_actionable()).collect();
    Json(json!({
        "count": violations.len(),
        "timestamp": chrono::Utc::now(),
        "violations": violations,
    }))
}

#[derive(Debug, Deserialize)]
struct SignalQuery {
    market_ticker: Option<String>,
    #[serde(rename = "type")]
    signal_type: Option<String>,
    limit: Option<usize>,
}

fn parse_signal_type(raw: &str) -> Option<SignalType> {
    match raw {
        "order_book_imbalance" => Some(SignalType::OrderBookImbalance),
        "implied_probability_drift" => Some(SignalType::ImpliedProbabilityDrift),
        "volume_surge" => Some(SignalType::VolumeSurge),
        _ => None,
    }
}

async fn get_signals(State(state): State<ApiState>, Query(q): Query<SignalQuery>) -> Json<Value> {
    let wanted_type = q.signal_type.as_deref().and_then(parse_signal_type);
    let limit = q.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let ring = state.signals.lock();
    let filtered: Vec<Signal> = ring
        .iter()
        .rev()
        .filter(|s| q.market_ticker.as_deref().map(|t| s.ticker == t).unwrap_or(true))
        .filter(|s| wanted_type.map(|t| s.signal_type == t).unwrap_or(true))
        .take(limit)
        .cloned()
        .collect();
    Json(json!({
        "count": filtered.len(),
        "timestamp": chrono::Utc::now(),
        "signals": filtered,
    }))
}

#[derive(Debug, Deserialize)]
struct AlertQuery {
    market_ticker: Option<String>,
    #[serde(rename = "type")]
    alert_type: Option<String>,
    limit: Option<usize>,
}

fn parse_alert_type(raw: &str) -> Option<AlertType> {
    match raw {
        "spread_tightened" => Some(AlertType::SpreadTightened),
        "depth_increased" => Some(AlertType::DepthIncreased),
        "imbalance_pressure" => Some(AlertType::ImbalancePressure),
        "no_arb_violation" => Some(AlertType::NoArbViolation),
        "execution_ready" => Some(AlertType::ExecutionReady),
        "price_drift" => Some(AlertType::PriceDrift),
        _ => None,
    }
}

async fn get_alerts(State(state): State<ApiState>, Query(q): Query<AlertQuery>) -> Json<Value> {
    let wanted_type = q.alert_type.as_deref().and_then(parse_alert_type);
    let limit = q.limit.unwrap_or(DEFAULT_QUERY_LIMIT);
    let ring = state.alerts.lock();
    let filtered: Vec<Alert> = ring
        .iter()
        .rev()
        .filter(|a| q.market_ticker.as_deref().map(|t| a.subject == t).unwrap_or(true))
        .filter(|a| wanted_type.map(|t| a.alert_type == t).unwrap_or(true))
        .take(limit)
        .cloned()
        .collect();
    Json(json!({
        "count": filtered.len(),
        "timestamp": chrono::Utc::now(),
        "alerts": filtered,
    }))
}

/// Server-push stream of newly-arrived signals, polled off the ring at 1 Hz:
/// one JSON object per line, never closing on its own.
///
/// Tracks a monotonic sequence number rather than the ring's length/position:
/// once the ring reaches `SIGNAL_RING_CAPACITY` its length pins at capacity
/// forever, so a length-based "new since last poll" check would go permanently
/// stale the first time the ring fills.
async fn stream_signals(State(state): State<ApiState>) -> Response {
    use axum::body::Body;
    use futures_util::stream;

    let initial_seq = state.signal_seq.load(Ordering::Acquire);
    let body_stream = stream::unfold((state, initial_seq), |(state, last_seq)| async move {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let current_seq = state.signal_seq.load(Ordering::Acquire);
        let new_items: Vec<Signal> = {
            let ring = state.signals.lock();
            let new_count = current_seq.saturating_sub(last_seq).min(ring.len() as u64) as usize;
            ring.iter().rev().take(new_count).rev().cloned().collect()
        };
        let mut chunk = String::new();
        for signal in &new_items {
            match serde_json::to_string(signal) {
                Ok(line) => {
                    chunk.push_str(&line);
                    chunk.push('\n');
                }
                Err(e) => debug!(error = %e, "failed to encode signal for stream"),
            }
        }
        Some((Ok::<_, std::convert::Infallible>(chunk), (state, current_seq)))
    });

    Response::builder()
        .status(StatusCode::OK)
        .header("content-type", "text/plain; charset=utf-8")
        .header("cache-control", "no-cache")
        .body(Body::from_stream(body_stream))
        .expect("static headers always build a valid response")
}

fn not_found(ticker: &str) -> Response {
    (StatusCode::NOT_FOUND, Json(json!({ "error": "market not found", "ticker": ticker }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;

    fn state_with_market() -> Arc<StateEngine> {
        let state = StateEngine::new(100, 100);
        state.register_market(Market::new("TICK-1", "t", "EVT-1"));
        state
    }

    #[test]
    fn parses_known_signal_type_strings() {
        assert_eq!(parse_signal_type("volume_surge"), Some(SignalType::VolumeSurge));
        assert_eq!(parse_signal_type("unknown"), None);
    }

    #[test]
    fn parses_known_alert_type_strings() {
        assert_eq!(parse_alert_type("no_arb_violation"), Some(AlertType::NoArbViolation));
        assert_eq!(parse_alert_type("unknown"), None);
    }

    #[tokio::test]
    async fn health_reports_market_count() {
        let api_state = ApiState::new(state_with_market());
        let Json(body) = health(State(api_state)).await;
        assert_eq!(body["markets"], 1);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn unknown_ticker_404s_but_registered_ticker_returns_empty_book() {
        let api_state = ApiState::new(state_with_market());
        let ghost = get_orderbook(State(api_state.clone()), Path("GHOST".to_string())).await;
        assert_eq!(ghost.status(), StatusCode::NOT_FOUND);

        let known = get_orderbook(State(api_state), Path("TICK-1".to_string())).await;
        assert_eq!(known.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn signal_ring_drains_and_filters_by_ticker() {
        let api_state = ApiState::new(state_with_market());
        let (tx, rx) = tokio::sync::mpsc::channel(10);
        let cancel = CancellationToken::new();
        let drain_state = api_state.clone();
        let drain_cancel = cancel.clone();
        let handle = tokio::spawn(async move { drain_state.run_signal_drain(rx, drain_cancel).await });

        let payload = SignalPayload::VolumeSurge { multiplier: 4.0, window_secs: 30 };
        tx.send(Signal::new("TICK-1", SignalType::VolumeSurge, 4.0, payload.clone())).await.unwrap();
        tx.send(Signal::new("TICK-2", SignalType::VolumeSurge, 4.0, payload)).await.unwrap();
        drop(tx);
        handle.await.unwrap();
        cancel.cancel();

        let Json(body) = get_signals(
            State(api_state),
            Query(SignalQuery { market_ticker: Some("TICK-1".to_string()), signal_type: None, limit: None }),
        )
        .await;
        assert_eq!(body["count"], 1);
    }
}
