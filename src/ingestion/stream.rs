//! Stream Handler: one push connection to the upstream venue's stream
//! endpoint, with frame-type dispatch and exponential-backoff reconnection.

use crate::models::{Trade, TradeSide};
use crate::state::StateEngine;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use std::cell::Cell;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::interval;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

const PING_INTERVAL: Duration = Duration::from_secs(30);
const RECONNECT_BASE_SECS_DEFAULT: u64 = 5;
const RECONNECT_CAP_SECS: u64 = 60;

#[derive(Debug, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    frame_type: String,
    ticker: Option<String>,
    #[serde(default)]
    orderbook_fp: Option<OrderBookFootprint>,
    price: Option<f64>,
    count: Option<u64>,
    side: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OrderBookFootprint {
    #[serde(default)]
    yes_dollars: Vec<[String; 2]>,
    #[serde(default)]
    no_dollars: Vec<[String; 2]>,
}

/// Same decimal-string cents conversion as the REST path (see its
/// `parse_dollars_to_cents`), so a book replayed from either source derives
/// identical prices for identical dollar strings — and so the stream path
/// doesn't lose a cent to the same `f64 * 100.0` imprecision the REST path
/// used to hit (`"0.29"` floors to `28.999999999999996` before truncation).
fn parse_dollars_to_cents(price: &str) -> Option<u32> {
    let trimmed = price.trim();
    let (whole, frac) = trimmed.split_once('.').unwrap_or((trimmed, ""));
    let whole: u32 = whole.parse().ok()?;
    let mut frac_digits = frac.chars();
    let tenths = frac_digits.next().map_or(Ok(0), |c| c.to_digit(10).ok_or(())).ok()?;
    let hundredths = frac_digits.next().map_or(Ok(0), |c| c.to_digit(10).ok_or(())).ok()?;
    Some(whole * 100 + tenths * 10 + hundredths)
}

fn parse_levels(levels: &[[String; 2]]) -> Vec<(u32, u64)> {
    levels
        .iter()
        .filter_map(|[price, qty]| {
            let price_cents = parse_dollars_to_cents(price)?;
            let size = qty.parse::<f64>().ok()? as u64;
            Some((price_cents, size))
        })
        .collect()
}

pub struct StreamHandler {
    url: String,
    reconnect_base_secs: u64,
    state: Arc<StateEngine>,
}

impl StreamHandler {
    pub fn new(url: impl Into<String>, reconnect_base_secs: u64, state: Arc<StateEngine>) -> Self {
        Self {
            url: url.into(),
            reconnect_base_secs: if reconnect_base_secs == 0 { RECONNECT_BASE_SECS_DEFAULT } else { reconnect_base_secs },
            state,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let base = Duration::from_secs(self.reconnect_base_secs);
        let delay = Cell::new(base);
        loop {
            if cancel.is_cancelled() {
                return;
            }
            if let Err(e) = self.connect_and_read(&cancel, &delay, base).await {
                warn!(error = %e, "stream connection lost, will reconnect");
            }
            if cancel.is_cancelled() {
                return;
            }
            let wait = delay.get();
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(wait) => {}
            }
            delay.set((wait * 2).min(Duration::from_secs(RECONNECT_CAP_SECS)));
        }
    }

    async fn connect_and_read(&self, cancel: &CancellationToken, delay: &Cell<Duration>, base: Duration) -> Result<(), String> {
        let (ws_stream, _) = connect_async(&self.url).await.map_err(|e| e.to_string())?;
        // Reset immediately on a successful connect, not only on a clean exit:
        // a connect-then-drop must restart backoff from base, not keep escalating.
        delay.set(base);
        info!("stream connected");
        let (mut write, mut read) = ws_stream.split();
        let mut ping = interval(PING_INTERVAL);
        ping.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    let _ = write.close().await;
                    return Ok(());
                }
                _ = ping.tick() => {
                    if write.send(Message::Ping(Vec::new())).await.is_err() {
                        return Err("ping send failed".to_string());
                    }
                }
                msg = read.next() => {
                    match msg {
                        Some(Ok(Message::Text(text))) => self.handle_frame(&text),
                        Some(Ok(Message::Close(_))) | None => return Ok(()),
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.to_string()),
                    }
                }
            }
        }
    }

    fn handle_frame(&self, text: &str) {
        let frame: Frame = match serde_json::from_str(text) {
            Ok(f) => f,
            Err(e) => {
                debug!(error = %e, "unparseable stream frame, ignoring");
                return;
            }
        };
        match frame.frame_type.as_str() {
            "orderbook" | "orderbook_update" => {
                let (Some(ticker), Some(book)) = (frame.ticker, frame.orderbook_fp) else { return };
                let yes = parse_levels(&book.yes_dollars);
                let no = parse_levels(&book.no_dollars);
                if self.state.update_from_upstream(&ticker, yes, no, 0).is_err() {
                    debug!(%ticker, "orderbook update for unknown market, dropped");
                }
            }
            "trade" | "trade_update" => {
                let (Some(ticker), Some(price), Some(count)) = (frame.ticker, frame.price, frame.count) else { return };
                let side = match frame.side.as_deref() {
                    Some("no") => TradeSide::No,
                    _ => TradeSide::Yes,
                };
                let yes_price = (price * 100.0).round() as u32;
                self.state.add_trade(Trade {
                    ticker,
                    trade_id: format!("stream-{}", chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default()),
                    yes_price,
                    no_price: 10_000 - yes_price,
                    count,
                    taker_side: side,
                    created_time: chrono::Utc::now(),
                });
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;

    fn engine() -> Arc<StateEngine> {
        let engine = StateEngine::new(100, 100);
        engine.register_market(Market::new("TICK-1", "t", "EVT-1"));
        engine
    }

    #[test]
    fn handle_frame_ignores_unknown_types() {
        let handler = StreamHandler::new("wss://example", 5, engine());
        handler.handle_frame(r#"{"type":"heartbeat"}"#);
    }

    #[test]
    fn handle_frame_applies_orderbook_update() {
        let state = engine();
        let handler = StreamHandler::new("wss://example", 5, state.clone());
        let frame = r#"{"type":"orderbook","ticker":"TICK-1","orderbook_fp":{"yes_dollars":[["0.47","100"]],"no_dollars":[["0.50","200"]]}}"#;
        handler.handle_frame(frame);
        let book = state.get_order_book("TICK-1").unwrap();
        assert_eq!(book.best_yes_bid(), Some(47));
    }

    #[test]
    fn handle_frame_records_trade() {
        let state = engine();
        let handler = StreamHandler::new("wss://example", 5, state.clone());
        let frame = r#"{"type":"trade","ticker":"TICK-1","price":0.5,"count":10,"side":"yes"}"#;
        handler.handle_frame(frame);
        assert_eq!(state.all_trades("TICK-1").len(), 1);
    }
}
