//! Alert Dispatcher: drains the signal channel and delivers webhook
//! notifications for threshold crossings, fire-and-forget, with a
//! per-(market, type) cool-down.

use crate::models::{Signal, SignalPayload};
use parking_lot::Mutex;
use reqwest::Client;
use serde_json::json;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::Receiver;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// One configured outbound sink. `Content` POSTs `{"content": message}`,
/// `Text` POSTs `{"text": message}` — two generic chat-webhook shapes.
#[derive(Debug, Clone)]
pub enum SinkShape {
    Content,
    Text,
}

#[derive(Debug, Clone)]
pub struct WebhookSink {
    pub url: String,
    pub shape: SinkShape,
}

pub struct AlertDispatcher {
    client: Client,
    sinks: Vec<WebhookSink>,
    cooldown: Duration,
    last_sent: Mutex<HashMap<(String, String), Instant>>,
}

impl AlertDispatcher {
    pub fn new(sinks: Vec<WebhookSink>, cooldown_secs: u64) -> Self {
        Self {
            client: Client::new(),
            sinks,
            cooldown: Duration::from_secs(cooldown_secs),
            last_sent: Mutex::new(HashMap::new()),
        }
    }

    pub async fn run(&self, mut signals: Receiver<Signal>, cancel: CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                maybe_signal = signals.recv() => {
                    match maybe_signal {
                        Some(signal) => self.handle(signal).await,
                        None => return,
                    }
                }
            }
        }
    }

    async fn handle(&self, signal: Signal) {
        if !signal.metadata.threshold_crossed {
            return;
        }
        let key = (format!("{:?}", signal.signal_type), signal.ticker.clone());
        if self.in_cooldown(&key) {
            debug!(ticker = %signal.ticker, "signal suppressed by cool-down");
            return;
        }
        self.mark_sent(key);

        let message = format_message(&signal);
        for sink in &self.sinks {
            let client = self.client.clone();
            let sink = sink.clone();
            let message = message.clone();
            tokio::spawn(async move {
                if let Err(e) = deliver(&client, &sink, &message).await {
                    warn!(url = %sink.url, error = %e, "webhook delivery failed, not retrying");
                }
            });
        }
    }

    fn in_cooldown(&self, key: &(String, String)) -> bool {
        let last_sent = self.last_sent.lock();
        match last_sent.get(key) {
            Some(instant) => instant.elapsed() < self.cooldown,
            None => false,
        }
    }

    fn mark_sent(&self, key: (String, String)) {
        self.last_sent.lock().insert(key, Instant::now());
    }
}

fn format_message(signal: &Signal) -> String {
    let payload = match &signal.payload {
        SignalPayload::OrderbookImbalance { bid_ratio, spread_cents } => {
            format!("bid_ratio={bid_ratio:.3} spread_cents={spread_cents}")
        }
        SignalPayload::ImpliedProbabilityDrift { delta, window_secs } => {
            format!("delta={delta:.4} window_secs={window_secs}")
        }
        SignalPayload::VolumeSurge { multiplier, window_secs } => {
            format!("multiplier={multiplier:.2} window_secs={window_secs}")
        }
        SignalPayload::QuantBundle(_) => "quant bundle".to_string(),
    };
    format!(
        "[{:?}] {}: value={:.4} confidence={:.2} ({payload})",
        signal.signal_type, signal.ticker, signal.value, signal.metadata.confidence
    )
}

async fn deliver(client: &Client, sink: &WebhookSink, message: &str) -> Result<(), reqwest::Error> {
    let body = match sink.shape {
        SinkShape::Content => json!({ "content": message }),
        SinkShape::Text => json!({ "text": message }),
    };
    let response = client.post(&sink.url).json(&body).send().await?;
    let status = response.status();
    if status.is_success() || status.as_u16() == 204 {
        Ok(())
    } else {
        response.error_for_status().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SignalMetadata, SignalType};

    fn sample_signal(threshold_crossed: bool) -> Signal {
        Signal {
            ticker: "TICK-1".to_string(),
            signal_type: SignalType::OrderBookImbalance,
            value: 0.5,
            timestamp: chrono::Utc::now(),
            metadata: SignalMetadata { threshold_crossed, confidence: 0.8, prior_value: None },
            payload: SignalPayload::OrderbookImbalance { bid_ratio: 0.5, spread_cents: 10 },
        }
    }

    #[test]
    fn cooldown_suppresses_repeat_signals() {
        let dispatcher = AlertDispatcher::new(vec![], 300);
        let key = (format!("{:?}", SignalType::OrderBookImbalance), "TICK-1".to_string());
        assert!(!dispatcher.in_cooldown(&key));
        dispatcher.mark_sent(key.clone());
        assert!(dispatcher.in_cooldown(&key));
    }

    #[test]
    fn message_includes_confidence_and_payload() {
        let message = format_message(&sample_signal(true));
        assert!(message.contains("confidence=0.80"));
        assert!(message.contains("bid_ratio=0.500"));
    }

    #[tokio::test]
    async fn non_crossing_signal_is_not_dispatched() {
        let dispatcher = AlertDispatcher::new(vec![], 300);
        dispatcher.handle(sample_signal(false)).await;
        let key = (format!("{:?}", SignalType::OrderBookImbalance), "TICK-1".to_string());
        assert!(!dispatcher.in_cooldown(&key));
    }
}
