//! Signal Processor: wakes on a fixed tick and derives per-market signals
//! plus an always-on quantitative-metrics bundle.

use crate::config::Config;
use crate::models::{Market, MarketStatus, QuantMetrics, Signal, SignalMetadata, SignalPayload, SignalType};
use crate::state::StateEngine;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Matches the scanner's depth-within-of-mid band used in its liquidity score.
const DEPTH_BAND_CENTS: u32 = 5;
/// Information-flow window: trades per minute, measured over five minutes.
const INFORMATION_FLOW_WINDOW_SECS: i64 = 300;
const BASELINE_WINDOW_MULTIPLIER: i64 = 5;

pub struct SignalProcessor {
    state: Arc<StateEngine>,
    interval_secs: u64,
    drift_window_secs: i64,
    drift_threshold: f64,
    imbalance_threshold: f64,
    volume_surge_threshold: f64,
    volume_window_secs: i64,
    out: Sender<Signal>,
}

impl SignalProcessor {
    pub fn new(state: Arc<StateEngine>, config: &Config, out: Sender<Signal>) -> Self {
        Self {
            state,
            interval_secs: config.signal_interval_secs.max(1),
            drift_window_secs: config.drift_window_secs as i64,
            drift_threshold: config.drift_threshold,
            imbalance_threshold: config.imbalance_threshold,
            volume_surge_threshold: config.volume_surge_threshold,
            volume_window_secs: config.volume_window_secs as i64,
            out,
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(self.interval_secs));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => self.tick_once(),
            }
        }
    }

    fn tick_once(&self) {
        for market in self.state.get_all_markets() {
            if market.status != MarketStatus::Active {
                continue;
            }
            let Some(book) = self.state.get_order_book(&market.ticker) else { continue };
            if book.best_yes_bid().is_none() && book.best_no_bid().is_none() {
                continue;
            }

            if let Some(signal) = self.orderbook_imbalance_signal(&market.ticker) {
                self.emit(signal);
            }
            if let Some(signal) = self.implied_probability_drift_signal(&market.ticker) {
                self.emit(signal);
            }
            if let Some(signal) = self.volume_surge_signal(&market.ticker) {
                self.emit(signal);
            }
            let bundle = self.quant_metrics(&market);
            self.emit(self.bundle_as_signal(bundle));
        }
    }

    fn emit(&self, signal: Signal) {
        // Non-blocking: the UI is a best-effort consumer, overflow is a drop not a failure.
        if self.out.try_send(signal).is_err() {
            debug!("signal channel full, dropping signal");
        }
    }

    fn orderbook_imbalance_signal(&self, ticker: &str) -> Option<Signal> {
        let book = self.state.get_order_book(ticker)?;
        let r = book.imbalance_ratio(usize::MAX);
        if r.abs() <= self.imbalance_threshold {
            return None;
        }
        let confidence = (r.abs() / self.imbalance_threshold).min(1.0);
        let spread = book.yes_spread().unwrap_or(0);
        Some(
            Signal::new(
                ticker,
                SignalType::OrderBookImbalance,
                r,
                SignalPayload::OrderbookImbalance { bid_ratio: r, spread_cents: spread },
            )
            .with_metadata(SignalMetadata { threshold_crossed: true, confidence, prior_value: None }),
        )
    }

    fn implied_probability_drift_signal(&self, ticker: &str) -> Option<Signal> {
        let book = self.state.get_order_book(ticker)?;
        let bid = book.best_yes_bid()? as f64;
        let ask = book.best_yes_ask()? as f64;
        let p_now = (bid + ask) / 200.0;

        let trades = self.state.recent_trades(ticker, self.drift_window_secs);
        if trades.is_empty() {
            return None;
        }
        let prices: Vec<f64> = trades.iter().map(|t| t.yes_price as f64 / 100.0).collect();
        let mean = mean_of(&prices);
        let sigma = stddev_of(&prices, mean);
        if sigma == 0.0 {
            return None;
        }
        let drift = (p_now - mean) / sigma;
        if drift.abs() <= self.drift_threshold {
            return None;
        }
        let confidence = (drift.abs() / self.drift_threshold).min(1.0);
        Some(
            Signal::new(
                ticker,
                SignalType::ImpliedProbabilityDrift,
                drift,
                SignalPayload::ImpliedProbabilityDrift {
                    delta: p_now - mean,
                    window_secs: self.drift_window_secs as u64,
                },
            )
            .with_metadata(SignalMetadata { threshold_crossed: true, confidence, prior_value: Some(mean) }),
        )
    }

    fn volume_surge_signal(&self, ticker: &str) -> Option<Signal> {
        let recent = self.state.recent_trades(ticker, self.volume_window_secs);
        let v_r: u64 = recent.iter().map(|t| t.count).sum();

        let baseline_window = self.volume_window_secs * BASELINE_WINDOW_MULTIPLIER;
        let baseline_trades = self.state.recent_trades(ticker, baseline_window);
        if baseline_trades.len() < 2 {
            return None;
        }
        let v_b: u64 = baseline_trades.iter().map(|t| t.count).sum();
        let baseline_rate = v_b as f64 / BASELINE_WINDOW_MULTIPLIER as f64;
        if baseline_rate == 0.0 {
            return None;
        }
        let ratio = v_r as f64 / baseline_rate;
        if ratio <= self.volume_surge_threshold {
            return None;
        }
        let confidence = (ratio / self.volume_surge_threshold).min(1.0);
        Some(
            Signal::new(
                ticker,
                SignalType::VolumeSurge,
                ratio,
                SignalPayload::VolumeSurge { multiplier: ratio, window_secs: self.volume_window_secs as u64 },
            )
            .with_metadata(SignalMetadata { threshold_crossed: true, confidence, prior_value: Some(baseline_rate) }),
        )
    }

    /// Always-on quantitative-metrics bundle, independent of any threshold crossing.
    pub fn quant_metrics(&self, market: &Market) -> QuantMetrics {
        let ticker = &market.ticker;
        let book = self.state.get_order_book(ticker);

        let (mid, spread_cents, bid_depth, ask_depth, imbalance) = match &book {
            Some(b) => (b.mid_cents().map(|m| m / 100.0), b.yes_spread(), b.bid_depth(usize::MAX), b.ask_depth(usize::MAX), b.imbalance_ratio(usize::MAX)),
            None => (None, None, 0, 0, 0.0),
        };

        let trades = self.state.recent_trades(ticker, self.drift_window_secs);
        let prices: Vec<f64> = trades.iter().map(|t| t.yes_price as f64 / 100.0).collect();
        let mean = mean_of(&prices);
        let stddev = stddev_of(&prices, mean);
        let z_score = if stddev > 0.0 { (mid.unwrap_or(mean) - mean) / stddev } else { 0.0 };
        let volume_window: u64 = trades.iter().map(|t| t.count).sum();

        let slope = linear_regression_slope(&prices);
        let trend_strength = (slope.abs() * 10.0).clamp(0.0, 1.0);

        let flow_trades = self.state.recent_trades(ticker, INFORMATION_FLOW_WINDOW_SECS);
        let information_flow = flow_trades.len() as f64 * 60.0 / INFORMATION_FLOW_WINDOW_SECS as f64;

        let efficiency = match spread_cents {
            Some(s) if stddev > 0.0 => ((s as f64 / 100.0) / stddev).min(1.0),
            _ => 0.0,
        };
        let sharpe = if stddev > 0.0 { (mid.unwrap_or(mean) - mean) / stddev } else { 0.0 };

        let seconds_to_expiry = market.expiration_time.map(|exp| (exp - chrono::Utc::now()).num_seconds());

        QuantMetrics {
            ticker: ticker.clone(),
            timestamp: chrono::Utc::now(),
            mid,
            spread_cents,
            bid_depth,
            ask_depth,
            imbalance,
            mean_implied_prob: mean,
            stddev_implied_prob: stddev,
            z_score,
            trend_strength,
            information_flow,
            efficiency,
            sharpe,
            trade_count_window: trades.len() as u64,
            volume_window,
            seconds_to_expiry,
        }
    }

    /// Emitted as a low-priority imbalance-type signal carrying the liquidity
    /// score as value and efficiency score as confidence, per the processor's
    /// always-on bundle requirement. Never counts as a threshold crossing:
    /// the dispatcher must not page on an informational bundle.
    fn bundle_as_signal(&self, bundle: QuantMetrics) -> Signal {
        let book = self.state.get_order_book(&bundle.ticker);
        let liquidity_score = book
            .as_ref()
            .map(|b| {
                let spread = b.yes_spread().unwrap_or(10_000) as f64;
                let spread_score = (1.0 - spread / 100.0).max(0.0);
                let (bid_qty, ask_qty) = b.depth_at_price(DEPTH_BAND_CENTS);
                let depth_score = ((bid_qty + ask_qty) as f64 / 1000.0).min(1.0);
                0.6 * spread_score + 0.4 * depth_score
            })
            .unwrap_or(0.0);
        let efficiency = bundle.efficiency;
        Signal {
            ticker: bundle.ticker.clone(),
            signal_type: SignalType::OrderBookImbalance,
            value: liquidity_score,
            timestamp: bundle.timestamp,
            metadata: SignalMetadata { threshold_crossed: false, confidence: efficiency, prior_value: None },
            payload: SignalPayload::QuantBundle(Box::new(bundle)),
        }
    }
}

fn mean_of(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

fn stddev_of(values: &[f64], mean: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Slope of trade price regressed on ordinal index (0, 1, 2, ...), via the
/// closed-form simple linear regression estimator. `0.0` with fewer than two points.
fn linear_regression_slope(prices: &[f64]) -> f64 {
    let n = prices.len();
    if n < 2 {
        return 0.0;
    }
    let xs: Vec<f64> = (0..n).map(|i| i as f64).collect();
    let x_mean = mean_of(&xs);
    let y_mean = mean_of(prices);
    let mut numerator = 0.0;
    let mut denominator = 0.0;
    for (x, y) in xs.iter().zip(prices.iter()) {
        numerator += (x - x_mean) * (y - y_mean);
        denominator += (x - x_mean).powi(2);
    }
    if denominator == 0.0 {
        return 0.0;
    }
    numerator / denominator
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Market, Trade, TradeSide};

    fn setup() -> (Arc<StateEngine>, tokio::sync::mpsc::Receiver<Signal>, SignalProcessor) {
        let state = StateEngine::new(1000, 1000);
        state.register_market(Market::new("TICK-1", "t", "EVT-1"));
        let (tx, rx) = tokio::sync::mpsc::channel(100);
        let mut config = Config::default();
        config.imbalance_threshold = 0.3;
        config.drift_threshold = 2.0;
        config.volume_surge_threshold = 3.0;
        let processor = SignalProcessor::new(state.clone(), &config, tx);
        (state, rx, processor)
    }

    #[tokio::test]
    async fn imbalance_signal_fires_above_threshold() {
        let (state, mut rx, processor) = setup();
        state.update_from_upstream("TICK-1", vec![(60, 900)], vec![(40, 10)], 1).unwrap();
        processor.tick_once();
        let mut saw_imbalance = false;
        while let Ok(sig) = rx.try_recv() {
            if matches!(sig.signal_type, SignalType::OrderBookImbalance) && sig.value.abs() > 0.3 && sig.metadata.threshold_crossed {
                saw_imbalance = true;
            }
        }
        assert!(saw_imbalance);
    }

    #[tokio::test]
    async fn volume_surge_requires_baseline_history() {
        let (state, _rx, processor) = setup();
        state.update_from_upstream("TICK-1", vec![(50, 10)], vec![(50, 10)], 1).unwrap();
        state.add_trade(Trade {
            ticker: "TICK-1".to_string(),
            trade_id: "1".to_string(),
            yes_price: 50,
            no_price: 50,
            count: 100,
            taker_side: TradeSide::Yes,
            created_time: chrono::Utc::now(),
        });
        assert!(processor.volume_surge_signal("TICK-1").is_none());
    }

    #[tokio::test]
    async fn quant_metrics_are_zeroed_without_trades() {
        let (_state, _rx, processor) = setup();
        let market = Market::new("TICK-1", "t", "EVT-1");
        let bundle = processor.quant_metrics(&market);
        assert_eq!(bundle.mean_implied_prob, 0.0);
        assert_eq!(bundle.trade_count_window, 0);
    }

    #[tokio::test]
    async fn bundle_signal_never_reports_a_threshold_crossing() {
        let (state, mut rx, processor) = setup();
        state.update_from_upstream("TICK-1", vec![(50, 10)], vec![(50, 10)], 1).unwrap();
        processor.tick_once();
        let mut saw_bundle = false;
        while let Ok(sig) = rx.try_recv() {
            if matches!(&sig.payload, crate::models::SignalPayload::QuantBundle(_)) {
                saw_bundle = true;
                assert!(!sig.metadata.threshold_crossed);
            }
        }
        assert!(saw_bundle);
    }

    #[test]
    fn linear_regression_detects_upward_trend() {
        let prices = vec![50.0, 51.0, 52.0, 53.0, 54.0];
        let slope = linear_regression_slope(&prices);
        assert!((slope - 1.0).abs() < 1e-9);
    }
}
