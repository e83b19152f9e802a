//! Alert Engine: fuses scanner opportunities and no-arb violations with a
//! historical hit-rate estimator into actionable alerts, on a 5s tick.

use crate::models::{Alert, AlertType, HitRateStats, NoArbViolation, Opportunity, SuggestedAction};
use crate::scanner::{NoArbDetector, Scanner};
use crate::state::StateEngine;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc::Sender;
use tokio_util::sync::CancellationToken;

const TICK_SECS: u64 = 5;
const POST_ALERT_WINDOW_SECS: i64 = 60;

const SPREAD_TIGHT_PCT: f64 = 0.5;
const DEPTH_INCREASED_MIN: u64 = 500;
const IMBALANCE_PRESSURE_RATIO: f64 = 0.6;
const IMBALANCE_PRESSURE_MICROPRICE_DELTA: f64 = 1.0;
const EXECUTION_READY_LIQUIDITY: f64 = 0.7;
const EXECUTION_READY_SPREAD_PCT: f64 = 1.0;

/// A fired alert pending its post-alert outcome window, so the estimator
/// can later fold the result back into [`HitRateStats`].
struct PendingOutcome {
    alert_type: AlertType,
    ticker: String,
    suggested_action: SuggestedAction,
    mid_at_fire: f64,
    estimated_edge_cents: f64,
    estimated_slippage_cents: f64,
    fired_at: chrono::DateTime<chrono::Utc>,
}

pub struct AlertEngine {
    state: Arc<StateEngine>,
    scanner: Scanner,
    noarb: NoArbDetector,
    out: Sender<Alert>,
    hit_rates: RwLock<HashMap<(AlertType, String), HitRateStats>>,
    pending: RwLock<Vec<PendingOutcome>>,
}

impl AlertEngine {
    pub fn new(state: Arc<StateEngine>, out: Sender<Alert>) -> Self {
        Self {
            scanner: Scanner::new(state.clone()),
            noarb: NoArbDetector::new(state.clone()),
            state,
            out,
            hit_rates: RwLock::new(HashMap::new()),
            pending: RwLock::new(Vec::new()),
        }
    }

    pub async fn run(&self, cancel: CancellationToken) {
        let mut tick = tokio::time::interval(std::time::Duration::from_secs(TICK_SECS));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tick.tick() => self.tick_once(),
            }
        }
    }

    fn tick_once(&self) {
        self.settle_pending();

        let opportunities = self.scanner.scan();
        for opp in &opportunities {
            for alert in self.alerts_for_opportunity(opp) {
                self.fire(alert);
            }
        }

        for violation in self.noarb.scan() {
            if violation.is_actionable() {
                self.fire(self.alert_for_noarb(&violation));
            }
        }
    }

    fn alerts_for_opportunity(&self, opp: &Opportunity) -> Vec<Alert> {
        let mut out = Vec::new();
        let top5_depth = opp.bid_depth_top5 + opp.ask_depth_top5;
        // `slippage_100` is already `|avg_fill - mid|`; the 10000 sentinel
        // (no fill, or no mid) isn't a real edge, so don't let it pass through.
        let slippage_cents = if opp.slippage_100 >= 10_000.0 { 0.0 } else { opp.slippage_100 };

        if let Some(pct) = opp.spread_pct {
            if pct < SPREAD_TIGHT_PCT && pct > 0.0 {
                out.push(self.build_alert(
                    AlertType::SpreadTightened,
                    &opp.ticker,
                    "spread has tightened below threshold",
                    SuggestedAction::Watch,
                    vec![("spread_pct".to_string(), SPREAD_TIGHT_PCT, pct)],
                    opp.spread_cents.map(|s| s as f64).unwrap_or(0.0),
                    slippage_cents,
                ));
            }
        }

        if top5_depth > DEPTH_INCREASED_MIN {
            out.push(self.build_alert(
                AlertType::DepthIncreased,
                &opp.ticker,
                "top-5 depth has increased materially",
                SuggestedAction::Watch,
                vec![("top5_depth".to_string(), DEPTH_INCREASED_MIN as f64, top5_depth as f64)],
                0.0,
                slippage_cents,
            ));
        }

        if let Some(delta) = opp.microprice_minus_mid {
            if opp.imbalance.abs() > IMBALANCE_PRESSURE_RATIO && delta.abs() > IMBALANCE_PRESSURE_MICROPRICE_DELTA {
                let action = if opp.imbalance > 0.0 { SuggestedAction::Buy } else { SuggestedAction::Sell };
                out.push(self.build_alert(
                    AlertType::ImbalancePressure,
                    &opp.ticker,
                    "book imbalance is pressuring price away from mid",
                    action,
                    vec![
                        ("imbalance".to_string(), IMBALANCE_PRESSURE_RATIO, opp.imbalance),
                        ("microprice_delta".to_string(), IMBALANCE_PRESSURE_MICROPRICE_DELTA, delta),
                    ],
                    delta.abs(),
                    slippage_cents,
                ));
            }
        }

        if let Some(pct) = opp.spread_pct {
            if opp.liquidity_score > EXECUTION_READY_LIQUIDITY && pct < EXECUTION_READY_SPREAD_PCT && opp.can_execute_100 {
                out.push(self.build_alert(
                    AlertType::ExecutionReady,
                    &opp.ticker,
                    "book is liquid and tight enough to execute a reference-size order",
                    SuggestedAction::Watch,
                    vec![("liquidity_score".to_string(), EXECUTION_READY_LIQUIDITY, opp.liquidity_score)],
                    0.0,
                    slippage_cents,
                ));
            }
        }

        out
    }

    fn alert_for_noarb(&self, violation: &NoArbViolation) -> Alert {
        let edge_cents = violation.net_arb * 100.0;
        let slippage_cents = NoArbViolation::SLIPPAGE_PER_LEG_CENTS * violation.legs.len() as f64;
        self.build_alert(
            AlertType::NoArbViolation,
            &violation.event_ticker,
            &format!("cross-market no-arb violation across {} legs", violation.legs.len()),
            SuggestedAction::Buy,
            vec![("net_arb".to_string(), NoArbViolation::ACTIONABLE_NET_ARB, violation.net_arb)],
            edge_cents,
            slippage_cents,
        )
    }

    fn build_alert(
        &self,
        alert_type: AlertType,
        subject: &str,
        reason: &str,
        suggested_action: SuggestedAction,
        thresholds_consulted: Vec<(String, f64, f64)>,
        estimated_edge_cents: f64,
        estimated_slippage_cents: f64,
    ) -> Alert {
        let key = (alert_type, subject.to_string());
        let stats = self.hit_rates.read().get(&key).cloned().unwrap_or_default();
        // No history: explicitly low confidence rather than a neutral default.
        let (confidence_value, hit_rate, sample_size) = if stats.sample_count == 0 {
            (0.3, 0.0, 0)
        } else {
            (stats.confidence(), stats.hit_rate(), stats.sample_count)
        };

        let book = self.state.get_order_book(subject);
        let mid = book.as_ref().and_then(|b| match (b.best_yes_bid(), b.best_yes_ask()) {
            (Some(bid), Some(ask)) => Some((bid + ask) as f64 / 2.0),
            _ => None,
        });
        if let Some(mid) = mid {
            self.pending.write().push(PendingOutcome {
                alert_type,
                ticker: subject.to_string(),
                suggested_action,
                mid_at_fire: mid,
                estimated_edge_cents,
                estimated_slippage_cents,
                fired_at: chrono::Utc::now(),
            });
        }

        Alert {
            alert_type,
            subject: subject.to_string(),
            reason: reason.to_string(),
            suggested_action,
            thresholds_consulted,
            confidence: confidence_value,
            hit_rate,
            sample_size,
            estimated_edge_cents,
            estimated_slippage_cents,
            can_execute: self.scanner.can_execute_100(subject),
            recommended_size: 0,
            timestamp: chrono::Utc::now(),
        }
    }

    fn fire(&self, alert: Alert) {
        let _ = self.out.try_send(alert);
    }

    /// Folds the outcome of any pending alert whose post-alert window has
    /// fully elapsed back into its (type, market) hit-rate stats.
    fn settle_pending(&self) {
        let now = chrono::Utc::now();
        let ready: Vec<PendingOutcome> = {
            let mut pending = self.pending.write();
            let (ready, rest): (Vec<_>, Vec<_>) = pending
                .drain(..)
                .partition(|p| (now - p.fired_at).num_seconds() >= POST_ALERT_WINDOW_SECS);
            *pending = rest;
            ready
        };

        for outcome in ready {
            let Some(book) = self.state.get_order_book(&outcome.ticker) else { continue };
            let mid_now = match (book.best_yes_bid(), book.best_yes_ask()) {
                (Some(b), Some(a)) => (b + a) as f64 / 2.0,
                _ => continue,
            };
            let move_cents = mid_now - outcome.mid_at_fire;
            let was_hit = match outcome.alert_type {
                AlertType::ImbalancePressure => match outcome.suggested_action {
                    SuggestedAction::Buy => move_cents >= 0.5,
                    SuggestedAction::Sell => move_cents <= -0.5,
                    _ => move_cents.abs() > 0.5,
                },
                AlertType::SpreadTightened | AlertType::DepthIncreased | AlertType::ExecutionReady => {
                    move_cents.abs() > 0.1
                }
                AlertType::NoArbViolation => outcome.estimated_edge_cents > outcome.estimated_slippage_cents,
                AlertType::PriceDrift => move_cents.abs() > 0.5,
            };
            let key = (outcome.alert_type, outcome.ticker.clone());
            self.hit_rates.write().entry(key).or_default().record(was_hit, move_cents);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Market;

    fn engine_with_market() -> (Arc<StateEngine>, AlertEngine) {
        let state = StateEngine::new(100, 100);
        let mut m = Market::new("TICK-1", "t", "EVT-1");
        m.status = crate::models::MarketStatus::Active;
        state.register_market(m);
        let (tx, _rx) = tokio::sync::mpsc::channel(100);
        let alert_engine = AlertEngine::new(state.clone(), tx);
        (state, alert_engine)
    }

    #[test]
    fn no_history_yields_low_confidence_tuple() {
        let (_state, engine) = engine_with_market();
        let alert = engine.build_alert(AlertType::SpreadTightened, "TICK-1", "r", SuggestedAction::Watch, vec![], 0.0, 0.0);
        assert_eq!(alert.hit_rate, 0.0);
        assert_eq!(alert.sample_size, 0);
    }

    #[test]
    fn imbalance_pressure_fires_when_both_conditions_hold() {
        let (state, engine) = engine_with_market();
        state.update_from_upstream("TICK-1", vec![(80, 900)], vec![(19, 10)], 1).unwrap();
        let opp = engine.scanner.derive_opportunity("TICK-1").unwrap();
        let alerts = engine.alerts_for_opportunity(&opp);
        assert!(alerts.iter().any(|a| matches!(a.alert_type, AlertType::ImbalancePressure)));
    }
}
