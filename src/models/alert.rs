use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    SpreadTightened,
    DepthIncreased,
    ImbalancePressure,
    NoArbViolation,
    ExecutionReady,
    PriceDrift,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuggestedAction {
    Buy,
    Sell,
    Watch,
    Skip,
}

/// An actionable alert fusing scanner/no-arb output with the hit-rate estimator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub alert_type: AlertType,
    /// Market ticker, or the event ticker when `alert_type` is `NoArbViolation`.
    pub subject: String,
    pub reason: String,
    pub suggested_action: SuggestedAction,
    /// Threshold name -> (configured threshold, observed value).
    pub thresholds_consulted: Vec<(String, f64, f64)>,
    /// hit_rate · tier_multiplier(sample_size), or 0.3 when no history exists yet.
    pub confidence: f64,
    pub hit_rate: f64,
    pub sample_size: u64,
    pub estimated_edge_cents: f64,
    pub estimated_slippage_cents: f64,
    pub can_execute: bool,
    pub recommended_size: u64,
    pub timestamp: DateTime<Utc>,
}

/// Rolling outcome statistics for one (alert type, market) key, maintained by
/// the historical hit-rate estimator.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitRateStats {
    pub sample_count: u64,
    pub hit_count: u64,
    pub running_mean_move_cents: f64,
}

impl HitRateStats {
    pub fn hit_rate(&self) -> f64 {
        if self.sample_count == 0 {
            return 0.0;
        }
        self.hit_count as f64 / self.sample_count as f64
    }

    /// `hit_rate * tier_multiplier(sample_count)`: 0.5 below 10 samples, 0.75
    /// below 50, 1.0 otherwise. `0.0` with no history, same as [`Self::hit_rate`].
    pub fn confidence(&self) -> f64 {
        let tier_multiplier = if self.sample_count < 10 {
            0.5
        } else if self.sample_count < 50 {
            0.75
        } else {
            1.0
        };
        self.hit_rate() * tier_multiplier
    }

    /// Folds in one post-alert outcome observation (Welford-style running mean).
    pub fn record(&mut self, was_hit: bool, move_cents: f64) {
        self.sample_count += 1;
        if was_hit {
            self.hit_count += 1;
        }
        let delta = move_cents - self.running_mean_move_cents;
        self.running_mean_move_cents += delta / self.sample_count as f64;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confidence_tiers_follow_sample_size() {
        let mut stats = HitRateStats::default();
        for _ in 0..9 {
            stats.record(true, 1.0);
        }
        assert!((stats.confidence() - 0.5).abs() < 1e-9);
        for _ in 0..41 {
            stats.record(true, 1.0);
        }
        assert!((stats.confidence() - 0.75).abs() < 1e-9);
        for _ in 0..50 {
            stats.record(true, 1.0);
        }
        assert!((stats.confidence() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn hit_rate_stats_accumulate() {
        let mut stats = HitRateStats::default();
        stats.record(true, 10.0);
        stats.record(false, -2.0);
        assert_eq!(stats.sample_count, 2);
        assert_eq!(stats.hit_rate(), 0.5);
        assert!((stats.running_mean_move_cents - 4.0).abs() < 1e-9);
    }
}
