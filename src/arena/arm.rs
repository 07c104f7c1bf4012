// =============================================================================
// Strategy Arms — Beta-Bernoulli belief state per strategy
// =============================================================================
//
// One arm per strategy id, created at startup and never destroyed.  Each arm
// keeps a global Beta(alpha, beta) posterior plus an independent posterior
// per market regime.  Both start from the uniform prior Beta(1, 1) and only
// ever grow, so alpha >= 1 and beta >= 1 hold for the whole process lifetime.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::regime::MarketRegime;

/// Beta(alpha, beta) posterior over a strategy's success probability.
///
///   - `alpha` starts at 1 and increments on each success.
///   - `beta` starts at 1 and increments on each failure.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaState {
    pub alpha: f64,
    pub beta: f64,
    pub trials: u64,
    pub successes: u64,
}

impl Default for BetaState {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 1.0,
            trials: 0,
            successes: 0,
        }
    }
}

impl BetaState {
    pub fn record(&mut self, success: bool) {
        if success {
            self.alpha += 1.0;
            self.successes += 1;
        } else {
            self.beta += 1.0;
        }
        self.trials += 1;
    }

    /// Posterior mean of the Beta distribution.
    pub fn posterior_mean(&self) -> f64 {
        self.alpha / (self.alpha + self.beta)
    }

    /// Empirical success rate, 0 before any trial.
    pub fn success_rate(&self) -> f64 {
        self.successes as f64 / self.trials.max(1) as f64
    }
}

/// Belief state of one strategy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategyArm {
    pub strategy_id: String,
    pub global: BetaState,
    /// Per-regime posteriors; a missing entry is the uniform prior.
    pub regimes: BTreeMap<MarketRegime, BetaState>,
    pub cumulative_reward: f64,
    pub total_latency_us: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
}

impl StrategyArm {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            global: BetaState::default(),
            regimes: BTreeMap::new(),
            cumulative_reward: 0.0,
            total_latency_us: 0.0,
            last_updated: None,
        }
    }

    pub fn regime(&self, regime: MarketRegime) -> BetaState {
        self.regimes.get(&regime).copied().unwrap_or_default()
    }

    /// Apply one outcome to the global and regime posteriors together.
    pub fn record(&mut self, regime: MarketRegime, reward: f64, success: bool, latency_us: f64) {
        self.global.record(success);
        self.regimes.entry(regime).or_default().record(success);
        self.cumulative_reward += reward;
        self.total_latency_us += latency_us;
        self.last_updated = Some(Utc::now());
    }

    pub fn average_latency_us(&self) -> f64 {
        if self.global.trials == 0 {
            0.0
        } else {
            self.total_latency_us / self.global.trials as f64
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
