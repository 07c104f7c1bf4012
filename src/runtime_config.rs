// =============================================================================
// Runtime Configuration — Engine settings with atomic save
// =============================================================================
//
// Central configuration hub for the Aurora tuner.  Every tunable constant of
// the decision engine lives here: strategy set, cadence intervals and batch
// caps, regime thresholds, bandit blend weights and risk limits.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// The executor-facing ParameterSet bands are deliberately NOT here: they are
// hard limits and live in `parameters.rs`.
//
// =============================================================================

use std::path::Path;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::validate_strategy_id;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_strategies() -> Vec<String> {
    vec![
        "triangular_arbitrage".to_string(),
        "cross_dex_arbitrage".to_string(),
        "flash_loan_arbitrage".to_string(),
        "statistical_arbitrage".to_string(),
        "liquidity_sniping".to_string(),
        "latency_arbitrage".to_string(),
    ]
}

fn default_rng_seed() -> u64 {
    42
}

fn default_continuous_ms() -> u64 {
    30_000
}

fn default_fast_ms() -> u64 {
    120_000
}

fn default_medium_ms() -> u64 {
    600_000
}

fn default_slow_ms() -> u64 {
    1_800_000
}

fn default_health_ms() -> u64 {
    300_000
}

fn default_continuous_batch() -> usize {
    10
}

fn default_fast_batch() -> usize {
    50
}

fn default_medium_batch() -> usize {
    200
}

fn default_slow_batch() -> usize {
    1_000
}

fn default_queue_capacity() -> usize {
    10_000
}

fn default_result_history() -> usize {
    5_000
}

fn default_optimization_history() -> usize {
    1_000
}

fn default_alert_history() -> usize {
    500
}

fn default_confidence_floor() -> f64 {
    0.75
}

fn default_min_samples() -> usize {
    50
}

fn default_retention_hours() -> i64 {
    24
}

fn default_max_price_history() -> usize {
    10_000
}

fn default_regime_history() -> usize {
    1_000
}

fn default_global_blend() -> f64 {
    0.7
}

fn default_regime_weight_blend() -> f64 {
    0.7
}

fn default_warmup_trials() -> u64 {
    3
}

fn default_exploration_rate() -> f64 {
    0.1
}

fn default_min_exploration() -> f64 {
    0.05
}

fn default_max_exploration() -> f64 {
    0.2
}

fn default_confidence_trials() -> f64 {
    10.0
}

fn default_max_drawdown_pct() -> f64 {
    1.5
}

fn default_recovery_target_days() -> i64 {
    30
}

fn default_slow_recovery_days() -> i64 {
    7
}

fn default_absolute_loss_limit() -> f64 {
    100_000.0
}

fn default_portfolio_history() -> usize {
    1_000
}

fn default_var_levels() -> Vec<f64> {
    vec![0.95, 0.99]
}

fn default_min_var_observations() -> usize {
    30
}

fn default_severity_bands() -> [f64; 4] {
    [5.0, 10.0, 20.0, 50.0]
}

// =============================================================================
// SchedulerConfig
// =============================================================================

/// Cadence intervals (milliseconds), batch caps and in-memory history sizes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_continuous_ms")]
    pub continuous_interval_ms: u64,
    #[serde(default = "default_fast_ms")]
    pub fast_interval_ms: u64,
    #[serde(default = "default_medium_ms")]
    pub medium_interval_ms: u64,
    #[serde(default = "default_slow_ms")]
    pub slow_interval_ms: u64,
    /// Interval of the health/alert task.
    #[serde(default = "default_health_ms")]
    pub health_interval_ms: u64,

    #[serde(default = "default_continuous_batch")]
    pub continuous_batch: usize,
    #[serde(default = "default_fast_batch")]
    pub fast_batch: usize,
    #[serde(default = "default_medium_batch")]
    pub medium_batch: usize,
    #[serde(default = "default_slow_batch")]
    pub slow_batch: usize,

    /// Capacity of the execution-result queue.  Submissions beyond this are
    /// dropped and counted.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Rolling history of drained results used by the slow cycle.
    #[serde(default = "default_result_history")]
    pub result_history: usize,
    #[serde(default = "default_optimization_history")]
    pub optimization_history: usize,
    #[serde(default = "default_alert_history")]
    pub alert_history: usize,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            continuous_interval_ms: default_continuous_ms(),
            fast_interval_ms: default_fast_ms(),
            medium_interval_ms: default_medium_ms(),
            slow_interval_ms: default_slow_ms(),
            health_interval_ms: default_health_ms(),
            continuous_batch: default_continuous_batch(),
            fast_batch: default_fast_batch(),
            medium_batch: default_medium_batch(),
            slow_batch: default_slow_batch(),
            queue_capacity: default_queue_capacity(),
            result_history: default_result_history(),
            optimization_history: default_optimization_history(),
            alert_history: default_alert_history(),
        }
    }
}

impl SchedulerConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }
}

// =============================================================================
// RegimeConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegimeConfig {
    /// Winning scores below this floor fall back to Neutral.
    #[serde(default = "default_confidence_floor")]
    pub confidence_floor: f64,
    /// Price samples required before a non-neutral regime is reported.
    #[serde(default = "default_min_samples")]
    pub min_samples: usize,
    #[serde(default = "default_retention_hours")]
    pub retention_hours: i64,
    #[serde(default = "default_max_price_history")]
    pub max_price_history: usize,
    #[serde(default = "default_regime_history")]
    pub regime_history: usize,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self {
            confidence_floor: default_confidence_floor(),
            min_samples: default_min_samples(),
            retention_hours: default_retention_hours(),
            max_price_history: default_max_price_history(),
            regime_history: default_regime_history(),
        }
    }
}

// =============================================================================
// BanditConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BanditConfig {
    /// Share of the global posterior when sampling; the regime posterior gets
    /// the remainder.
    #[serde(default = "default_global_blend")]
    pub sampling_global_weight: f64,
    /// Share of the regime success rate when computing weights; the global
    /// rate gets the remainder.
    #[serde(default = "default_regime_weight_blend")]
    pub weight_regime_share: f64,
    /// Regime trials below which exploration noise is injected.
    #[serde(default = "default_warmup_trials")]
    pub warmup_trials: u64,
    #[serde(default = "default_exploration_rate")]
    pub exploration_rate: f64,
    #[serde(default = "default_min_exploration")]
    pub min_exploration_rate: f64,
    #[serde(default = "default_max_exploration")]
    pub max_exploration_rate: f64,
    /// Regime trials at which a weight reaches full confidence.
    #[serde(default = "default_confidence_trials")]
    pub confidence_trials: f64,
}

impl Default for BanditConfig {
    fn default() -> Self {
        Self {
            sampling_global_weight: default_global_blend(),
            weight_regime_share: default_regime_weight_blend(),
            warmup_trials: default_warmup_trials(),
            exploration_rate: default_exploration_rate(),
            min_exploration_rate: default_min_exploration(),
            max_exploration_rate: default_max_exploration(),
            confidence_trials: default_confidence_trials(),
        }
    }
}

// =============================================================================
// RiskConfig
// =============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Drawdown percentage above which the circuit breaker trips.
    #[serde(default = "default_max_drawdown_pct")]
    pub max_drawdown_pct: f64,
    /// Drawdowns lasting longer than this trip the breaker as well.
    #[serde(default = "default_recovery_target_days")]
    pub recovery_target_days: i64,
    #[serde(default = "default_slow_recovery_days")]
    pub slow_recovery_alert_days: i64,
    /// Absolute loss from peak that raises a critical alert.
    #[serde(default = "default_absolute_loss_limit")]
    pub absolute_loss_limit: f64,
    #[serde(default = "default_portfolio_history")]
    pub portfolio_history: usize,
    #[serde(default = "default_var_levels")]
    pub var_confidence_levels: Vec<f64>,
    /// Fewer return observations than this yield a zero VaR with a sample
    /// count instead of an estimate.
    #[serde(default = "default_min_var_observations")]
    pub min_var_observations: usize,
    /// Upper bounds (inclusive) of the normal/moderate/severe/critical bands.
    #[serde(default = "default_severity_bands")]
    pub severity_bands: [f64; 4],
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_drawdown_pct: default_max_drawdown_pct(),
            recovery_target_days: default_recovery_target_days(),
            slow_recovery_alert_days: default_slow_recovery_days(),
            absolute_loss_limit: default_absolute_loss_limit(),
            portfolio_history: default_portfolio_history(),
            var_confidence_levels: default_var_levels(),
            min_var_observations: default_min_var_observations(),
            severity_bands: default_severity_bands(),
        }
    }
}

// =============================================================================
// EngineConfig
// =============================================================================

/// Top-level configuration for the Aurora tuner.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fixed strategy set.  Arms are created once, in this order, and the
    /// order is the bandit's tie-break order.
    #[serde(default = "default_strategies")]
    pub strategies: Vec<String>,

    /// Seed of the Thompson sampler.
    #[serde(default = "default_rng_seed")]
    pub rng_seed: u64,

    #[serde(default)]
    pub scheduler: SchedulerConfig,

    #[serde(default)]
    pub regime: RegimeConfig,

    #[serde(default)]
    pub bandit: BanditConfig,

    #[serde(default)]
    pub risk: RiskConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strategies: default_strategies(),
            rng_seed: default_rng_seed(),
            scheduler: SchedulerConfig::default(),
            regime: RegimeConfig::default(),
            bandit: BanditConfig::default(),
            risk: RiskConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse engine config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid engine config in {}", path.display()))?;

        info!(
            path = %path.display(),
            strategies = ?config.strategies,
            rng_seed = config.rng_seed,
            "engine config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise engine config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "engine config saved (atomic)");
        Ok(())
    }

    /// Apply `AURORA_STRATEGIES`, `AURORA_RNG_SEED` overrides from the
    /// environment.  Malformed values are ignored with a warning.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(raw) = std::env::var("AURORA_STRATEGIES") {
            let ids: Vec<String> = raw
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if ids.is_empty() {
                warn!("AURORA_STRATEGIES is set but empty, keeping configured strategies");
            } else {
                info!(strategies = ?ids, "strategy set overridden from environment");
                self.strategies = ids;
            }
        }

        if let Ok(raw) = std::env::var("AURORA_RNG_SEED") {
            match raw.trim().parse::<u64>() {
                Ok(seed) => self.rng_seed = seed,
                Err(e) => warn!(value = %raw, error = %e, "ignoring malformed AURORA_RNG_SEED"),
            }
        }
    }

    /// Sanity checks that serde defaults cannot express.
    pub fn validate(&self) -> Result<()> {
        if self.strategies.is_empty() {
            bail!("strategy set must not be empty");
        }
        for id in &self.strategies {
            validate_strategy_id(id)?;
        }

        let s = &self.scheduler;
        let intervals = [
            s.continuous_interval_ms,
            s.fast_interval_ms,
            s.medium_interval_ms,
            s.slow_interval_ms,
            s.health_interval_ms,
        ];
        if intervals.iter().any(|&ms| ms == 0) {
            bail!("cadence intervals must be non-zero");
        }
        if s.queue_capacity == 0 {
            bail!("queue_capacity must be non-zero");
        }

        let b = &self.bandit;
        for (name, share) in [
            ("sampling_global_weight", b.sampling_global_weight),
            ("weight_regime_share", b.weight_regime_share),
        ] {
            if !(0.0..=1.0).contains(&share) {
                bail!("bandit.{name} must lie in [0, 1], got {share}");
            }
        }
        if b.min_exploration_rate > b.max_exploration_rate {
            bail!("bandit exploration bounds are inverted");
        }
        if b.confidence_trials <= 0.0 {
            bail!("bandit.confidence_trials must be positive");
        }

        if !(0.0..=1.0).contains(&self.regime.confidence_floor) {
            bail!("regime.confidence_floor must lie in [0, 1]");
        }

        for level in &self.risk.var_confidence_levels {
            crate::risk::var::validate_confidence(*level)
                .with_context(|| format!("risk.var_confidence_levels contains {level}"))?;
        }

        let bands = self.risk.severity_bands;
        if bands.windows(2).any(|w| w[0] >= w[1]) {
            bail!("risk.severity_bands must be strictly increasing");
        }
        Ok(())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.strategies.len(), 6);
        assert_eq!(cfg.strategies[0], "triangular_arbitrage");
        assert_eq!(cfg.scheduler.continuous_batch, 10);
        assert_eq!(cfg.scheduler.fast_batch, 50);
        assert_eq!(cfg.scheduler.medium_batch, 200);
        assert_eq!(cfg.scheduler.slow_batch, 1_000);
        assert_eq!(cfg.scheduler.queue_capacity, 10_000);
        assert_eq!(cfg.regime.min_samples, 50);
        assert!((cfg.regime.confidence_floor - 0.75).abs() < f64::EPSILON);
        assert!((cfg.bandit.sampling_global_weight - 0.7).abs() < f64::EPSILON);
        assert_eq!(cfg.bandit.warmup_trials, 3);
        assert!((cfg.risk.max_drawdown_pct - 1.5).abs() < f64::EPSILON);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn deserialise_empty_json_uses_defaults() {
        let cfg: EngineConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg.rng_seed, 42);
        assert_eq!(cfg.scheduler.slow_interval_ms, 1_800_000);
        assert_eq!(cfg.risk.var_confidence_levels, vec![0.95, 0.99]);
    }

    #[test]
    fn deserialise_partial_json_fills_defaults() {
        let json = r#"{ "strategies": ["alpha", "beta"], "scheduler": { "fast_batch": 25 } }"#;
        let cfg: EngineConfig = serde_json::from_str(json).unwrap();
        assert_eq!(cfg.strategies, vec!["alpha", "beta"]);
        assert_eq!(cfg.scheduler.fast_batch, 25);
        assert_eq!(cfg.scheduler.medium_batch, 200);
        assert_eq!(cfg.regime.regime_history, 1_000);
    }

    #[test]
    fn roundtrip_through_disk() {
        let dir = std::env::temp_dir().join(format!("aurora-tuner-cfg-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("engine_config.json");

        let mut cfg = EngineConfig::default();
        cfg.rng_seed = 7;
        cfg.save(&path).unwrap();

        let loaded = EngineConfig::load(&path).unwrap();
        assert_eq!(loaded.rng_seed, 7);
        assert_eq!(loaded.strategies, cfg.strategies);
        assert!(!path.with_extension("json.tmp").exists());

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut cfg = EngineConfig::default();
        cfg.strategies.clear();
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.strategies.push("bad id".to_string());
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.scheduler.fast_interval_ms = 0;
        assert!(cfg.validate().is_err());

        let mut cfg = EngineConfig::default();
        cfg.risk.severity_bands = [5.0, 5.0, 20.0, 50.0];
        assert!(cfg.validate().is_err());
    }
}
