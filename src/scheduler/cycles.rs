// =============================================================================
// Cycle Adjustments — how each cadence moves the shared ParameterSet
// =============================================================================
//
// Pure functions over a `&mut ParameterSet`.  They are always applied through
// `SharedParameters::apply`, which clamps the result and reverts position
// increases while the risk gate forbids them, so nothing here needs to clamp
// except where a rule caps a value tighter than its band.
// =============================================================================

use crate::analysis::{BatchSummary, DeepAnalysis, TrendDirection};
use crate::parameters::{ParameterSet, MAX_CONCURRENT_TRADES_MAX};
use crate::regime::MarketRegime;

/// Small nudge from one continuous batch.
pub fn continuous_nudge(p: &mut ParameterSet, summary: &BatchSummary) {
    if summary.total_trades == 0 {
        return;
    }
    let success = summary.success_rate;
    let profit = summary.avg_profit;

    if success < 0.7 {
        p.confidence_threshold *= 1.05;
        p.min_profit_threshold *= 1.1;
    } else if success > 0.95 && profit > 0.0 {
        p.confidence_threshold *= 0.95;
        p.max_concurrent_trades = (p.max_concurrent_trades + 1).min(MAX_CONCURRENT_TRADES_MAX);
    }

    if profit < 0.0 {
        p.risk_multiplier *= 0.95;
    } else if profit > 5.0 {
        p.risk_multiplier = (p.risk_multiplier * 1.05).min(2.0);
    }
}

/// Canned parameter profile of a regime.  Regimes without a profile leave the
/// set untouched.
pub fn regime_preset(p: &mut ParameterSet, regime: MarketRegime) {
    match regime {
        MarketRegime::HighVolatility => {
            p.slippage_tolerance = 0.002;
            p.gas_multiplier = 1.3;
            p.confidence_threshold = 0.85;
            p.risk_multiplier = 0.8;
        }
        MarketRegime::TrendingUp => {
            p.slippage_tolerance = 0.0008;
            p.gas_multiplier = 1.1;
            p.max_position_size = 1_200.0;
            p.risk_multiplier = 1.2;
        }
        MarketRegime::Ranging => {
            p.slippage_tolerance = 0.0005;
            p.gas_multiplier = 0.95;
            p.min_profit_threshold = 0.3;
            p.risk_multiplier = 1.0;
        }
        MarketRegime::Volatile => {
            p.slippage_tolerance = 0.0015;
            p.gas_multiplier = 1.25;
            p.confidence_threshold = 0.8;
            p.max_concurrent_trades = 3;
        }
        MarketRegime::TrendingDown
        | MarketRegime::Neutral
        | MarketRegime::Breakout
        | MarketRegime::Collapse => {}
    }
}

/// Medium cycle: preset for the live regime, then scale up when that regime
/// is also the batch's best performer.
pub fn medium_adjustment(p: &mut ParameterSet, regime: MarketRegime, summary: &BatchSummary) {
    regime_preset(p, regime);
    if !summary.regime_performance.is_empty() && summary.best_regime == regime {
        p.max_position_size *= 1.1;
    }
}

/// Slow cycle: long-horizon drift from the deep analysis.
pub fn long_horizon_drift(p: &mut ParameterSet, deep: &DeepAnalysis) {
    let summary = &deep.comprehensive.summary;
    if summary.total_trades > 0 {
        if summary.success_rate > 0.9 {
            p.confidence_threshold = (p.confidence_threshold * 0.95).max(0.6);
        } else if summary.success_rate < 0.7 {
            p.confidence_threshold = (p.confidence_threshold * 1.05).min(0.9);
        }
    }

    match deep.quarter_trend.as_ref().map(|q| q.direction) {
        Some(TrendDirection::Improving) => {
            p.max_position_size *= 1.05;
            p.max_concurrent_trades = (p.max_concurrent_trades + 1).min(MAX_CONCURRENT_TRADES_MAX);
        }
        Some(TrendDirection::Declining) => {
            p.max_position_size *= 0.95;
            p.confidence_threshold *= 1.05;
        }
        _ => {}
    }

    if deep.comprehensive.risk.is_some_and(|r| r.max_drawdown > 0.15) {
        p.risk_multiplier *= 0.9;
        p.max_position_size *= 0.9;
    }
}

/// Next exploration rate from the optimization potential, bounded by
/// `[min, max]`.
pub fn next_exploration_rate(current: f64, potential: f64, min: f64, max: f64) -> f64 {
    if potential > 0.7 {
        (current * 1.1).min(max)
    } else if potential < 0.3 {
        (current * 0.9).max(min)
    } else {
        current
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::{deep, summarize};
    use crate::types::{ExecutionResult, MarketConditions};
    use chrono::{Duration, TimeZone, Utc};

    fn batch(profits: &[f64], regime: MarketRegime) -> Vec<ExecutionResult> {
        let base = Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap();
        profits
            .iter()
            .enumerate()
            .map(|(i, p)| ExecutionResult {
                strategy_id: "flash_loan_arbitrage".into(),
                timestamp: base + Duration::minutes(i as i64),
                profit: *p,
                success: *p > 0.0,
                execution_time_us: 800.0,
                slippage: 0.001,
                gas_used: 150_000,
                market_regime: regime,
                market_conditions: MarketConditions::default(),
            })
            .collect()
    }

    #[test]
    fn low_success_tightens_thresholds() {
        let mut p = ParameterSet::default();
        continuous_nudge(&mut p, &summarize(&batch(&[1.0, -1.0, -1.0], MarketRegime::Neutral)));
        assert!((p.confidence_threshold - 0.7875).abs() < 1e-12);
        assert!((p.min_profit_threshold - 0.55).abs() < 1e-12);
        assert!((p.risk_multiplier - 0.95).abs() < 1e-12);
    }

    #[test]
    fn strong_batch_loosens_and_adds_concurrency() {
        let mut p = ParameterSet::default();
        continuous_nudge(&mut p, &summarize(&batch(&[6.0; 10], MarketRegime::Neutral)));
        assert!((p.confidence_threshold - 0.7125).abs() < 1e-12);
        assert_eq!(p.max_concurrent_trades, 6);
        assert!((p.risk_multiplier - 1.05).abs() < 1e-12);
    }

    #[test]
    fn empty_batch_is_a_no_op() {
        let mut p = ParameterSet::default();
        continuous_nudge(&mut p, &summarize(&[]));
        assert_eq!(p, ParameterSet::default());
    }

    #[test]
    fn presets_per_regime() {
        let mut p = ParameterSet::default();
        regime_preset(&mut p, MarketRegime::HighVolatility);
        assert_eq!(p.slippage_tolerance, 0.002);
        assert_eq!(p.gas_multiplier, 1.3);
        assert_eq!(p.confidence_threshold, 0.85);
        assert_eq!(p.risk_multiplier, 0.8);

        let mut p = ParameterSet::default();
        regime_preset(&mut p, MarketRegime::Volatile);
        assert_eq!(p.max_concurrent_trades, 3);

        let mut p = ParameterSet::default();
        regime_preset(&mut p, MarketRegime::Collapse);
        assert_eq!(p, ParameterSet::default());
    }

    #[test]
    fn medium_scales_position_when_live_regime_leads() {
        let results = batch(&[2.0, 3.0], MarketRegime::TrendingUp);
        let mut p = ParameterSet::default();
        medium_adjustment(&mut p, MarketRegime::TrendingUp, &summarize(&results));
        assert!((p.max_position_size - 1_320.0).abs() < 1e-9);

        let mut p = ParameterSet::default();
        medium_adjustment(&mut p, MarketRegime::Ranging, &summarize(&results));
        assert_eq!(p.max_position_size, 1_000.0);
        assert_eq!(p.min_profit_threshold, 0.3);
    }

    #[test]
    fn declining_history_scales_down() {
        let profits: Vec<f64> = (0..40).map(|i| 5.0 - i as f64 * 0.1).collect();
        let d = deep(&batch(&profits, MarketRegime::Ranging));
        let mut p = ParameterSet::default();
        long_horizon_drift(&mut p, &d);
        // success > 0.9 first lowers confidence, the declining trend raises it
        assert!((p.confidence_threshold - 0.75 * 0.95 * 1.05).abs() < 1e-12);
        assert!((p.max_position_size - 950.0).abs() < 1e-9);
    }

    #[test]
    fn exploration_rate_moves_within_bounds() {
        assert!((next_exploration_rate(0.1, 0.8, 0.05, 0.2) - 0.11).abs() < 1e-12);
        assert_eq!(next_exploration_rate(0.19, 0.9, 0.05, 0.2), 0.2);
        assert!((next_exploration_rate(0.1, 0.1, 0.05, 0.2) - 0.09).abs() < 1e-12);
        assert_eq!(next_exploration_rate(0.052, 0.1, 0.05, 0.2), 0.05);
        assert_eq!(next_exploration_rate(0.1, 0.5, 0.05, 0.2), 0.1);
    }
}
