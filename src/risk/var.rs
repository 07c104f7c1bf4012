// =============================================================================
// Value-at-Risk — historical / parametric VaR, CVaR and Kupiec backtest
// =============================================================================
//
// Returns are simple percentage returns of consecutive portfolio values.
//
//   historical VaR   -percentile(returns, (1 - c) * 100), linear interpolation
//   parametric VaR   -(mean + z * std), z = Phi^-1(1 - c) under Normal(mean, std)
//   CVaR             |mean of returns <= -VaR|  (VaR itself when the tail is empty)
//   Kupiec POF       exceedances = #(return < -VaR); PASS when
//                    |exceedances / n - (1 - c)| < 0.05
//
// VaR is reported as a loss magnitude: a tail quantile that is still a gain
// is a zero loss.  Every published figure must pass `validate`; out-of-range
// values are errors, never clamped.
// =============================================================================

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

use crate::error::{EngineError, EngineResult};
use crate::stats::{mean, percentile, std_dev};

pub const MIN_CONFIDENCE: f64 = 0.8;
pub const MAX_CONFIDENCE: f64 = 0.999;

/// Half-width of the Kupiec acceptance band around the expected failure rate.
const KUPIEC_TOLERANCE: f64 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VarMethod {
    Historical,
    Parametric,
}

impl std::fmt::Display for VarMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Historical => write!(f, "HISTORICAL"),
            Self::Parametric => write!(f, "PARAMETRIC"),
        }
    }
}

/// Outcome of a Kupiec proportion-of-failures backtest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VarBacktest {
    pub confidence: f64,
    pub var: f64,
    pub observations: usize,
    pub exceedances: usize,
    pub failure_rate: f64,
    pub expected_rate: f64,
    pub passed: bool,
    /// Set when too few observations were available to run the test.
    #[serde(default)]
    pub insufficient_data: bool,
}

impl VarBacktest {
    pub fn insufficient(confidence: f64, observations: usize) -> Self {
        Self {
            confidence,
            var: 0.0,
            observations,
            exceedances: 0,
            failure_rate: 0.0,
            expected_rate: 1.0 - confidence,
            passed: false,
            insufficient_data: true,
        }
    }
}

/// Moments of the return series.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct ReturnStats {
    pub expected_return: f64,
    pub volatility: f64,
    pub skewness: f64,
    pub excess_kurtosis: f64,
}

pub fn validate_confidence(confidence: f64) -> EngineResult<()> {
    if confidence.is_finite() && (MIN_CONFIDENCE..=MAX_CONFIDENCE).contains(&confidence) {
        Ok(())
    } else {
        Err(EngineError::InvalidConfidence(confidence))
    }
}

/// Simple returns in percent between consecutive values.
pub fn percent_returns(values: &[f64]) -> Vec<f64> {
    values
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0] * 100.0)
        .collect()
}

pub fn historical_var(returns: &[f64], confidence: f64) -> EngineResult<f64> {
    validate_confidence(confidence)?;
    let quantile = percentile(returns, (1.0 - confidence) * 100.0);
    Ok((-quantile).max(0.0))
}

pub fn parametric_var(returns: &[f64], confidence: f64) -> EngineResult<f64> {
    validate_confidence(confidence)?;
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| EngineError::Computation(format!("standard normal: {e}")))?;
    let z = normal.inverse_cdf(1.0 - confidence);
    Ok((-(mean(returns) + z * std_dev(returns))).max(0.0))
}

pub fn var(returns: &[f64], confidence: f64, method: VarMethod) -> EngineResult<f64> {
    match method {
        VarMethod::Historical => historical_var(returns, confidence),
        VarMethod::Parametric => parametric_var(returns, confidence),
    }
}

/// Expected shortfall beyond the historical VaR.
pub fn cvar(returns: &[f64], confidence: f64) -> EngineResult<f64> {
    let var = historical_var(returns, confidence)?;
    let tail: Vec<f64> = returns.iter().copied().filter(|r| *r <= -var).collect();
    if tail.is_empty() {
        Ok(var)
    } else {
        Ok(mean(&tail).abs())
    }
}

/// Kupiec POF test of the historical VaR against the same return series.
pub fn backtest_var_on_returns(returns: &[f64], confidence: f64) -> EngineResult<VarBacktest> {
    let var = historical_var(returns, confidence)?;
    let observations = returns.len();
    let exceedances = returns.iter().filter(|r| **r < -var).count();
    let failure_rate = if observations > 0 {
        exceedances as f64 / observations as f64
    } else {
        0.0
    };
    let expected_rate = 1.0 - confidence;

    Ok(VarBacktest {
        confidence,
        var,
        observations,
        exceedances,
        failure_rate,
        expected_rate,
        passed: (failure_rate - expected_rate).abs() < KUPIEC_TOLERANCE,
        insufficient_data: false,
    })
}

pub fn return_stats(returns: &[f64]) -> ReturnStats {
    let n = returns.len();
    let m = mean(returns);
    let sd = std_dev(returns);

    let standardised_moment = |power: i32| -> f64 {
        returns.iter().map(|r| ((r - m) / sd).powi(power)).sum::<f64>() / n as f64
    };

    ReturnStats {
        expected_return: m,
        volatility: sd,
        skewness: if n >= 3 && sd > 0.0 { standardised_moment(3) } else { 0.0 },
        excess_kurtosis: if n >= 4 && sd > 0.0 { standardised_moment(4) - 3.0 } else { 0.0 },
    }
}

/// Bounds check applied to every figure before it is published.
pub fn validate_metric(metric: &'static str, value: f64, max: Option<f64>) -> EngineResult<()> {
    let in_range = value.is_finite() && value >= 0.0 && max.map_or(true, |m| value <= m);
    if in_range {
        Ok(())
    } else {
        Err(EngineError::InvalidRiskMetric { metric, value })
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, StandardNormal};

    fn normal_returns(n: usize, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..n).map(|_| StandardNormal.sample(&mut rng)).collect()
    }

    #[test]
    fn confidence_range_is_enforced() {
        assert!(validate_confidence(0.95).is_ok());
        assert!(validate_confidence(0.8).is_ok());
        assert!(validate_confidence(0.999).is_ok());
        assert_eq!(validate_confidence(0.5), Err(EngineError::InvalidConfidence(0.5)));
        assert!(validate_confidence(1.0).is_err());
        assert!(historical_var(&[1.0, -1.0], 0.7).is_err());
    }

    #[test]
    fn percent_returns_from_values() {
        let r = percent_returns(&[100.0, 110.0, 99.0]);
        assert!((r[0] - 10.0).abs() < 1e-12);
        assert!((r[1] + 10.0).abs() < 1e-12);
    }

    #[test]
    fn kupiec_passes_on_standard_normal() {
        let returns = normal_returns(10_000, 2024);
        let bt = backtest_var_on_returns(&returns, 0.95).unwrap();
        assert_eq!(bt.observations, 10_000);
        assert!(bt.failure_rate >= 0.04 && bt.failure_rate <= 0.06, "pof = {}", bt.failure_rate);
        assert!(bt.passed);
        assert!((bt.var - 1.645).abs() < 0.1, "var = {}", bt.var);
    }

    #[test]
    fn parametric_matches_normal_quantile() {
        let returns = normal_returns(10_000, 7);
        let v = parametric_var(&returns, 0.99).unwrap();
        assert!((v - 2.326).abs() < 0.1, "var = {v}");
    }

    #[test]
    fn cvar_is_at_least_var() {
        let returns = normal_returns(5_000, 99);
        let v = historical_var(&returns, 0.95).unwrap();
        let es = cvar(&returns, 0.95).unwrap();
        assert!(es >= v);
    }

    #[test]
    fn gains_only_series_has_zero_var() {
        let returns = vec![0.5; 40];
        assert_eq!(historical_var(&returns, 0.95).unwrap(), 0.0);
        assert_eq!(parametric_var(&returns, 0.95).unwrap(), 0.0);
    }

    #[test]
    fn moments_of_symmetric_series() {
        let stats = return_stats(&[-2.0, -1.0, 0.0, 1.0, 2.0]);
        assert!(stats.expected_return.abs() < 1e-12);
        assert!((stats.volatility - 2.0f64.sqrt()).abs() < 1e-12);
        assert!(stats.skewness.abs() < 1e-12);
    }

    #[test]
    fn metric_validation_rejects_out_of_range() {
        assert!(validate_metric("var_95", 3.0, Some(100.0)).is_ok());
        assert!(validate_metric("var_95", 120.0, Some(100.0)).is_err());
        assert!(validate_metric("volatility", -0.1, None).is_err());
        assert_eq!(
            validate_metric("cvar_95", f64::NAN, None).unwrap_err().to_string(),
            "risk metric cvar_95 out of bounds: NaN"
        );
    }
}
