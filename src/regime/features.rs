// =============================================================================
// Regime Features — windowed statistics over the price/volume history
// =============================================================================
//
//   volatility      population std of the simple returns of the last 20 prices
//   trend strength  |OLS slope| over the last 50 prices / their mean
//   momentum        (mean(last 5) - mean(first 5)) / mean(first 5), 10-window
//   volume profile  mean(last 5 volumes) / mean(prior 15 volumes)
//
// Each feature has its own minimum window; below it the feature reports its
// neutral value (0.0, or 1.0 for the volume profile).
// =============================================================================

use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::stats::{linear_slope, mean, std_dev};

pub const VOLATILITY_WINDOW: usize = 20;
pub const TREND_WINDOW: usize = 50;
pub const MOMENTUM_WINDOW: usize = 10;
pub const VOLUME_WINDOW: usize = 20;

const MOMENTUM_HALF: usize = 5;
const VOLUME_RECENT: usize = 5;

/// The four scalar inputs of the regime scoring functions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeFeatures {
    pub volatility: f64,
    pub trend_strength: f64,
    pub momentum: f64,
    pub volume_profile: f64,
}

impl RegimeFeatures {
    pub fn compute(prices: &[f64], volumes: &[f64]) -> Self {
        let features = Self {
            volatility: volatility(prices),
            trend_strength: trend_strength(prices),
            momentum: momentum(prices),
            volume_profile: volume_profile(volumes),
        };
        trace!(
            volatility = format!("{:.5}", features.volatility),
            trend = format!("{:.5}", features.trend_strength),
            momentum = format!("{:.5}", features.momentum),
            volume_profile = format!("{:.3}", features.volume_profile),
            "regime features computed"
        );
        features
    }
}

fn tail(values: &[f64], n: usize) -> &[f64] {
    &values[values.len().saturating_sub(n)..]
}

pub fn volatility(prices: &[f64]) -> f64 {
    if prices.len() < VOLATILITY_WINDOW {
        return 0.0;
    }
    let window = tail(prices, VOLATILITY_WINDOW);
    let returns: Vec<f64> = window
        .windows(2)
        .filter(|w| w[0] > 0.0)
        .map(|w| (w[1] - w[0]) / w[0])
        .collect();
    std_dev(&returns)
}

pub fn trend_strength(prices: &[f64]) -> f64 {
    if prices.len() < TREND_WINDOW {
        return 0.0;
    }
    let window = tail(prices, TREND_WINDOW);
    let avg = mean(window);
    if avg <= 0.0 {
        return 0.0;
    }
    linear_slope(window).abs() / avg
}

pub fn momentum(prices: &[f64]) -> f64 {
    if prices.len() < MOMENTUM_WINDOW {
        return 0.0;
    }
    let window = tail(prices, MOMENTUM_WINDOW);
    let early = mean(&window[..MOMENTUM_HALF]);
    let recent = mean(&window[MOMENTUM_WINDOW - MOMENTUM_HALF..]);
    if early <= 0.0 {
        return 0.0;
    }
    (recent - early) / early
}

pub fn volume_profile(volumes: &[f64]) -> f64 {
    if volumes.len() < VOLUME_WINDOW {
        return 1.0;
    }
    let window = tail(volumes, VOLUME_WINDOW);
    let prior = mean(&window[..VOLUME_WINDOW - VOLUME_RECENT]);
    let recent = mean(&window[VOLUME_WINDOW - VOLUME_RECENT..]);
    if prior > 0.0 {
        recent / prior
    } else {
        1.0
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn geometric(n: usize, step: f64) -> Vec<f64> {
        (0..n).map(|i| 100.0 * (1.0 + step).powi(i as i32)).collect()
    }

    #[test]
    fn short_history_reports_neutral_values() {
        let prices = geometric(5, 0.01);
        assert_eq!(volatility(&prices), 0.0);
        assert_eq!(trend_strength(&prices), 0.0);
        assert_eq!(momentum(&prices), 0.0);
        assert_eq!(volume_profile(&[1.0; 5]), 1.0);
    }

    #[test]
    fn constant_growth_has_zero_volatility() {
        let prices = geometric(30, 0.005);
        assert!(volatility(&prices) < 1e-12);
    }

    #[test]
    fn rising_series_has_positive_trend_and_momentum() {
        let prices = geometric(60, 0.005);
        let trend = trend_strength(&prices);
        assert!(trend > 0.004 && trend < 0.006, "trend = {trend}");
        let mom = momentum(&prices);
        assert!((mom - (1.005f64.powi(5) - 1.0)).abs() < 1e-9);
    }

    #[test]
    fn volume_spike_raises_profile() {
        let mut volumes = vec![10.0; 15];
        volumes.extend([30.0; 5]);
        assert!((volume_profile(&volumes) - 3.0).abs() < 1e-12);
    }
}
