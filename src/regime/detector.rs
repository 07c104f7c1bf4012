// =============================================================================
// Market Regime Detector
// =============================================================================
//
// Classifies the recent price/volume history into one of a fixed set of
// market regimes.  Every candidate regime is scored independently in [0, 1]
// from four features plus auxiliary market indicators; the arg-max wins.
//
// Scoring (each score capped at 1.0):
//
//   HIGH_VOLATILITY  min(vol*10, 1) + gas-volatility and mempool bumps
//   TRENDING_UP      trend > 0.001, momentum > +2%, bullish sentiment/funding
//   TRENDING_DOWN    trend > 0.001, momentum < -2%, bearish sentiment/funding
//   RANGING          low vol, flat trend, vol in the 1-3% band
//   VOLATILE         vol in the 3-8% band, |momentum| > 1%, vol > 5%
//   BREAKOUT         trend > 0.002, volume profile > 1.5
//   COLLAPSE         trend > 0.003, momentum < -5%, extreme fear
//
// Ties go to the regime declared first.  A winner below the confidence floor,
// or fewer than `min_samples` prices, yields NEUTRAL with confidence 0.5.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace};

use crate::error::{EngineError, EngineResult};
use crate::regime::features::RegimeFeatures;
use crate::runtime_config::RegimeConfig;
use crate::types::MarketIndicators;

/// Confidence reported with every Neutral fallback.
pub const NEUTRAL_CONFIDENCE: f64 = 0.5;

// =============================================================================
// Types
// =============================================================================

/// High-level market regime classification.  Declaration order is the
/// tie-break order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum MarketRegime {
    /// Realised volatility far above normal, often with congested chains.
    HighVolatility,
    /// Persistent upward move.
    TrendingUp,
    /// Persistent downward move.
    TrendingDown,
    /// Sideways, mean-reverting price action.
    Ranging,
    /// Wide swings without a clear direction.
    Volatile,
    /// Fallback when no regime is convincing.
    Neutral,
    /// Directional move confirmed by a volume surge.
    Breakout,
    /// Sharp decline with extreme fear.
    Collapse,
}

impl MarketRegime {
    pub const ALL: [MarketRegime; 8] = [
        Self::HighVolatility,
        Self::TrendingUp,
        Self::TrendingDown,
        Self::Ranging,
        Self::Volatile,
        Self::Neutral,
        Self::Breakout,
        Self::Collapse,
    ];

    /// Regimes that carry a scoring function.  Neutral is only ever a
    /// fallback.
    pub const CANDIDATES: [MarketRegime; 7] = [
        Self::HighVolatility,
        Self::TrendingUp,
        Self::TrendingDown,
        Self::Ranging,
        Self::Volatile,
        Self::Breakout,
        Self::Collapse,
    ];

    /// Heuristic score of this regime for the given features, in [0, 1].
    pub fn score(self, f: &RegimeFeatures, ind: &MarketIndicators) -> f64 {
        let raw = match self {
            Self::HighVolatility => score_high_volatility(f, ind),
            Self::TrendingUp => score_trending_up(f, ind),
            Self::TrendingDown => score_trending_down(f, ind),
            Self::Ranging => score_ranging(f),
            Self::Volatile => score_volatile(f),
            Self::Breakout => score_breakout(f),
            Self::Collapse => score_collapse(f, ind),
            Self::Neutral => 0.0,
        };
        raw.min(1.0)
    }
}

impl std::fmt::Display for MarketRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::HighVolatility => write!(f, "HIGH_VOLATILITY"),
            Self::TrendingUp => write!(f, "TRENDING_UP"),
            Self::TrendingDown => write!(f, "TRENDING_DOWN"),
            Self::Ranging => write!(f, "RANGING"),
            Self::Volatile => write!(f, "VOLATILE"),
            Self::Neutral => write!(f, "NEUTRAL"),
            Self::Breakout => write!(f, "BREAKOUT"),
            Self::Collapse => write!(f, "COLLAPSE"),
        }
    }
}

/// Result of one detection pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeReading {
    pub regime: MarketRegime,
    /// Score of the winning regime, or 0.5 for the neutral fallback.
    pub confidence: f64,
    /// Price samples available when the reading was taken.  Lets callers tell
    /// a cold-start Neutral apart from a detected one.
    pub sample_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features: Option<RegimeFeatures>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub scores: BTreeMap<MarketRegime, f64>,
    pub detected_at: DateTime<Utc>,
}

impl RegimeReading {
    fn neutral(sample_count: usize) -> Self {
        Self {
            regime: MarketRegime::Neutral,
            confidence: NEUTRAL_CONFIDENCE,
            sample_count,
            features: None,
            scores: BTreeMap::new(),
            detected_at: Utc::now(),
        }
    }
}

/// One entry of the bounded regime history.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegimeSample {
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    pub confidence: f64,
    pub volatility: f64,
    pub trend_strength: f64,
}

// =============================================================================
// Scoring functions
// =============================================================================

fn score_high_volatility(f: &RegimeFeatures, ind: &MarketIndicators) -> f64 {
    let mut score = (f.volatility * 10.0).min(1.0);
    if ind.gas_price_volatility > 0.5 {
        score += 0.2;
    }
    if ind.mempool_congestion > 0.8 {
        score += 0.3;
    }
    score
}

fn score_trending_up(f: &RegimeFeatures, ind: &MarketIndicators) -> f64 {
    let mut score = 0.0;
    if f.trend_strength > 0.001 {
        score += 0.4;
    }
    if f.momentum > 0.02 {
        score += 0.3;
    }
    if ind.social_sentiment > 0.7 {
        score += 0.2;
    }
    if ind.funding_rate > 0.01 {
        score += 0.1;
    }
    score
}

fn score_trending_down(f: &RegimeFeatures, ind: &MarketIndicators) -> f64 {
    let mut score = 0.0;
    if f.trend_strength > 0.001 {
        score += 0.4;
    }
    if f.momentum < -0.02 {
        score += 0.3;
    }
    if ind.social_sentiment < 0.3 {
        score += 0.2;
    }
    if ind.funding_rate < -0.01 {
        score += 0.1;
    }
    score
}

fn score_ranging(f: &RegimeFeatures) -> f64 {
    let mut score = 0.0;
    if f.volatility < 0.02 {
        score += 0.4;
    }
    if f.trend_strength < 0.0005 {
        score += 0.3;
    }
    if f.volatility > 0.01 && f.volatility < 0.03 {
        score += 0.3;
    }
    score
}

fn score_volatile(f: &RegimeFeatures) -> f64 {
    let mut score = 0.0;
    if f.volatility > 0.03 && f.volatility < 0.08 {
        score += 0.4;
    }
    if f.momentum.abs() > 0.01 {
        score += 0.3;
    }
    if f.volatility > 0.05 {
        score += 0.3;
    }
    score
}

fn score_breakout(f: &RegimeFeatures) -> f64 {
    let mut score = 0.0;
    if f.trend_strength > 0.002 {
        score += 0.4;
    }
    if f.volume_profile > 1.5 {
        score += 0.4;
    }
    if f.trend_strength > 0.001 {
        score += 0.2;
    }
    score
}

fn score_collapse(f: &RegimeFeatures, ind: &MarketIndicators) -> f64 {
    let mut score = 0.0;
    if f.trend_strength > 0.003 {
        score += 0.3;
    }
    if f.momentum < -0.05 {
        score += 0.4;
    }
    if ind.fear_greed_index < 20.0 {
        score += 0.3;
    }
    score
}

/// Arg-max over the candidate scores; the first regime wins ties.
fn classify(
    features: &RegimeFeatures,
    indicators: &MarketIndicators,
) -> (MarketRegime, f64, BTreeMap<MarketRegime, f64>) {
    let mut scores = BTreeMap::new();
    let mut best = (MarketRegime::Neutral, f64::NEG_INFINITY);

    for regime in MarketRegime::CANDIDATES {
        let score = regime.score(features, indicators);
        scores.insert(regime, score);
        if score > best.1 {
            best = (regime, score);
        }
    }
    (best.0, best.1, scores)
}

// =============================================================================
// RegimeDetector
// =============================================================================

/// Regime detector holding the bounded price/volume and regime histories.
///
/// Not internally synchronised; the engine owns it behind a lock.
pub struct RegimeDetector {
    config: RegimeConfig,
    prices: VecDeque<(DateTime<Utc>, f64)>,
    volumes: VecDeque<f64>,
    history: VecDeque<RegimeSample>,
    current: RegimeReading,
    /// When the current regime was first detected.
    regime_since: DateTime<Utc>,
}

impl RegimeDetector {
    pub fn new(config: RegimeConfig) -> Self {
        Self {
            config,
            prices: VecDeque::new(),
            volumes: VecDeque::new(),
            history: VecDeque::new(),
            current: RegimeReading::neutral(0),
            regime_since: Utc::now(),
        }
    }

    /// Append one observation and evict samples older than the retention
    /// window (measured from the newest timestamp seen) or beyond the size
    /// cap.
    pub fn update(&mut self, price: f64, volume: f64, timestamp: DateTime<Utc>) -> EngineResult<()> {
        if !price.is_finite() || price <= 0.0 {
            return Err(EngineError::InvalidMarketSample(format!(
                "price must be positive and finite, got {price}"
            )));
        }
        if !volume.is_finite() || volume < 0.0 {
            return Err(EngineError::InvalidMarketSample(format!(
                "volume must be non-negative and finite, got {volume}"
            )));
        }

        self.prices.push_back((timestamp, price));
        self.volumes.push_back(volume);

        let newest = self
            .prices
            .iter()
            .map(|(ts, _)| *ts)
            .max()
            .unwrap_or(timestamp);
        let cutoff = newest - Duration::hours(self.config.retention_hours);

        while let Some((ts, _)) = self.prices.front() {
            if *ts >= cutoff && self.prices.len() <= self.config.max_price_history {
                break;
            }
            self.prices.pop_front();
            self.volumes.pop_front();
        }

        trace!(price, volume, retained = self.prices.len(), "market sample recorded");
        Ok(())
    }

    /// Classify the current history.  Cold start (fewer than `min_samples`
    /// prices) returns Neutral without touching the regime history.
    pub fn detect(&mut self, indicators: &MarketIndicators) -> RegimeReading {
        let sample_count = self.prices.len();
        if sample_count < self.config.min_samples {
            trace!(
                samples = sample_count,
                required = self.config.min_samples,
                "regime: insufficient history, reporting NEUTRAL"
            );
            let reading = RegimeReading::neutral(sample_count);
            self.current = reading.clone();
            return reading;
        }

        let prices: Vec<f64> = self.prices.iter().map(|(_, p)| *p).collect();
        let volumes: Vec<f64> = self.volumes.iter().copied().collect();
        let features = RegimeFeatures::compute(&prices, &volumes);

        let (best, best_score, scores) = classify(&features, indicators);
        let (regime, confidence) = if best_score < self.config.confidence_floor {
            (MarketRegime::Neutral, NEUTRAL_CONFIDENCE)
        } else {
            (best, best_score)
        };

        let now = Utc::now();
        if regime != self.current.regime {
            info!(
                from = %self.current.regime,
                to = %regime,
                confidence = format!("{:.2}", confidence),
                "market regime changed"
            );
            self.regime_since = now;
        }

        debug!(
            regime = %regime,
            best_candidate = %best,
            best_score = format!("{:.2}", best_score),
            volatility = format!("{:.5}", features.volatility),
            trend = format!("{:.5}", features.trend_strength),
            samples = sample_count,
            "Regime detected"
        );

        self.history.push_back(RegimeSample {
            timestamp: now,
            regime,
            confidence,
            volatility: features.volatility,
            trend_strength: features.trend_strength,
        });
        while self.history.len() > self.config.regime_history {
            self.history.pop_front();
        }

        let reading = RegimeReading {
            regime,
            confidence,
            sample_count,
            features: Some(features),
            scores,
            detected_at: now,
        };
        self.current = reading.clone();
        reading
    }

    /// The most recent reading without recomputing.
    pub fn current(&self) -> &RegimeReading {
        &self.current
    }

    /// Seconds the current regime has been active.
    pub fn regime_age_secs(&self) -> f64 {
        (Utc::now() - self.regime_since).num_milliseconds() as f64 / 1_000.0
    }

    pub fn sample_count(&self) -> usize {
        self.prices.len()
    }

    pub fn history(&self) -> impl Iterator<Item = &RegimeSample> {
        self.history.iter()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn feed_rising(detector: &mut RegimeDetector, n: usize) {
        let start = Utc::now() - Duration::minutes(n as i64);
        for i in 0..n {
            let price = 100.0 * 1.005f64.powi(i as i32);
            detector
                .update(price, 1_000.0, start + Duration::minutes(i as i64))
                .unwrap();
        }
    }

    fn bullish_indicators() -> MarketIndicators {
        MarketIndicators {
            social_sentiment: 0.8,
            funding_rate: 0.02,
            ..MarketIndicators::default()
        }
    }

    #[test]
    fn test_cold_start_is_neutral() {
        let mut detector = RegimeDetector::new(RegimeConfig::default());
        feed_rising(&mut detector, 49);
        let reading = detector.detect(&bullish_indicators());
        assert_eq!(reading.regime, MarketRegime::Neutral);
        assert!((reading.confidence - 0.5).abs() < f64::EPSILON);
        assert_eq!(reading.sample_count, 49);
        assert!(reading.features.is_none());
        assert_eq!(detector.history().count(), 0);
    }

    #[test]
    fn test_rising_series_is_trending_up() {
        let mut detector = RegimeDetector::new(RegimeConfig::default());
        feed_rising(&mut detector, 60);
        let reading = detector.detect(&bullish_indicators());
        assert_eq!(reading.regime, MarketRegime::TrendingUp);
        assert!(reading.confidence >= 0.75);
        assert_eq!(reading.sample_count, 60);
        assert_eq!(detector.history().count(), 1);
    }

    #[test]
    fn test_weak_winner_falls_back_to_neutral() {
        // Without the sentiment/funding bumps the uptrend scores 0.7, below
        // the 0.75 floor.
        let mut detector = RegimeDetector::new(RegimeConfig::default());
        feed_rising(&mut detector, 60);
        let reading = detector.detect(&MarketIndicators::default());
        assert_eq!(reading.regime, MarketRegime::Neutral);
        assert!((reading.confidence - 0.5).abs() < f64::EPSILON);
        assert!((reading.scores[&MarketRegime::TrendingUp] - 0.7).abs() < 1e-9);
    }

    #[test]
    fn test_classify_ties_go_to_declaration_order() {
        // TrendingUp, TrendingDown and Volatile all score exactly 0.4.
        let features = RegimeFeatures {
            volatility: 0.035,
            trend_strength: 0.0015,
            momentum: 0.0,
            volume_profile: 1.0,
        };
        let (regime, score, scores) = classify(&features, &MarketIndicators::default());
        assert_eq!(scores[&MarketRegime::TrendingUp], 0.4);
        assert_eq!(scores[&MarketRegime::TrendingDown], 0.4);
        assert_eq!(scores[&MarketRegime::Volatile], 0.4);
        assert_eq!(regime, MarketRegime::TrendingUp);
        assert!((score - 0.4).abs() < f64::EPSILON);
    }

    #[test]
    fn test_classify_collapse() {
        let features = RegimeFeatures {
            volatility: 0.02,
            trend_strength: 0.004,
            momentum: -0.08,
            volume_profile: 1.0,
        };
        let ind = MarketIndicators {
            fear_greed_index: 10.0,
            ..MarketIndicators::default()
        };
        let (regime, score, _) = classify(&features, &ind);
        assert_eq!(regime, MarketRegime::Collapse);
        assert!((score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_scores_are_capped() {
        let features = RegimeFeatures {
            volatility: 0.5,
            trend_strength: 0.0,
            momentum: 0.0,
            volume_profile: 1.0,
        };
        let ind = MarketIndicators {
            gas_price_volatility: 1.0,
            mempool_congestion: 1.0,
            ..MarketIndicators::default()
        };
        assert!((MarketRegime::HighVolatility.score(&features, &ind) - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_retention_evicts_old_samples() {
        let mut detector = RegimeDetector::new(RegimeConfig::default());
        let now = Utc::now();
        detector.update(100.0, 1.0, now - Duration::hours(30)).unwrap();
        detector.update(101.0, 1.0, now - Duration::hours(1)).unwrap();
        detector.update(102.0, 1.0, now).unwrap();
        assert_eq!(detector.sample_count(), 2);
    }

    #[test]
    fn test_size_cap_evicts_oldest() {
        let config = RegimeConfig {
            max_price_history: 10,
            ..RegimeConfig::default()
        };
        let mut detector = RegimeDetector::new(config);
        feed_rising(&mut detector, 25);
        assert_eq!(detector.sample_count(), 10);
    }

    #[test]
    fn test_invalid_sample_rejected() {
        let mut detector = RegimeDetector::new(RegimeConfig::default());
        assert!(detector.update(-1.0, 1.0, Utc::now()).is_err());
        assert!(detector.update(1.0, f64::NAN, Utc::now()).is_err());
        assert_eq!(detector.sample_count(), 0);
    }

    #[test]
    fn test_regime_display() {
        assert_eq!(format!("{}", MarketRegime::TrendingUp), "TRENDING_UP");
        assert_eq!(format!("{}", MarketRegime::HighVolatility), "HIGH_VOLATILITY");
    }
}
