// =============================================================================
// Shared types used across the Aurora tuner
// =============================================================================
//
// These are the records exchanged with external collaborators: execution
// outcomes pushed by the executor, market samples and portfolio snapshots
// pushed by the data side.  All of them are validated at the boundary so the
// engine never works with NaNs or missing fields.
// =============================================================================

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{validate_strategy_id, EngineError, EngineResult};
use crate::regime::MarketRegime;

/// Current layout version of [`MarketConditions`].
pub const MARKET_CONDITIONS_VERSION: u16 = 1;

fn default_conditions_version() -> u16 {
    MARKET_CONDITIONS_VERSION
}

fn default_sentiment() -> f64 {
    0.5
}

fn default_fear_greed() -> f64 {
    50.0
}

// =============================================================================
// Market conditions snapshot (attached to each execution)
// =============================================================================

/// Market-condition snapshot taken by the executor at execution time.
///
/// Every measurement is optional; absent values are excluded from analytics
/// instead of silently defaulting to zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketConditions {
    #[serde(default = "default_conditions_version")]
    pub version: u16,
    #[serde(default)]
    pub gas_price_gwei: Option<f64>,
    #[serde(default)]
    pub volatility: Option<f64>,
    #[serde(default)]
    pub liquidity_usd: Option<f64>,
    #[serde(default)]
    pub mempool_congestion: Option<f64>,
}

impl Default for MarketConditions {
    fn default() -> Self {
        Self {
            version: MARKET_CONDITIONS_VERSION,
            gas_price_gwei: None,
            volatility: None,
            liquidity_usd: None,
            mempool_congestion: None,
        }
    }
}

// =============================================================================
// Execution result
// =============================================================================

/// Immutable outcome record produced by the external executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub strategy_id: String,
    pub timestamp: DateTime<Utc>,
    /// Signed profit of the execution.
    pub profit: f64,
    pub success: bool,
    /// Execution latency in microseconds.
    pub execution_time_us: f64,
    #[serde(default)]
    pub slippage: f64,
    #[serde(default)]
    pub gas_used: u64,
    /// Regime that was active when the executor acted.
    pub market_regime: MarketRegime,
    #[serde(default)]
    pub market_conditions: MarketConditions,
}

impl ExecutionResult {
    /// Reject records with malformed ids or non-finite numbers.
    pub fn validate(&self) -> EngineResult<()> {
        validate_strategy_id(&self.strategy_id)?;

        let numbers = [
            ("profit", self.profit),
            ("execution_time_us", self.execution_time_us),
            ("slippage", self.slippage),
        ];
        for (name, value) in numbers {
            if !value.is_finite() {
                return Err(EngineError::InvalidExecutionResult(format!(
                    "{name} must be finite, got {value}"
                )));
            }
        }
        if self.execution_time_us < 0.0 {
            return Err(EngineError::InvalidExecutionResult(format!(
                "execution_time_us must be non-negative, got {}",
                self.execution_time_us
            )));
        }
        if self.market_conditions.version > MARKET_CONDITIONS_VERSION {
            return Err(EngineError::InvalidExecutionResult(format!(
                "unsupported market_conditions version {}",
                self.market_conditions.version
            )));
        }
        Ok(())
    }
}

// =============================================================================
// Market indicators (auxiliary regime inputs)
// =============================================================================

/// Auxiliary indicators that nudge the regime scores.
///
/// Neutral defaults are chosen so that a missing feed contributes nothing to
/// any score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketIndicators {
    #[serde(default)]
    pub gas_price_volatility: f64,
    #[serde(default)]
    pub mempool_congestion: f64,
    /// Social sentiment in [0, 1]; 0.5 is neutral.
    #[serde(default = "default_sentiment")]
    pub social_sentiment: f64,
    #[serde(default)]
    pub funding_rate: f64,
    /// Fear & greed index in [0, 100]; 50 is neutral.
    #[serde(default = "default_fear_greed")]
    pub fear_greed_index: f64,
}

impl Default for MarketIndicators {
    fn default() -> Self {
        Self {
            gas_price_volatility: 0.0,
            mempool_congestion: 0.0,
            social_sentiment: default_sentiment(),
            funding_rate: 0.0,
            fear_greed_index: default_fear_greed(),
        }
    }
}

impl MarketIndicators {
    fn validate(&self) -> EngineResult<()> {
        let values = [
            ("gas_price_volatility", self.gas_price_volatility),
            ("mempool_congestion", self.mempool_congestion),
            ("social_sentiment", self.social_sentiment),
            ("funding_rate", self.funding_rate),
            ("fear_greed_index", self.fear_greed_index),
        ];
        for (name, value) in values {
            if !value.is_finite() {
                return Err(EngineError::InvalidMarketSample(format!(
                    "indicator {name} must be finite, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// =============================================================================
// Push API payloads
// =============================================================================

/// One market observation feeding the regime detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarketSample {
    pub price: f64,
    pub volume: f64,
    pub timestamp: DateTime<Utc>,
    /// Latest auxiliary indicators, if the feed carries them.
    #[serde(default)]
    pub indicators: Option<MarketIndicators>,
}

impl MarketSample {
    pub fn validate(&self) -> EngineResult<()> {
        if !self.price.is_finite() || self.price <= 0.0 {
            return Err(EngineError::InvalidMarketSample(format!(
                "price must be positive and finite, got {}",
                self.price
            )));
        }
        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(EngineError::InvalidMarketSample(format!(
                "volume must be non-negative and finite, got {}",
                self.volume
            )));
        }
        if let Some(ind) = &self.indicators {
            ind.validate()?;
        }
        Ok(())
    }
}

/// Total portfolio value at a point in time, feeding the risk gate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSnapshot {
    pub timestamp: DateTime<Utc>,
    pub total_value: f64,
}
