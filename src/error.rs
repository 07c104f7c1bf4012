// =============================================================================
// Engine errors — fail-fast conditions surfaced at the call site
// =============================================================================
//
// Insufficient data is NOT an error anywhere in the engine: cold-start calls
// return neutral readings carrying an explicit sample count.  Everything in
// this enum is either invalid input or a computation result that failed
// validation and must not be published.
// =============================================================================

use thiserror::Error;

use crate::scheduler::Cadence;

/// Every error the decision engine can raise.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("strategy set must not be empty")]
    EmptyStrategySet,

    #[error("malformed strategy id: {0:?}")]
    InvalidStrategyId(String),

    #[error("duplicate strategy id: {0}")]
    DuplicateStrategy(String),

    #[error("unknown strategy id: {0}")]
    UnknownStrategy(String),

    #[error("portfolio value must be positive and finite, got {0}")]
    InvalidPortfolioValue(f64),

    #[error("confidence level must be within [0.8, 0.999], got {0}")]
    InvalidConfidence(f64),

    #[error("invalid market sample: {0}")]
    InvalidMarketSample(String),

    #[error("invalid execution result: {0}")]
    InvalidExecutionResult(String),

    #[error("risk metric {metric} out of bounds: {value}")]
    InvalidRiskMetric { metric: &'static str, value: f64 },

    #[error("{operation} is reserved for the slow cadence (called from {cadence})")]
    CadenceNotPermitted {
        operation: &'static str,
        cadence: Cadence,
    },

    #[error("computation failed: {0}")]
    Computation(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Maximum accepted length of a strategy identifier.
const MAX_STRATEGY_ID_LEN: usize = 64;

/// Validate a strategy id: non-empty, bounded length, and limited to ASCII
/// alphanumerics plus `_`, `-` and `.`.
pub fn validate_strategy_id(id: &str) -> EngineResult<()> {
    let well_formed = !id.is_empty()
        && id.len() <= MAX_STRATEGY_ID_LEN
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));

    if well_formed {
        Ok(())
    } else {
        Err(EngineError::InvalidStrategyId(id.to_string()))
    }
}
