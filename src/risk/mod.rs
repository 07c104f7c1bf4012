// =============================================================================
// Risk Module
// =============================================================================
//
// Portfolio-level risk controls feeding the decision engine:
// - drawdown events with severity bands and recovery tracking
// - historical / parametric VaR, CVaR and the Kupiec backtest
// - the circuit-breaker gate combining both

pub mod drawdown;
pub mod gate;
pub mod var;

pub use drawdown::{DrawdownAlert, DrawdownEvent, DrawdownSeverity};
pub use gate::{CircuitBreakerStatus, RiskGate, RiskState, VarEstimate};
pub use var::{VarBacktest, VarMethod};
