// =============================================================================
// Arena Module — Regime-aware Thompson Sampling strategy selection
// =============================================================================
//
// Strategies compete for execution.  Each strategy is a bandit arm with a
// Beta posterior kept globally and per market regime; Thompson Sampling
// draws from a blend of both and picks the highest sample.

pub mod arm;
pub mod bandit;

pub use arm::{BetaState, StrategyArm};
pub use bandit::BanditOptimizer;
