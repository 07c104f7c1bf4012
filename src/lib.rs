// =============================================================================
// Aurora Tuner — adaptive strategy selection and parameter tuning
// =============================================================================
//
// Consumes execution outcomes, market samples and portfolio values; publishes
// a regime-aware recommendation (strategy, weights, parameters, risk gate) on
// four cadences.  The binary wires the engine to the scheduler and the
// operator HTTP surface.
// =============================================================================

pub mod analysis;
pub mod api;
pub mod arena;
pub mod engine;
pub mod error;
pub mod parameters;
pub mod performance;
pub mod recommendation;
pub mod regime;
pub mod risk;
pub mod runtime_config;
pub mod scheduler;
pub mod sink;
pub mod stats;
pub mod types;

pub use engine::Engine;
pub use error::{EngineError, EngineResult};
pub use recommendation::CurrentRecommendation;
pub use runtime_config::EngineConfig;
pub use scheduler::Scheduler;
