// =============================================================================
// Regime Detection Module
// =============================================================================
//
// Market regime classification from windowed price/volume statistics:
// - realised volatility
// - trend strength (normalised linear-fit slope)
// - short-window momentum
// - volume profile
//
// Each candidate regime has its own heuristic score in [0, 1]; the arg-max
// wins unless it falls below the confidence floor.

pub mod detector;
pub mod features;

pub use detector::{MarketRegime, RegimeDetector, RegimeReading, RegimeSample};
pub use features::RegimeFeatures;
