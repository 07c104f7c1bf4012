// =============================================================================
// Multi-Cadence Scheduler
// =============================================================================
//
// Four independently ticking cycles over one shared engine:
//
//   continuous  ~30s   drain 10    bandit updates + small parameter nudges
//   fast        ~2m    drain 50    summary, weights, optimization record
//   medium      ~10m   drain 200   full analysis + regime presets
//   slow        ~30m   drain 1000  deep analysis, long-horizon drift,
//                                  exploration rate
//
// plus the health task.  Each cadence is its own tokio task; a single watch
// channel carries the shutdown signal and every task finishes its current
// tick before exiting.
// =============================================================================

pub mod cycles;
pub mod health;
pub mod runner;

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::runtime_config::SchedulerConfig;

pub use runner::Scheduler;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cadence {
    Continuous,
    Fast,
    Medium,
    Slow,
}

impl Cadence {
    pub const ALL: [Cadence; 4] = [Self::Continuous, Self::Fast, Self::Medium, Self::Slow];

    pub fn interval(self, config: &SchedulerConfig) -> Duration {
        let ms = match self {
            Self::Continuous => config.continuous_interval_ms,
            Self::Fast => config.fast_interval_ms,
            Self::Medium => config.medium_interval_ms,
            Self::Slow => config.slow_interval_ms,
        };
        Duration::from_millis(ms)
    }

    /// Maximum number of results drained per tick.
    pub fn batch_size(self, config: &SchedulerConfig) -> usize {
        match self {
            Self::Continuous => config.continuous_batch,
            Self::Fast => config.fast_batch,
            Self::Medium => config.medium_batch,
            Self::Slow => config.slow_batch,
        }
    }

    /// Fixed confidence attached to this cadence's optimization records.
    pub fn record_confidence(self) -> Option<f64> {
        match self {
            Self::Continuous => None,
            Self::Fast => Some(0.8),
            Self::Medium => Some(0.9),
            Self::Slow => Some(0.95),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Continuous => "continuous",
            Self::Fast => "fast",
            Self::Medium => "medium",
            Self::Slow => "slow",
        }
    }
}

impl std::fmt::Display for Cadence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
