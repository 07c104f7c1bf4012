// =============================================================================
// ParameterSet — executor-facing tunables with hard [min, max] bands
// =============================================================================
//
// Every cadence cycle rewrites the same ParameterSet.  Writes go through
// `SharedParameters::apply`, which performs clone -> mutate -> clamp -> store
// under one mutex, so two cadences firing in the same tick can only ever
// produce last-writer-wins, never a half-applied or unclamped set.
// =============================================================================

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::scheduler::Cadence;

/// Closed interval a parameter must stay within.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Band {
    pub min: f64,
    pub max: f64,
}

impl Band {
    const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the band.  NaN collapses to the lower bound.
    pub fn clamp(&self, value: f64) -> f64 {
        if value.is_nan() {
            return self.min;
        }
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        value >= self.min && value <= self.max
    }
}

pub const GAS_MULTIPLIER: Band = Band::new(0.8, 2.0);
pub const SLIPPAGE_TOLERANCE: Band = Band::new(0.0001, 0.01);
pub const MIN_PROFIT_THRESHOLD: Band = Band::new(0.05, 5.0);
pub const MAX_POSITION_SIZE: Band = Band::new(100.0, 10_000.0);
pub const EXECUTION_TIMEOUT_SECS: Band = Band::new(5.0, 120.0);
pub const RISK_MULTIPLIER: Band = Band::new(0.25, 2.0);
pub const CONFIDENCE_THRESHOLD: Band = Band::new(0.5, 0.95);
pub const MAX_CONCURRENT_TRADES_MIN: u32 = 1;
pub const MAX_CONCURRENT_TRADES_MAX: u32 = 10;

/// The configuration snapshot consumed by the external executor.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet {
    pub gas_multiplier: f64,
    pub slippage_tolerance: f64,
    pub min_profit_threshold: f64,
    pub max_position_size: f64,
    pub execution_timeout_secs: f64,
    pub risk_multiplier: f64,
    pub confidence_threshold: f64,
    pub max_concurrent_trades: u32,
}

impl Default for ParameterSet {
    fn default() -> Self {
        Self {
            gas_multiplier: 1.2,
            slippage_tolerance: 0.001,
            min_profit_threshold: 0.5,
            max_position_size: 1_000.0,
            execution_timeout_secs: 30.0,
            risk_multiplier: 1.0,
            confidence_threshold: 0.75,
            max_concurrent_trades: 5,
        }
    }
}

impl ParameterSet {
    /// Return a copy with every field forced into its band.
    pub fn clamped(mut self) -> Self {
        self.gas_multiplier = GAS_MULTIPLIER.clamp(self.gas_multiplier);
        self.slippage_tolerance = SLIPPAGE_TOLERANCE.clamp(self.slippage_tolerance);
        self.min_profit_threshold = MIN_PROFIT_THRESHOLD.clamp(self.min_profit_threshold);
        self.max_position_size = MAX_POSITION_SIZE.clamp(self.max_position_size);
        self.execution_timeout_secs = EXECUTION_TIMEOUT_SECS.clamp(self.execution_timeout_secs);
        self.risk_multiplier = RISK_MULTIPLIER.clamp(self.risk_multiplier);
        self.confidence_threshold = CONFIDENCE_THRESHOLD.clamp(self.confidence_threshold);
        self.max_concurrent_trades = self
            .max_concurrent_trades
            .clamp(MAX_CONCURRENT_TRADES_MIN, MAX_CONCURRENT_TRADES_MAX);
        self
    }

    pub fn within_bounds(&self) -> bool {
        GAS_MULTIPLIER.contains(self.gas_multiplier)
            && SLIPPAGE_TOLERANCE.contains(self.slippage_tolerance)
            && MIN_PROFIT_THRESHOLD.contains(self.min_profit_threshold)
            && MAX_POSITION_SIZE.contains(self.max_position_size)
            && EXECUTION_TIMEOUT_SECS.contains(self.execution_timeout_secs)
            && RISK_MULTIPLIER.contains(self.risk_multiplier)
            && CONFIDENCE_THRESHOLD.contains(self.confidence_threshold)
            && (MAX_CONCURRENT_TRADES_MIN..=MAX_CONCURRENT_TRADES_MAX)
                .contains(&self.max_concurrent_trades)
    }
}

// =============================================================================
// SharedParameters
// =============================================================================

/// The single shared ParameterSet, serialised behind a mutex.
pub struct SharedParameters {
    inner: Mutex<ParameterSet>,
}

impl SharedParameters {
    pub fn new(initial: ParameterSet) -> Self {
        Self {
            inner: Mutex::new(initial.clamped()),
        }
    }

    /// Point-in-time copy.
    pub fn snapshot(&self) -> ParameterSet {
        *self.inner.lock()
    }

    /// The bounded-clamp setter.  The whole read-modify-write happens under
    /// the lock.  When `allow_position_increase` is false any increase of
    /// `max_position_size` is reverted before storing.
    pub fn apply<F>(&self, cadence: Cadence, allow_position_increase: bool, mutate: F) -> ParameterSet
    where
        F: FnOnce(&mut ParameterSet),
    {
        let mut guard = self.inner.lock();
        let before = *guard;

        let mut next = before;
        mutate(&mut next);
        if !allow_position_increase && next.max_position_size > before.max_position_size {
            next.max_position_size = before.max_position_size;
        }
        let next = next.clamped();
        *guard = next;
        drop(guard);

        if next != before {
            debug!(
                cadence = %cadence,
                confidence = next.confidence_threshold,
                risk = next.risk_multiplier,
                position = next.max_position_size,
                concurrency = next.max_concurrent_trades,
                "parameter set updated"
            );
        }
        next
    }

    /// Operator reset back to the defaults.
    pub fn reset(&self) {
        *self.inner.lock() = ParameterSet::default();
    }
}

impl Default for SharedParameters {
    fn default() -> Self {
        Self::new(ParameterSet::default())
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn defaults_are_within_bounds() {
        assert!(ParameterSet::default().within_bounds());
    }

    #[test]
    fn clamp_pulls_values_back_into_band() {
        let p = ParameterSet {
            gas_multiplier: 50.0,
            slippage_tolerance: -1.0,
            min_profit_threshold: f64::NAN,
            max_position_size: 1e9,
            execution_timeout_secs: 0.0,
            risk_multiplier: 0.0,
            confidence_threshold: 2.0,
            max_concurrent_trades: 99,
        }
        .clamped();
        assert!(p.within_bounds());
        assert_eq!(p.gas_multiplier, 2.0);
        assert_eq!(p.min_profit_threshold, MIN_PROFIT_THRESHOLD.min);
        assert_eq!(p.max_concurrent_trades, 10);
    }

    #[test]
    fn position_increase_is_reverted_when_gated() {
        let shared = SharedParameters::default();
        let after = shared.apply(Cadence::Medium, false, |p| p.max_position_size *= 1.5);
        assert_eq!(after.max_position_size, 1_000.0);

        let after = shared.apply(Cadence::Medium, false, |p| p.max_position_size *= 0.5);
        assert_eq!(after.max_position_size, 500.0);

        let after = shared.apply(Cadence::Medium, true, |p| p.max_position_size *= 3.0);
        assert_eq!(after.max_position_size, 1_500.0);
    }

    #[derive(Debug, Clone)]
    enum Op {
        Confidence(f64),
        Risk(f64),
        Position(f64),
        Slippage(f64),
        Gas(f64),
        Concurrency(i32),
    }

    fn op_strategy() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0.0f64..5.0).prop_map(Op::Confidence),
            (0.0f64..5.0).prop_map(Op::Risk),
            (0.0f64..5.0).prop_map(Op::Position),
            (0.0f64..100.0).prop_map(Op::Slippage),
            (0.0f64..5.0).prop_map(Op::Gas),
            (-20i32..20).prop_map(Op::Concurrency),
        ]
    }

    fn apply_op(p: &mut ParameterSet, op: &Op) {
        match *op {
            Op::Confidence(f) => p.confidence_threshold *= f,
            Op::Risk(f) => p.risk_multiplier *= f,
            Op::Position(f) => p.max_position_size *= f,
            Op::Slippage(f) => p.slippage_tolerance *= f,
            Op::Gas(f) => p.gas_multiplier *= f,
            Op::Concurrency(d) => {
                p.max_concurrent_trades = (p.max_concurrent_trades as i32 + d).max(0) as u32
            }
        }
    }

    proptest! {
        #[test]
        fn sequential_writes_stay_in_band(ops in prop::collection::vec(op_strategy(), 1..200)) {
            let shared = SharedParameters::default();
            for op in &ops {
                let after = shared.apply(Cadence::Continuous, true, |p| apply_op(p, op));
                prop_assert!(after.within_bounds());
            }
            prop_assert!(shared.snapshot().within_bounds());
        }

        #[test]
        fn interleaved_cadence_writes_stay_in_band(
            batches in prop::collection::vec(prop::collection::vec(op_strategy(), 1..50), 4)
        ) {
            let shared = SharedParameters::default();
            let cadences = [Cadence::Continuous, Cadence::Fast, Cadence::Medium, Cadence::Slow];

            std::thread::scope(|scope| {
                for (cadence, ops) in cadences.iter().zip(batches.iter()) {
                    let shared = &shared;
                    scope.spawn(move || {
                        for op in ops {
                            let after = shared.apply(*cadence, true, |p| apply_op(p, op));
                            assert!(after.within_bounds());
                        }
                    });
                }
            });

            prop_assert!(shared.snapshot().within_bounds());
        }
    }
}
