// =============================================================================
// BanditOptimizer — regime-aware Thompson Sampling
// =============================================================================
//
// Selection:  for every arm draw from Beta(a, b) with
//               a = g * global.alpha + (1 - g) * regime.alpha   (g = 0.7)
//               b = g * global.beta  + (1 - g) * regime.beta
//             While the regime posterior has fewer than `warmup_trials`
//             trials, exponential noise with mean
//             exploration_rate * (1 - trials / warmup_trials)
//             is added to both a and b.  Highest draw wins; ties go to the
//             earlier strategy in the configured list.
//
// Weights:    (r * regime_rate + (1 - r) * global_rate)
//             * min(regime_trials / confidence_trials, 1), normalised to 1,
//             uniform when every weight is zero.
//
// All arm mutations happen under one write lock, so a reader never sees an
// arm with alpha updated but trials stale.  The sampler is a seeded StdRng so
// runs are reproducible.
// =============================================================================

use std::collections::{BTreeMap, HashMap};

use parking_lot::{Mutex, RwLock};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Beta, Distribution, Exp};
use tracing::{debug, info};

use crate::arena::arm::StrategyArm;
use crate::error::{validate_strategy_id, EngineError, EngineResult};
use crate::regime::MarketRegime;
use crate::runtime_config::BanditConfig;
use crate::scheduler::Cadence;

pub struct BanditOptimizer {
    config: BanditConfig,
    /// Strategy ids in configuration order (the tie-break order).
    order: Vec<String>,
    index: HashMap<String, usize>,
    arms: RwLock<Vec<StrategyArm>>,
    exploration_rate: RwLock<f64>,
    rng: Mutex<StdRng>,
}

impl BanditOptimizer {
    /// Build one arm per strategy id.  The set must be non-empty, well formed
    /// and free of duplicates.
    pub fn new(strategies: &[String], config: BanditConfig, seed: u64) -> EngineResult<Self> {
        if strategies.is_empty() {
            return Err(EngineError::EmptyStrategySet);
        }

        let mut index = HashMap::with_capacity(strategies.len());
        for (i, id) in strategies.iter().enumerate() {
            validate_strategy_id(id)?;
            if index.insert(id.clone(), i).is_some() {
                return Err(EngineError::DuplicateStrategy(id.clone()));
            }
        }

        let arms = strategies.iter().map(StrategyArm::new).collect();
        let exploration_rate = config
            .exploration_rate
            .clamp(config.min_exploration_rate, config.max_exploration_rate);

        info!(
            strategies = strategies.len(),
            seed,
            exploration_rate,
            "bandit optimizer initialised"
        );

        Ok(Self {
            config,
            order: strategies.to_vec(),
            index,
            arms: RwLock::new(arms),
            exploration_rate: RwLock::new(exploration_rate),
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        })
    }

    pub fn strategies(&self) -> &[String] {
        &self.order
    }

    pub fn contains(&self, strategy_id: &str) -> bool {
        self.index.contains_key(strategy_id)
    }

    /// Thompson draw over all arms for `regime`.
    pub fn select_strategy(&self, regime: MarketRegime) -> EngineResult<String> {
        let arms = self.arms.read();
        let exploration = *self.exploration_rate.read();
        let g = self.config.sampling_global_weight;
        let warmup = self.config.warmup_trials;

        let mut rng = self.rng.lock();
        let mut best: Option<(usize, f64)> = None;

        for (i, arm) in arms.iter().enumerate() {
            let regime_state = arm.regime(regime);
            let mut a = g * arm.global.alpha + (1.0 - g) * regime_state.alpha;
            let mut b = g * arm.global.beta + (1.0 - g) * regime_state.beta;

            if regime_state.trials < warmup && warmup > 0 {
                let deficit = 1.0 - regime_state.trials as f64 / warmup as f64;
                let scale = exploration * deficit;
                if scale > 0.0 {
                    let noise = Exp::new(1.0 / scale).map_err(|e| {
                        EngineError::Computation(format!("exploration noise: {e}"))
                    })?;
                    a += noise.sample(&mut *rng);
                    b += noise.sample(&mut *rng);
                }
            }

            let posterior = Beta::new(a, b).map_err(|e| {
                EngineError::Computation(format!(
                    "beta({a}, {b}) for {}: {e}",
                    arm.strategy_id
                ))
            })?;
            let draw = posterior.sample(&mut *rng);

            if best.map_or(true, |(_, top)| draw > top) {
                best = Some((i, draw));
            }
        }

        // The strategy set is never empty.
        let (winner, draw) = best.ok_or(EngineError::EmptyStrategySet)?;
        let strategy_id = self.order[winner].clone();
        debug!(
            strategy = %strategy_id,
            regime = %regime,
            sample = format!("{:.4}", draw),
            "strategy selected"
        );
        Ok(strategy_id)
    }

    /// The sole mutation path of the arm table.
    pub fn update_performance(
        &self,
        strategy_id: &str,
        regime: MarketRegime,
        reward: f64,
        success: bool,
        latency_us: f64,
    ) -> EngineResult<()> {
        let idx = *self
            .index
            .get(strategy_id)
            .ok_or_else(|| EngineError::UnknownStrategy(strategy_id.to_string()))?;

        let mut arms = self.arms.write();
        let arm = &mut arms[idx];
        arm.record(regime, reward, success, latency_us);

        debug!(
            strategy = %strategy_id,
            regime = %regime,
            success,
            reward,
            alpha = arm.global.alpha,
            beta = arm.global.beta,
            trials = arm.global.trials,
            "bandit arm updated"
        );
        Ok(())
    }

    /// Normalised selection weights for `regime`, summing to 1.
    pub fn strategy_weights(&self, regime: MarketRegime) -> BTreeMap<String, f64> {
        let arms = self.arms.read();
        let r = self.config.weight_regime_share;

        let raw: Vec<f64> = arms
            .iter()
            .map(|arm| {
                let regime_state = arm.regime(regime);
                let regime_rate = if regime_state.trials > 0 {
                    regime_state.posterior_mean()
                } else {
                    0.5
                };
                let global_rate = arm.global.success_rate();
                let confidence =
                    (regime_state.trials as f64 / self.config.confidence_trials).min(1.0);
                (r * regime_rate + (1.0 - r) * global_rate) * confidence
            })
            .collect();

        let total: f64 = raw.iter().sum();
        let uniform = 1.0 / arms.len() as f64;

        arms.iter()
            .zip(raw)
            .map(|(arm, w)| {
                let weight = if total > 0.0 { w / total } else { uniform };
                (arm.strategy_id.clone(), weight)
            })
            .collect()
    }

    pub fn exploration_rate(&self) -> f64 {
        *self.exploration_rate.read()
    }

    /// Change the exploration rate.  Only the slow cadence may do this; the
    /// new value is clamped to the configured bounds.
    pub fn set_exploration_rate(&self, cadence: Cadence, rate: f64) -> EngineResult<f64> {
        if cadence != Cadence::Slow {
            return Err(EngineError::CadenceNotPermitted {
                operation: "set_exploration_rate",
                cadence,
            });
        }
        if !rate.is_finite() {
            return Err(EngineError::Computation(format!(
                "exploration rate must be finite, got {rate}"
            )));
        }

        let clamped = rate.clamp(
            self.config.min_exploration_rate,
            self.config.max_exploration_rate,
        );
        let mut current = self.exploration_rate.write();
        let previous = *current;
        *current = clamped;
        drop(current);

        if (previous - clamped).abs() > f64::EPSILON {
            info!(
                from = format!("{:.4}", previous),
                to = format!("{:.4}", clamped),
                "exploration rate adjusted"
            );
        }
        Ok(clamped)
    }

    /// Consistent copy of every arm.
    pub fn arms_snapshot(&self) -> Vec<StrategyArm> {
        self.arms.read().clone()
    }

    pub fn arm(&self, strategy_id: &str) -> Option<StrategyArm> {
        let idx = *self.index.get(strategy_id)?;
        Some(self.arms.read()[idx].clone())
    }

    pub fn total_trials(&self) -> u64 {
        self.arms.read().iter().map(|a| a.global.trials).sum()
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn ids(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn optimizer(seed: u64) -> BanditOptimizer {
        BanditOptimizer::new(
            &ids(&["alpha", "bravo", "charlie"]),
            BanditConfig::default(),
            seed,
        )
        .unwrap()
    }

    #[test]
    fn rejects_bad_strategy_sets() {
        let cfg = BanditConfig::default();
        assert_eq!(
            BanditOptimizer::new(&[], cfg.clone(), 1).err(),
            Some(EngineError::EmptyStrategySet)
        );
        assert!(matches!(
            BanditOptimizer::new(&ids(&["a", "a"]), cfg.clone(), 1),
            Err(EngineError::DuplicateStrategy(_))
        ));
        assert!(matches!(
            BanditOptimizer::new(&ids(&["ok", "not ok"]), cfg, 1),
            Err(EngineError::InvalidStrategyId(_))
        ));
    }

    #[test]
    fn unknown_strategy_update_fails() {
        let bandit = optimizer(1);
        assert_eq!(
            bandit.update_performance("zulu", MarketRegime::Ranging, 1.0, true, 10.0),
            Err(EngineError::UnknownStrategy("zulu".to_string()))
        );
    }

    #[test]
    fn uniform_weights_without_trials() {
        let bandit = optimizer(1);
        let weights = bandit.strategy_weights(MarketRegime::Volatile);
        assert_eq!(weights.len(), 3);
        for w in weights.values() {
            assert!((w - 1.0 / 3.0).abs() < 1e-12);
        }
    }

    #[test]
    fn weights_favour_the_winning_arm() {
        let bandit = optimizer(1);
        for _ in 0..10 {
            bandit
                .update_performance("bravo", MarketRegime::Ranging, 1.0, true, 50.0)
                .unwrap();
            bandit
                .update_performance("charlie", MarketRegime::Ranging, -1.0, false, 50.0)
                .unwrap();
        }
        let weights = bandit.strategy_weights(MarketRegime::Ranging);
        let sum: f64 = weights.values().sum();
        assert!((sum - 1.0).abs() < 1e-9);
        assert_eq!(weights["alpha"], 0.0);
        assert!(weights["bravo"] > weights["charlie"]);

        // No trials in another regime: uniform fallback.
        let other = bandit.strategy_weights(MarketRegime::Collapse);
        assert!((other["alpha"] - 1.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn selection_is_reproducible_with_a_seed() {
        let a = optimizer(7);
        let b = optimizer(7);
        for _ in 0..20 {
            assert_eq!(
                a.select_strategy(MarketRegime::TrendingUp).unwrap(),
                b.select_strategy(MarketRegime::TrendingUp).unwrap()
            );
        }
    }

    #[test]
    fn selection_converges_on_the_best_arm() {
        let bandit = optimizer(11);
        for _ in 0..200 {
            bandit
                .update_performance("charlie", MarketRegime::Breakout, 1.0, true, 10.0)
                .unwrap();
            bandit
                .update_performance("alpha", MarketRegime::Breakout, -1.0, false, 10.0)
                .unwrap();
            bandit
                .update_performance("bravo", MarketRegime::Breakout, -1.0, false, 10.0)
                .unwrap();
        }
        let picks = (0..100)
            .filter(|_| bandit.select_strategy(MarketRegime::Breakout).unwrap() == "charlie")
            .count();
        assert!(picks >= 95, "charlie picked {picks}/100 times");
    }

    #[test]
    fn only_slow_cadence_may_change_exploration() {
        let bandit = optimizer(1);
        for cadence in [Cadence::Continuous, Cadence::Fast, Cadence::Medium] {
            assert!(matches!(
                bandit.set_exploration_rate(cadence, 0.15),
                Err(EngineError::CadenceNotPermitted { .. })
            ));
        }
        assert!((bandit.exploration_rate() - 0.1).abs() < f64::EPSILON);

        assert_eq!(bandit.set_exploration_rate(Cadence::Slow, 0.15).unwrap(), 0.15);
        assert_eq!(bandit.set_exploration_rate(Cadence::Slow, 5.0).unwrap(), 0.2);
        assert_eq!(bandit.set_exploration_rate(Cadence::Slow, 0.0).unwrap(), 0.05);
    }

    proptest! {
        #[test]
        fn prior_never_degenerates(
            updates in prop::collection::vec((0usize..3, 0usize..8, any::<bool>(), -10.0f64..10.0), 0..300)
        ) {
            let bandit = optimizer(3);
            let names = ["alpha", "bravo", "charlie"];
            for (arm, regime, success, reward) in updates {
                bandit
                    .update_performance(names[arm], MarketRegime::ALL[regime], reward, success, 1.0)
                    .unwrap();
            }
            for arm in bandit.arms_snapshot() {
                prop_assert!(arm.global.alpha >= 1.0 && arm.global.beta >= 1.0);
                prop_assert_eq!(arm.global.alpha + arm.global.beta - 2.0, arm.global.trials as f64);
                for state in arm.regimes.values() {
                    prop_assert!(state.alpha >= 1.0 && state.beta >= 1.0);
                }
            }
        }

        #[test]
        fn weights_always_sum_to_one(
            updates in prop::collection::vec((0usize..3, 0usize..8, any::<bool>()), 0..200),
            query in 0usize..8,
        ) {
            let bandit = optimizer(5);
            let names = ["alpha", "bravo", "charlie"];
            for (arm, regime, success) in updates {
                bandit
                    .update_performance(names[arm], MarketRegime::ALL[regime], 0.0, success, 1.0)
                    .unwrap();
            }
            let weights = bandit.strategy_weights(MarketRegime::ALL[query]);
            let sum: f64 = weights.values().sum();
            prop_assert!((sum - 1.0).abs() < 1e-9);
            prop_assert!(weights.values().all(|w| *w >= 0.0));
        }
    }
}
