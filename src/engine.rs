// =============================================================================
// Decision Engine — shared state behind every cadence, the API and health
// =============================================================================
//
// The single owner of the ParameterSet, the bandit arm table, the regime
// detector and the risk gate.  Cadence tasks, the health task and the HTTP
// handlers all hold an `Arc<Engine>` and only ever reach a component through
// the methods below.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot locks for every mutable collection; no lock is held across
//     an await point.
//   - The latest recommendation lives in a tokio watch channel so the
//     WebSocket feed can await changes instead of polling.
//
// One tick of any cadence (`run_cycle`):
//   1. refresh the regime reading from the latest market history
//   2. evaluate the risk gate (a failure skips the tick before anything is
//      drained, so no result is lost)
//   3. drain the sink and fold every result, in arrival order, into the
//      performance tracker, the bandit and the rolling history
//   4. cadence-specific analysis and parameter adjustment
//   5. select a strategy and publish a CurrentRecommendation
// =============================================================================

use std::collections::{BTreeMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::analysis::{self, BatchSummary};
use crate::arena::BanditOptimizer;
use crate::error::{EngineError, EngineResult};
use crate::parameters::{ParameterSet, SharedParameters};
use crate::performance::{PerformanceMetrics, PerformanceTotals, PerformanceTracker};
use crate::recommendation::{Alert, CurrentRecommendation, CycleAnalysis, OptimizationRecord};
use crate::regime::{RegimeDetector, RegimeReading};
use crate::risk::{CircuitBreakerStatus, RiskGate, RiskState};
use crate::runtime_config::EngineConfig;
use crate::scheduler::{cycles, Cadence};
use crate::sink::{ExecutionResultSink, SubmitOutcome};
use crate::types::{ExecutionResult, MarketIndicators, MarketSample, PortfolioSnapshot};

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;
/// Optimization records included in a status report.
const STATUS_RECENT_OPTIMIZATIONS: usize = 10;

// =============================================================================
// Records
// =============================================================================

/// A recorded error event for the operator error log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Optional machine-readable code (the failing cadence).
    pub code: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// Bookkeeping of one cadence's ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CadenceRun {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_run_at: Option<DateTime<Utc>>,
    pub runs: u64,
    pub failures: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CadenceStatus {
    pub cadence: Cadence,
    pub interval_ms: u64,
    #[serde(flatten)]
    pub run: CadenceRun,
    pub overdue: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct QueueStatus {
    pub pending: usize,
    pub capacity: usize,
    pub accepted: u64,
    pub dropped: u64,
}

/// Operator-facing snapshot, polled on demand.
#[derive(Debug, Clone, Serialize)]
pub struct StatusReport {
    pub state_version: u64,
    pub uptime_secs: u64,
    pub generated_at: DateTime<Utc>,
    pub cadences: Vec<CadenceStatus>,
    pub regime: RegimeReading,
    pub parameters: ParameterSet,
    pub exploration_rate: f64,
    pub circuit_breaker: CircuitBreakerStatus,
    pub risk: Option<RiskState>,
    pub performance: Vec<PerformanceMetrics>,
    pub totals: PerformanceTotals,
    pub queue: QueueStatus,
    pub active_alerts: Vec<Alert>,
    pub recent_optimizations: Vec<OptimizationRecord>,
    pub recent_errors: Vec<ErrorRecord>,
    pub recommendation: Option<CurrentRecommendation>,
}

/// What one tick did.
#[derive(Debug, Clone)]
pub struct CycleOutcome {
    pub cadence: Cadence,
    pub drained: usize,
    pub recommendation: CurrentRecommendation,
}

// =============================================================================
// Engine
// =============================================================================

pub struct Engine {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every meaningful state mutation.
    state_version: AtomicU64,

    config: EngineConfig,

    // ── Decision components ─────────────────────────────────────────────
    parameters: SharedParameters,
    bandit: BanditOptimizer,
    regime: RwLock<RegimeDetector>,
    latest_indicators: RwLock<MarketIndicators>,
    risk: RiskGate,
    performance: PerformanceTracker,

    // ── Input queue and histories ───────────────────────────────────────
    sink: ExecutionResultSink,
    result_history: RwLock<VecDeque<ExecutionResult>>,
    optimization_history: RwLock<VecDeque<OptimizationRecord>>,

    // ── Health / alerts ─────────────────────────────────────────────────
    cadence_runs: RwLock<BTreeMap<Cadence, CadenceRun>>,
    active_alerts: RwLock<Vec<Alert>>,
    alert_history: RwLock<VecDeque<Alert>>,
    recent_errors: RwLock<VecDeque<ErrorRecord>>,

    // ── Output ──────────────────────────────────────────────────────────
    recommendation_tx: watch::Sender<Option<CurrentRecommendation>>,

    // ── Timing ──────────────────────────────────────────────────────────
    start_time: Instant,
    started_at: DateTime<Utc>,
}

impl Engine {
    /// Build every component from `config`.  Fails on an empty or malformed
    /// strategy set.
    pub fn new(config: EngineConfig) -> EngineResult<Self> {
        let bandit = BanditOptimizer::new(&config.strategies, config.bandit.clone(), config.rng_seed)?;
        let (recommendation_tx, _) = watch::channel(None);

        info!(
            strategies = config.strategies.len(),
            queue_capacity = config.scheduler.queue_capacity,
            "decision engine initialised"
        );

        Ok(Self {
            state_version: AtomicU64::new(1),
            parameters: SharedParameters::default(),
            performance: PerformanceTracker::new(&config.strategies),
            bandit,
            regime: RwLock::new(RegimeDetector::new(config.regime.clone())),
            latest_indicators: RwLock::new(MarketIndicators::default()),
            risk: RiskGate::new(config.risk.clone()),
            sink: ExecutionResultSink::new(config.scheduler.queue_capacity),
            result_history: RwLock::new(VecDeque::new()),
            optimization_history: RwLock::new(VecDeque::new()),
            cadence_runs: RwLock::new(BTreeMap::new()),
            active_alerts: RwLock::new(Vec::new()),
            alert_history: RwLock::new(VecDeque::new()),
            recent_errors: RwLock::new(VecDeque::new()),
            recommendation_tx,
            start_time: Instant::now(),
            started_at: Utc::now(),
            config,
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn risk(&self) -> &RiskGate {
        &self.risk
    }

    pub fn bandit(&self) -> &BanditOptimizer {
        &self.bandit
    }

    pub fn performance(&self) -> &PerformanceTracker {
        &self.performance
    }

    pub fn parameters(&self) -> ParameterSet {
        self.parameters.snapshot()
    }

    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Push APIs ───────────────────────────────────────────────────────

    /// Queue one execution outcome.  Malformed records and unknown strategies
    /// are rejected here; a full queue drops the record and counts it.
    pub fn submit_result(&self, result: ExecutionResult) -> EngineResult<SubmitOutcome> {
        if !self.bandit.contains(&result.strategy_id) {
            return Err(EngineError::UnknownStrategy(result.strategy_id));
        }
        self.sink.submit(result)
    }

    pub fn observe_market(&self, sample: MarketSample) -> EngineResult<()> {
        sample.validate()?;
        self.regime
            .write()
            .update(sample.price, sample.volume, sample.timestamp)?;
        if let Some(indicators) = sample.indicators {
            *self.latest_indicators.write() = indicators;
        }
        Ok(())
    }

    pub fn observe_portfolio(&self, snapshot: PortfolioSnapshot) -> EngineResult<()> {
        self.risk
            .update_portfolio_value(snapshot.timestamp, snapshot.total_value)?;
        self.increment_version();
        Ok(())
    }

    // ── Recommendation feed ─────────────────────────────────────────────

    pub fn subscribe(&self) -> watch::Receiver<Option<CurrentRecommendation>> {
        self.recommendation_tx.subscribe()
    }

    pub fn current_recommendation(&self) -> Option<CurrentRecommendation> {
        self.recommendation_tx.borrow().clone()
    }

    // ── Cadence ticks ───────────────────────────────────────────────────

    /// Run one tick of `cadence`.  Errors leave the queue untouched when they
    /// happen before the drain; the scheduler logs them and retries on the
    /// next interval.
    pub fn run_cycle(&self, cadence: Cadence) -> EngineResult<CycleOutcome> {
        let started = Instant::now();

        let reading = self.refresh_regime();
        let risk_state = self.risk.evaluate()?;

        let batch = self.sink.drain(cadence.batch_size(&self.config.scheduler));
        self.ingest(&batch);

        match cadence {
            Cadence::Continuous => self.continuous_tick(&batch),
            Cadence::Fast => self.fast_tick(&batch, &reading),
            Cadence::Medium => self.medium_tick(&batch, &reading),
            Cadence::Slow => self.slow_tick(&batch, &reading)?,
        }

        let recommendation = self.publish(cadence, &reading, &risk_state)?;
        self.record_success(cadence, started.elapsed().as_millis() as u64);

        debug!(
            cadence = %cadence,
            drained = batch.len(),
            strategy = %recommendation.strategy_id,
            regime = %reading.regime,
            "cycle completed"
        );

        Ok(CycleOutcome {
            cadence,
            drained: batch.len(),
            recommendation,
        })
    }

    fn refresh_regime(&self) -> RegimeReading {
        let indicators = self.latest_indicators.read().clone();
        self.regime.write().detect(&indicators)
    }

    /// Fold drained results into the tracker, the bandit and the rolling
    /// history, in arrival order.
    fn ingest(&self, batch: &[ExecutionResult]) {
        for result in batch {
            if let Err(e) = self.performance.record(result) {
                warn!(strategy = %result.strategy_id, error = %e, "result skipped");
                continue;
            }
            if let Err(e) = self.bandit.update_performance(
                &result.strategy_id,
                result.market_regime,
                result.profit,
                result.success,
                result.execution_time_us,
            ) {
                warn!(strategy = %result.strategy_id, error = %e, "bandit update skipped");
            }
        }

        if batch.is_empty() {
            return;
        }
        let cap = self.config.scheduler.result_history;
        let mut history = self.result_history.write();
        history.extend(batch.iter().cloned());
        while history.len() > cap {
            history.pop_front();
        }
        drop(history);
        self.increment_version();
    }

    fn continuous_tick(&self, batch: &[ExecutionResult]) {
        if batch.is_empty() {
            return;
        }
        let summary = analysis::summarize(batch);
        self.parameters
            .apply(Cadence::Continuous, self.risk.allows_position_increase(), |p| {
                cycles::continuous_nudge(p, &summary)
            });
    }

    fn fast_tick(&self, batch: &[ExecutionResult], reading: &RegimeReading) {
        if batch.is_empty() {
            return;
        }
        let summary = analysis::summarize(batch);
        let recommendations = analysis::fast_recommendations(&summary);
        self.push_record(
            Cadence::Fast,
            reading,
            batch.len(),
            CycleAnalysis::Summary(summary),
            recommendations,
        );
        info!(results = batch.len(), "fast optimization completed");
    }

    fn medium_tick(&self, batch: &[ExecutionResult], reading: &RegimeReading) {
        if batch.is_empty() {
            return;
        }
        let analysis = analysis::comprehensive(batch);
        self.parameters
            .apply(Cadence::Medium, self.risk.allows_position_increase(), |p| {
                cycles::medium_adjustment(p, reading.regime, &analysis.summary)
            });
        let recommendations = analysis::medium_recommendations(&analysis);
        self.push_record(
            Cadence::Medium,
            reading,
            batch.len(),
            CycleAnalysis::Comprehensive(analysis),
            recommendations,
        );
        info!(regime = %reading.regime, results = batch.len(), "medium optimization completed");
    }

    fn slow_tick(&self, batch: &[ExecutionResult], reading: &RegimeReading) -> EngineResult<()> {
        if batch.is_empty() {
            return Ok(());
        }
        let history: Vec<ExecutionResult> = self.result_history.read().iter().cloned().collect();
        let deep = analysis::deep(&history);

        let b = &self.config.bandit;
        let rate = cycles::next_exploration_rate(
            self.bandit.exploration_rate(),
            deep.comprehensive.optimization_potential,
            b.min_exploration_rate,
            b.max_exploration_rate,
        );
        self.bandit.set_exploration_rate(Cadence::Slow, rate)?;

        self.parameters
            .apply(Cadence::Slow, self.risk.allows_position_increase(), |p| {
                cycles::long_horizon_drift(p, &deep)
            });

        let recommendations = analysis::slow_recommendations(&deep);
        self.push_record(
            Cadence::Slow,
            reading,
            batch.len(),
            CycleAnalysis::Deep(Box::new(deep)),
            recommendations,
        );
        info!(history = history.len(), "slow optimization completed");
        Ok(())
    }

    fn push_record(
        &self,
        cadence: Cadence,
        reading: &RegimeReading,
        batch_size: usize,
        analysis: CycleAnalysis,
        recommendations: Vec<String>,
    ) {
        let record = OptimizationRecord {
            id: uuid::Uuid::new_v4().to_string(),
            cadence,
            timestamp: Utc::now(),
            regime: reading.regime,
            batch_size,
            strategy_weights: self.bandit.strategy_weights(reading.regime),
            parameters: self.parameters.snapshot(),
            analysis,
            confidence: cadence.record_confidence().unwrap_or(0.0),
            recommendations,
        };

        let cap = self.config.scheduler.optimization_history;
        let mut history = self.optimization_history.write();
        history.push_back(record);
        while history.len() > cap {
            history.pop_front();
        }
    }

    fn publish(
        &self,
        cadence: Cadence,
        reading: &RegimeReading,
        risk_state: &RiskState,
    ) -> EngineResult<CurrentRecommendation> {
        let strategy_id = self.bandit.select_strategy(reading.regime)?;
        let breaker = &risk_state.circuit_breaker;

        let recommendation = CurrentRecommendation {
            id: uuid::Uuid::new_v4().to_string(),
            strategy_id,
            regime: reading.regime,
            regime_confidence: reading.confidence,
            parameters: self.parameters.snapshot(),
            strategy_weights: self.bandit.strategy_weights(reading.regime),
            risk_gate_open: !breaker.tripped,
            risk_gate_reason: breaker.tripped.then(|| breaker.reason.clone()),
            max_position_scalar: risk_state.max_position_scalar,
            cadence,
            generated_at: Utc::now(),
        };

        self.recommendation_tx.send_replace(Some(recommendation.clone()));
        self.increment_version();
        Ok(recommendation)
    }

    // ── Cadence bookkeeping ─────────────────────────────────────────────

    fn record_success(&self, cadence: Cadence, duration_ms: u64) {
        let mut runs = self.cadence_runs.write();
        let run = runs.entry(cadence).or_default();
        run.last_run_at = Some(Utc::now());
        run.runs += 1;
        run.last_duration_ms = Some(duration_ms);
        run.last_error = None;
    }

    /// Called by the scheduler when a tick fails or panics.
    pub fn record_failure(&self, cadence: Cadence, message: String) {
        {
            let mut runs = self.cadence_runs.write();
            let run = runs.entry(cadence).or_default();
            run.failures += 1;
            run.last_error = Some(message.clone());
        }
        self.push_error_with_code(message, Some(cadence.to_string()));
    }

    pub fn cadence_run(&self, cadence: Cadence) -> CadenceRun {
        self.cadence_runs.read().get(&cadence).cloned().unwrap_or_default()
    }

    /// Cadences whose last successful tick (or engine start, before the
    /// first) is older than twice their interval.
    pub fn overdue_cadences(&self, now: DateTime<Utc>) -> Vec<Cadence> {
        Cadence::ALL
            .into_iter()
            .filter(|c| self.is_overdue(*c, now))
            .collect()
    }

    fn is_overdue(&self, cadence: Cadence, now: DateTime<Utc>) -> bool {
        let reference = self.cadence_run(cadence).last_run_at.unwrap_or(self.started_at);
        let allowed = cadence.interval(&self.config.scheduler) * 2;
        match (now - reference).to_std() {
            Ok(elapsed) => elapsed > allowed,
            Err(_) => false,
        }
    }

    // ── Error Logging ───────────────────────────────────────────────────

    pub fn push_error_with_code(&self, msg: String, code: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            code,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push_back(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.pop_front();
        }
        drop(errors);

        self.increment_version();
    }

    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.recent_errors.read().iter().cloned().collect()
    }

    // ── Alerts ──────────────────────────────────────────────────────────

    /// Replace the active alert list and append the new alerts to history.
    pub fn replace_alerts(&self, alerts: Vec<Alert>) {
        {
            let cap = self.config.scheduler.alert_history;
            let mut history = self.alert_history.write();
            history.extend(alerts.iter().cloned());
            while history.len() > cap {
                history.pop_front();
            }
        }
        *self.active_alerts.write() = alerts;
        self.increment_version();
    }

    pub fn active_alerts(&self) -> Vec<Alert> {
        self.active_alerts.read().clone()
    }

    pub fn alert_history(&self, limit: usize) -> Vec<Alert> {
        let history = self.alert_history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    // ── Histories ───────────────────────────────────────────────────────

    /// Newest-last slice of the optimization history.
    pub fn recent_optimizations(&self, limit: usize) -> Vec<OptimizationRecord> {
        let history = self.optimization_history.read();
        let skip = history.len().saturating_sub(limit);
        history.iter().skip(skip).cloned().collect()
    }

    pub fn result_history_len(&self) -> usize {
        self.result_history.read().len()
    }

    /// Summary over the whole rolling result history.
    pub fn history_summary(&self) -> BatchSummary {
        let history: Vec<ExecutionResult> = self.result_history.read().iter().cloned().collect();
        analysis::summarize(&history)
    }

    // ── Operator actions ────────────────────────────────────────────────

    /// Reset one strategy's performance accumulator, or all of them.
    pub fn reset_performance(&self, strategy_id: Option<&str>) -> EngineResult<()> {
        match strategy_id {
            Some(id) => self.performance.reset(id)?,
            None => self.performance.reset_all(),
        }
        self.increment_version();
        Ok(())
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    pub fn queue_status(&self) -> QueueStatus {
        QueueStatus {
            pending: self.sink.len(),
            capacity: self.sink.capacity(),
            accepted: self.sink.accepted_count(),
            dropped: self.sink.dropped_count(),
        }
    }

    pub fn build_status(&self) -> StatusReport {
        let now = Utc::now();
        let cadences = Cadence::ALL
            .into_iter()
            .map(|c| CadenceStatus {
                cadence: c,
                interval_ms: c.interval(&self.config.scheduler).as_millis() as u64,
                run: self.cadence_run(c),
                overdue: self.is_overdue(c, now),
            })
            .collect();

        StatusReport {
            state_version: self.current_state_version(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            generated_at: now,
            cadences,
            regime: self.regime.read().current().clone(),
            parameters: self.parameters.snapshot(),
            exploration_rate: self.bandit.exploration_rate(),
            circuit_breaker: self.risk.check_circuit_breaker(),
            risk: self.risk.last_state(),
            performance: self.performance.all(),
            totals: self.performance.totals(),
            queue: self.queue_status(),
            active_alerts: self.active_alerts(),
            recent_optimizations: self.recent_optimizations(STATUS_RECENT_OPTIMIZATIONS),
            recent_errors: self.recent_errors(),
            recommendation: self.current_recommendation(),
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("strategies", &self.config.strategies)
            .field("state_version", &self.current_state_version())
            .field("pending", &self.sink.len())
            .finish()
    }
}
