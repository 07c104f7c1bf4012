// =============================================================================
// Performance Tracker — per-strategy execution accounting
// =============================================================================
//
// One PerformanceMetrics accumulator per configured strategy, updated on every
// drained ExecutionResult.  Ratios that need a history (Sharpe, drawdown,
// profit factor) are only recomputed once a strategy has more than ten
// executions; before that they stay at their neutral values.
//
// Accumulators are never reset implicitly.  `reset` / `reset_all` are the
// operator actions exposed through the control API.
// =============================================================================

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{EngineError, EngineResult};
use crate::stats::{max_relative_drawdown, mean, std_dev};
use crate::types::ExecutionResult;

/// Entries retained per strategy for the trailing ratios.
pub const PERFORMANCE_HISTORY: usize = 1000;
/// Trailing window of the Sharpe ratio.
const SHARPE_WINDOW: usize = 50;
/// Executions required before trailing ratios are computed.
const MIN_EXECUTIONS_FOR_RATIOS: u64 = 10;

/// Running performance of one strategy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub strategy_id: String,
    pub total_executions: u64,
    pub successful_executions: u64,
    /// Sum of profits of successful executions.
    pub total_profit: f64,
    /// Sum of |profit| of failed executions.
    pub total_loss: f64,
    pub avg_profit_per_trade: f64,
    pub win_rate: f64,
    pub avg_execution_time_us: f64,
    pub avg_slippage: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown: f64,
    /// `None` while the strategy has no recorded losses.
    pub profit_factor: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<DateTime<Utc>>,
    /// Trailing profits, newest last.
    #[serde(skip)]
    history: VecDeque<f64>,
}

impl PerformanceMetrics {
    pub fn new(strategy_id: impl Into<String>) -> Self {
        Self {
            strategy_id: strategy_id.into(),
            total_executions: 0,
            successful_executions: 0,
            total_profit: 0.0,
            total_loss: 0.0,
            avg_profit_per_trade: 0.0,
            win_rate: 0.0,
            avg_execution_time_us: 0.0,
            avg_slippage: 0.0,
            sharpe_ratio: 0.0,
            max_drawdown: 0.0,
            profit_factor: None,
            last_updated: None,
            history: VecDeque::new(),
        }
    }

    pub fn net_profit(&self) -> f64 {
        self.total_profit - self.total_loss
    }

    pub fn history_len(&self) -> usize {
        self.history.len()
    }

    fn record(&mut self, result: &ExecutionResult) {
        self.total_executions += 1;
        let n = self.total_executions as f64;

        if result.success {
            self.successful_executions += 1;
            self.total_profit += result.profit;
        } else {
            self.total_loss += result.profit.abs();
        }

        self.avg_profit_per_trade = self.total_profit / n;
        self.win_rate = self.successful_executions as f64 / n;
        self.avg_execution_time_us += (result.execution_time_us - self.avg_execution_time_us) / n;
        self.avg_slippage += (result.slippage - self.avg_slippage) / n;

        self.history.push_back(result.profit);
        while self.history.len() > PERFORMANCE_HISTORY {
            self.history.pop_front();
        }

        if self.total_executions > MIN_EXECUTIONS_FOR_RATIOS {
            self.recompute_ratios();
        }
        self.last_updated = Some(Utc::now());
    }

    fn recompute_ratios(&mut self) {
        let profits: Vec<f64> = self.history.iter().copied().collect();

        let recent = &profits[profits.len().saturating_sub(SHARPE_WINDOW)..];
        let sd = std_dev(recent);
        self.sharpe_ratio = if sd > 0.0 { mean(recent) / sd } else { 0.0 };

        self.max_drawdown = max_relative_drawdown(&profits);

        self.profit_factor = if self.total_loss > 0.0 {
            Some(self.total_profit / self.total_loss)
        } else {
            None
        };
    }
}

/// Aggregate over every tracked strategy.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceTotals {
    pub executions: u64,
    pub successes: u64,
    pub success_rate: f64,
    pub net_profit: f64,
}

// =============================================================================
// Tracker
// =============================================================================

pub struct PerformanceTracker {
    metrics: RwLock<BTreeMap<String, PerformanceMetrics>>,
}

impl PerformanceTracker {
    pub fn new(strategies: &[String]) -> Self {
        let metrics = strategies
            .iter()
            .map(|id| (id.clone(), PerformanceMetrics::new(id.clone())))
            .collect();
        Self {
            metrics: RwLock::new(metrics),
        }
    }

    /// Fold one execution into its strategy's accumulator.
    pub fn record(&self, result: &ExecutionResult) -> EngineResult<()> {
        let mut metrics = self.metrics.write();
        let entry = metrics
            .get_mut(&result.strategy_id)
            .ok_or_else(|| EngineError::UnknownStrategy(result.strategy_id.clone()))?;
        entry.record(result);

        debug!(
            strategy = %result.strategy_id,
            executions = entry.total_executions,
            win_rate = format!("{:.3}", entry.win_rate),
            "performance updated"
        );
        Ok(())
    }

    pub fn get(&self, strategy_id: &str) -> Option<PerformanceMetrics> {
        self.metrics.read().get(strategy_id).cloned()
    }

    pub fn all(&self) -> Vec<PerformanceMetrics> {
        self.metrics.read().values().cloned().collect()
    }

    pub fn totals(&self) -> PerformanceTotals {
        let metrics = self.metrics.read();
        let mut totals = PerformanceTotals::default();
        for m in metrics.values() {
            totals.executions += m.total_executions;
            totals.successes += m.successful_executions;
            totals.net_profit += m.net_profit();
        }
        if totals.executions > 0 {
            totals.success_rate = totals.successes as f64 / totals.executions as f64;
        }
        totals
    }

    pub fn reset(&self, strategy_id: &str) -> EngineResult<()> {
        let mut metrics = self.metrics.write();
        let entry = metrics
            .get_mut(strategy_id)
            .ok_or_else(|| EngineError::UnknownStrategy(strategy_id.to_string()))?;
        *entry = PerformanceMetrics::new(strategy_id);
        info!(strategy = %strategy_id, "performance metrics reset");
        Ok(())
    }

    pub fn reset_all(&self) {
        let mut metrics = self.metrics.write();
        for (id, entry) in metrics.iter_mut() {
            *entry = PerformanceMetrics::new(id.clone());
        }
        info!(strategies = metrics.len(), "all performance metrics reset");
    }
}
