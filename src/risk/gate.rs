// =============================================================================
// Risk Gate — drawdown + VaR circuit breaker
// =============================================================================
//
// Circuit breaker trips when either:
//   1. Drawdown:      the active event's peak-to-trough percentage exceeds
//                     `max_drawdown_pct`.
//   2. Slow recovery: the active event has lasted longer than the recovery
//                     target window (measured to the latest observation).
//
// `check_circuit_breaker` is a pure read.  Breaker transitions are detected
// and logged on the write path (`update_portfolio_value`).
//
// `evaluate` recomputes the full RiskState from the series: drawdown, VaR and
// CVaR at every configured confidence, return moments and the position
// scalar.  Every figure is validated before the state is stored.
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::EngineResult;
use crate::risk::drawdown::{DrawdownAlert, DrawdownEvent, DrawdownSeverity, DrawdownTracker};
use crate::risk::var::{self, ReturnStats, VarBacktest, VarMethod};
use crate::runtime_config::RiskConfig;

const MAX_RISK_ALERTS: usize = 200;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircuitBreakerStatus {
    pub tripped: bool,
    pub reason: String,
}

/// A VaR figure with the number of return observations behind it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarEstimate {
    pub confidence: f64,
    pub method: VarMethod,
    pub value: f64,
    pub sample_count: usize,
    /// True when fewer than the minimum observations were available and
    /// `value` is a placeholder zero.
    pub insufficient_data: bool,
}

/// VaR and CVaR at one confidence level.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VarLevel {
    pub confidence: f64,
    pub var: f64,
    pub cvar: f64,
}

/// Full snapshot of the risk gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskState {
    pub current_drawdown_pct: f64,
    pub max_drawdown_pct: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub severity: Option<DrawdownSeverity>,
    pub var_levels: Vec<VarLevel>,
    pub stats: ReturnStats,
    /// Return observations behind the VaR figures.
    pub sample_count: usize,
    pub insufficient_data: bool,
    pub circuit_breaker: CircuitBreakerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_breach_at: Option<DateTime<Utc>>,
    pub max_position_scalar: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_recovery_secs: Option<i64>,
    pub evaluated_at: DateTime<Utc>,
}

impl RiskState {
    pub fn var_at(&self, confidence: f64) -> Option<&VarLevel> {
        self.var_levels
            .iter()
            .find(|l| (l.confidence - confidence).abs() < 1e-9)
    }
}

// ---------------------------------------------------------------------------
// Internal mutable state (behind RwLock)
// ---------------------------------------------------------------------------

struct Inner {
    drawdown: DrawdownTracker,
    breaker_tripped: bool,
    last_breach_at: Option<DateTime<Utc>>,
    alerts: VecDeque<DrawdownAlert>,
    last_state: Option<RiskState>,
}

// ---------------------------------------------------------------------------
// Risk Gate
// ---------------------------------------------------------------------------

pub struct RiskGate {
    config: RiskConfig,
    state: RwLock<Inner>,
}

impl RiskGate {
    pub fn new(config: RiskConfig) -> Self {
        info!(
            max_drawdown_pct = config.max_drawdown_pct,
            recovery_target_days = config.recovery_target_days,
            var_levels = ?config.var_confidence_levels,
            "RiskGate initialised"
        );
        Self {
            state: RwLock::new(Inner {
                drawdown: DrawdownTracker::new(&config),
                breaker_tripped: false,
                last_breach_at: None,
                alerts: VecDeque::new(),
                last_state: None,
            }),
            config,
        }
    }

    /// Append one portfolio value and update the breaker.
    pub fn update_portfolio_value(&self, timestamp: DateTime<Utc>, value: f64) -> EngineResult<()> {
        let mut s = self.state.write();
        let alerts = s.drawdown.update(timestamp, value)?;
        for alert in alerts {
            s.alerts.push_back(alert);
        }
        while s.alerts.len() > MAX_RISK_ALERTS {
            s.alerts.pop_front();
        }

        let status = self.breaker_status(&s.drawdown);
        if status.tripped && !s.breaker_tripped {
            warn!(reason = %status.reason, value, "circuit breaker TRIPPED");
            s.last_breach_at = Some(timestamp);
        } else if !status.tripped && s.breaker_tripped {
            info!(value, "circuit breaker reset");
        }
        s.breaker_tripped = status.tripped;
        Ok(())
    }

    /// Breaker state derived from the current series.  No side effects.
    pub fn check_circuit_breaker(&self) -> CircuitBreakerStatus {
        self.breaker_status(&self.state.read().drawdown)
    }

    fn breaker_status(&self, drawdown: &DrawdownTracker) -> CircuitBreakerStatus {
        let Some(event) = drawdown.active_event() else {
            return CircuitBreakerStatus {
                tripped: false,
                reason: "no active drawdown".to_string(),
            };
        };

        if event.drawdown_pct > self.config.max_drawdown_pct {
            return CircuitBreakerStatus {
                tripped: true,
                reason: format!(
                    "drawdown {:.2}% exceeds limit {:.2}%",
                    event.drawdown_pct, self.config.max_drawdown_pct
                ),
            };
        }

        let target = Duration::days(self.config.recovery_target_days);
        if drawdown.active_duration().is_some_and(|d| d > target) {
            return CircuitBreakerStatus {
                tripped: true,
                reason: format!(
                    "recovery taking longer than {} days",
                    self.config.recovery_target_days
                ),
            };
        }

        CircuitBreakerStatus {
            tripped: false,
            reason: format!("drawdown {:.2}% within limits", event.drawdown_pct),
        }
    }

    fn returns(&self) -> Vec<f64> {
        let s = self.state.read();
        let values: Vec<f64> = s.drawdown.values().map(|(_, v)| *v).collect();
        var::percent_returns(&values)
    }

    /// VaR of the portfolio return series.  Fewer than the minimum
    /// observations yields a zero flagged as insufficient.
    pub fn calculate_var(&self, confidence: f64, method: VarMethod) -> EngineResult<VarEstimate> {
        var::validate_confidence(confidence)?;
        let returns = self.returns();
        let sample_count = returns.len();

        if sample_count < self.config.min_var_observations {
            return Ok(VarEstimate {
                confidence,
                method,
                value: 0.0,
                sample_count,
                insufficient_data: true,
            });
        }

        let value = var::var(&returns, confidence, method)?;
        var::validate_metric("var", value, Some(100.0))?;
        Ok(VarEstimate {
            confidence,
            method,
            value,
            sample_count,
            insufficient_data: false,
        })
    }

    pub fn calculate_cvar(&self, confidence: f64) -> EngineResult<VarEstimate> {
        var::validate_confidence(confidence)?;
        let returns = self.returns();
        let sample_count = returns.len();

        if sample_count < self.config.min_var_observations {
            return Ok(VarEstimate {
                confidence,
                method: VarMethod::Historical,
                value: 0.0,
                sample_count,
                insufficient_data: true,
            });
        }

        let value = var::cvar(&returns, confidence)?;
        var::validate_metric("cvar", value, None)?;
        Ok(VarEstimate {
            confidence,
            method: VarMethod::Historical,
            value,
            sample_count,
            insufficient_data: false,
        })
    }

    /// Kupiec POF backtest over the stored series.
    pub fn backtest_var(&self, confidence: f64) -> EngineResult<VarBacktest> {
        var::validate_confidence(confidence)?;
        let returns = self.returns();
        if returns.len() < self.config.min_var_observations {
            return Ok(VarBacktest::insufficient(confidence, returns.len()));
        }
        var::backtest_var_on_returns(&returns, confidence)
    }

    /// Recompute and validate the full risk state, then store it.
    pub fn evaluate(&self) -> EngineResult<RiskState> {
        for &c in &self.config.var_confidence_levels {
            var::validate_confidence(c)?;
        }

        let (values, current_dd, max_dd, severity, breaker, last_breach_at, recovery) = {
            let s = self.state.read();
            let values: Vec<f64> = s.drawdown.values().map(|(_, v)| *v).collect();
            (
                values,
                s.drawdown.current_drawdown_pct(),
                s.drawdown.max_drawdown_pct(),
                s.drawdown.active_event().map(|e| e.severity),
                self.breaker_status(&s.drawdown),
                s.last_breach_at,
                s.drawdown.estimate_recovery_time(),
            )
        };

        let returns = var::percent_returns(&values);
        let sample_count = returns.len();
        let insufficient_data = sample_count < self.config.min_var_observations;

        let mut var_levels = Vec::with_capacity(self.config.var_confidence_levels.len());
        let stats = if insufficient_data {
            for &confidence in &self.config.var_confidence_levels {
                var_levels.push(VarLevel {
                    confidence,
                    var: 0.0,
                    cvar: 0.0,
                });
            }
            ReturnStats::default()
        } else {
            for &confidence in &self.config.var_confidence_levels {
                let v = var::historical_var(&returns, confidence)?;
                let es = var::cvar(&returns, confidence)?;
                var::validate_metric("var", v, Some(100.0))?;
                var::validate_metric("cvar", es, None)?;
                var_levels.push(VarLevel {
                    confidence,
                    var: v,
                    cvar: es,
                });
            }
            var::return_stats(&returns)
        };

        var::validate_metric("volatility", stats.volatility, None)?;
        var::validate_metric("current_drawdown_pct", current_dd, Some(100.0))?;
        var::validate_metric("max_drawdown_pct", max_dd, Some(100.0))?;

        let max_position_scalar = if breaker.tripped {
            0.0
        } else {
            severity.unwrap_or(DrawdownSeverity::Normal).position_scalar()
        };

        let state = RiskState {
            current_drawdown_pct: current_dd,
            max_drawdown_pct: max_dd,
            severity,
            var_levels,
            stats,
            sample_count,
            insufficient_data,
            circuit_breaker: breaker,
            last_breach_at,
            max_position_scalar,
            estimated_recovery_secs: recovery.map(|d| d.num_seconds()),
            evaluated_at: Utc::now(),
        };

        debug!(
            drawdown = format!("{:.2}", current_dd),
            samples = sample_count,
            breaker = state.circuit_breaker.tripped,
            scalar = max_position_scalar,
            "risk state evaluated"
        );

        self.state.write().last_state = Some(state.clone());
        Ok(state)
    }

    /// Most recent successfully evaluated state.
    pub fn last_state(&self) -> Option<RiskState> {
        self.state.read().last_state.clone()
    }

    /// Whether cadences may grow `max_position_size`: breaker open and no
    /// drawdown worse than the normal band.
    pub fn allows_position_increase(&self) -> bool {
        let s = self.state.read();
        !self.breaker_status(&s.drawdown).tripped
            && s
                .drawdown
                .active_event()
                .map_or(true, |e| e.severity == DrawdownSeverity::Normal)
    }

    pub fn max_position_scalar(&self) -> f64 {
        let s = self.state.read();
        if self.breaker_status(&s.drawdown).tripped {
            return 0.0;
        }
        s.drawdown
            .active_event()
            .map_or(1.0, |e| e.severity.position_scalar())
    }

    pub fn active_drawdown(&self) -> Option<DrawdownEvent> {
        self.state.read().drawdown.active_event().cloned()
    }

    pub fn drawdown_history(&self, limit: usize) -> Vec<DrawdownEvent> {
        let s = self.state.read();
        let events: Vec<DrawdownEvent> = s.drawdown.completed_events().cloned().collect();
        let skip = events.len().saturating_sub(limit);
        events.into_iter().skip(skip).collect()
    }

    pub fn recent_alerts(&self, limit: usize) -> Vec<DrawdownAlert> {
        let s = self.state.read();
        let skip = s.alerts.len().saturating_sub(limit);
        s.alerts.iter().skip(skip).cloned().collect()
    }

    pub fn observation_count(&self) -> usize {
        self.state.read().drawdown.len()
    }
}

impl std::fmt::Debug for RiskGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = self.state.read();
        f.debug_struct("RiskGate")
            .field("observations", &s.drawdown.len())
            .field("current_drawdown_pct", &s.drawdown.current_drawdown_pct())
            .field("breaker_tripped", &s.breaker_tripped)
            .finish()
    }
}
