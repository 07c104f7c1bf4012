// =============================================================================
// Published Records — what the engine tells the executor and the operator
// =============================================================================
//
//   CurrentRecommendation  point-in-time snapshot published after every tick
//   OptimizationRecord     audit entry of one fast/medium/slow tick
//   Alert                  health or risk condition raised for the operator
//
// All records are plain serde structs; the executor is expected to treat a
// recommendation as the latest state, not as a stream to replay.
// =============================================================================

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::analysis::{BatchSummary, ComprehensiveAnalysis, DeepAnalysis};
use crate::parameters::ParameterSet;
use crate::regime::MarketRegime;
use crate::scheduler::Cadence;

/// The engine's current advice to the executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentRecommendation {
    /// Unique identifier (UUID v4).
    pub id: String,

    pub strategy_id: String,

    pub regime: MarketRegime,
    pub regime_confidence: f64,

    pub parameters: ParameterSet,

    /// Regime-conditioned weights, summing to 1.
    pub strategy_weights: BTreeMap<String, f64>,

    /// False while the circuit breaker is tripped.
    pub risk_gate_open: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub risk_gate_reason: Option<String>,

    /// Multiplier the executor should apply to `max_position_size`.
    pub max_position_scalar: f64,

    /// The tick that produced this snapshot.
    pub cadence: Cadence,

    pub generated_at: DateTime<Utc>,
}

/// Analysis attached to an optimization record, by depth.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "depth", rename_all = "snake_case")]
pub enum CycleAnalysis {
    Summary(BatchSummary),
    Comprehensive(ComprehensiveAnalysis),
    Deep(Box<DeepAnalysis>),
}

/// Audit entry of one fast/medium/slow tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptimizationRecord {
    pub id: String,
    pub cadence: Cadence,
    pub timestamp: DateTime<Utc>,
    pub regime: MarketRegime,
    /// Results drained by the tick.
    pub batch_size: usize,
    pub strategy_weights: BTreeMap<String, f64>,
    pub parameters: ParameterSet,
    pub analysis: CycleAnalysis,
    pub confidence: f64,
    pub recommendations: Vec<String>,
}

impl OptimizationRecord {
    /// Success rate of the batch behind this record.
    pub fn success_rate(&self) -> f64 {
        self.summary().success_rate
    }

    pub fn avg_profit(&self) -> f64 {
        self.summary().avg_profit
    }

    pub fn summary(&self) -> &BatchSummary {
        match &self.analysis {
            CycleAnalysis::Summary(s) => s,
            CycleAnalysis::Comprehensive(c) => &c.summary,
            CycleAnalysis::Deep(d) => &d.comprehensive.summary,
        }
    }
}

// =============================================================================
// Alerts
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertLevel {
    Info,
    Warning,
    Error,
    Critical,
}

impl std::fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Info => write!(f, "INFO"),
            Self::Warning => write!(f, "WARNING"),
            Self::Error => write!(f, "ERROR"),
            Self::Critical => write!(f, "CRITICAL"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub id: String,
    pub level: AlertLevel,
    /// Machine-readable kind, e.g. "cadence_overdue".
    pub kind: String,
    pub message: String,
    pub raised_at: DateTime<Utc>,
}

impl Alert {
    pub fn new(level: AlertLevel, kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            level,
            kind: kind.into(),
            message: message.into(),
            raised_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::summarize;

    #[test]
    fn record_exposes_its_batch_summary() {
        let record = OptimizationRecord {
            id: "r1".into(),
            cadence: Cadence::Fast,
            timestamp: Utc::now(),
            regime: MarketRegime::Neutral,
            batch_size: 0,
            strategy_weights: BTreeMap::new(),
            parameters: ParameterSet::default(),
            analysis: CycleAnalysis::Summary(summarize(&[])),
            confidence: 0.8,
            recommendations: vec![],
        };
        assert_eq!(record.success_rate(), 0.0);
        assert_eq!(record.avg_profit(), 0.0);

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["analysis"]["depth"], "summary");
        assert_eq!(json["cadence"], "fast");
    }

    #[test]
    fn alert_levels_order_by_severity() {
        assert!(AlertLevel::Critical > AlertLevel::Warning);
        assert_eq!(AlertLevel::Error.to_string(), "ERROR");
        let a = Alert::new(AlertLevel::Warning, "cadence_overdue", "fast overdue");
        assert_eq!(a.id.len(), 36);
    }
}
