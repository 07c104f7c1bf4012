// =============================================================================
// Drawdown Tracker — peak/trough events over the portfolio value series
// =============================================================================
//
// A running peak is maintained over every accepted portfolio value.  While the
// value sits below the peak an active drawdown event exists; it records the
// trough and is closed (recovered) at the first value >= its peak, then moved
// to the completed history.
//
// Severity bands on the event's peak-to-trough percentage (upper bounds
// inclusive, configurable):
//
//   <= 5   NORMAL      <= 10  MODERATE     <= 20  SEVERE
//   <= 50  CRITICAL     > 50  CATASTROPHIC
// =============================================================================

use std::collections::VecDeque;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{EngineError, EngineResult};
use crate::runtime_config::RiskConfig;

/// Completed events retained for recovery statistics.
const MAX_COMPLETED_EVENTS: usize = 200;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownSeverity {
    Normal,
    Moderate,
    Severe,
    Critical,
    Catastrophic,
}

impl DrawdownSeverity {
    pub fn classify(pct: f64, bands: &[f64; 4]) -> Self {
        if pct <= bands[0] {
            Self::Normal
        } else if pct <= bands[1] {
            Self::Moderate
        } else if pct <= bands[2] {
            Self::Severe
        } else if pct <= bands[3] {
            Self::Critical
        } else {
            Self::Catastrophic
        }
    }

    /// Share of the configured position size the executor may still use.
    pub fn position_scalar(self) -> f64 {
        match self {
            Self::Normal => 1.0,
            Self::Moderate => 0.75,
            Self::Severe => 0.5,
            Self::Critical => 0.25,
            Self::Catastrophic => 0.0,
        }
    }

    fn recovery_adjustment(self) -> f64 {
        match self {
            Self::Severe => 1.5,
            Self::Critical => 2.0,
            _ => 1.0,
        }
    }
}

impl std::fmt::Display for DrawdownSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Normal => write!(f, "NORMAL"),
            Self::Moderate => write!(f, "MODERATE"),
            Self::Severe => write!(f, "SEVERE"),
            Self::Critical => write!(f, "CRITICAL"),
            Self::Catastrophic => write!(f, "CATASTROPHIC"),
        }
    }
}

/// One peak-to-recovery episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownEvent {
    pub peak_value: f64,
    pub peak_at: DateTime<Utc>,
    pub trough_value: f64,
    pub trough_at: DateTime<Utc>,
    /// Peak-to-trough percentage.
    pub drawdown_pct: f64,
    pub severity: DrawdownSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovered_at: Option<DateTime<Utc>>,
}

impl DrawdownEvent {
    fn open(peak_value: f64, peak_at: DateTime<Utc>) -> Self {
        Self {
            peak_value,
            peak_at,
            trough_value: peak_value,
            trough_at: peak_at,
            drawdown_pct: 0.0,
            severity: DrawdownSeverity::Normal,
            recovered_at: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.recovered_at.is_none()
    }

    /// Time from trough to recovery, once recovered.
    pub fn recovery_time(&self) -> Option<Duration> {
        self.recovered_at.map(|r| r - self.trough_at)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrawdownAlertKind {
    LimitBreach,
    AbsoluteLossLimit,
    SlowRecovery,
}

/// Alert raised while updating the series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DrawdownAlert {
    pub kind: DrawdownAlertKind,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

// ---------------------------------------------------------------------------
// DrawdownTracker
// ---------------------------------------------------------------------------

pub struct DrawdownTracker {
    max_drawdown_limit: f64,
    absolute_loss_limit: f64,
    slow_recovery: Duration,
    severity_bands: [f64; 4],
    capacity: usize,
    values: VecDeque<(DateTime<Utc>, f64)>,
    peak: Option<(DateTime<Utc>, f64)>,
    active: Option<DrawdownEvent>,
    completed: VecDeque<DrawdownEvent>,
    max_drawdown_pct: f64,
}

impl DrawdownTracker {
    pub fn new(config: &RiskConfig) -> Self {
        Self {
            max_drawdown_limit: config.max_drawdown_pct,
            absolute_loss_limit: config.absolute_loss_limit,
            slow_recovery: Duration::days(config.slow_recovery_alert_days),
            severity_bands: config.severity_bands,
            capacity: config.portfolio_history.max(2),
            values: VecDeque::new(),
            peak: None,
            active: None,
            completed: VecDeque::new(),
            max_drawdown_pct: 0.0,
        }
    }

    /// Feed one portfolio value.  Non-positive or non-finite values are
    /// rejected without touching any state.
    pub fn update(&mut self, timestamp: DateTime<Utc>, value: f64) -> EngineResult<Vec<DrawdownAlert>> {
        if !value.is_finite() || value <= 0.0 {
            return Err(EngineError::InvalidPortfolioValue(value));
        }

        self.values.push_back((timestamp, value));
        while self.values.len() > self.capacity {
            self.values.pop_front();
        }

        let (peak_at, peak_value) = match self.peak {
            Some(p) => p,
            None => {
                self.peak = Some((timestamp, value));
                return Ok(Vec::new());
            }
        };

        if value >= peak_value {
            if let Some(mut event) = self.active.take() {
                event.recovered_at = Some(timestamp);
                info!(
                    peak = event.peak_value,
                    trough = event.trough_value,
                    drawdown_pct = format!("{:.2}", event.drawdown_pct),
                    severity = %event.severity,
                    "drawdown recovered"
                );
                self.completed.push_back(event);
                while self.completed.len() > MAX_COMPLETED_EVENTS {
                    self.completed.pop_front();
                }
            }
            self.peak = Some((timestamp, value));
            return Ok(Vec::new());
        }

        let bands = self.severity_bands;
        let event = self.active.get_or_insert_with(|| {
            warn!(
                peak = peak_value,
                current = value,
                "drawdown event started"
            );
            DrawdownEvent::open(peak_value, peak_at)
        });
        if value < event.trough_value {
            event.trough_value = value;
            event.trough_at = timestamp;
        }
        event.drawdown_pct = (event.peak_value - event.trough_value) / event.peak_value * 100.0;
        event.severity = DrawdownSeverity::classify(event.drawdown_pct, &bands);

        if event.drawdown_pct > self.max_drawdown_pct {
            self.max_drawdown_pct = event.drawdown_pct;
        }

        Ok(self.check_alerts(timestamp, value))
    }

    fn check_alerts(&self, timestamp: DateTime<Utc>, value: f64) -> Vec<DrawdownAlert> {
        let Some(event) = &self.active else {
            return Vec::new();
        };
        let mut alerts = Vec::new();

        let current_pct = (event.peak_value - value) / event.peak_value * 100.0;
        if current_pct > self.max_drawdown_limit {
            alerts.push(DrawdownAlert {
                kind: DrawdownAlertKind::LimitBreach,
                timestamp,
                message: format!(
                    "drawdown {current_pct:.2}% exceeds limit {:.2}%",
                    self.max_drawdown_limit
                ),
            });
        }

        let loss = event.peak_value - value;
        if loss > self.absolute_loss_limit {
            warn!(loss, limit = self.absolute_loss_limit, "absolute loss limit breached");
            alerts.push(DrawdownAlert {
                kind: DrawdownAlertKind::AbsoluteLossLimit,
                timestamp,
                message: format!(
                    "loss from peak {loss:.2} exceeds limit {:.2}",
                    self.absolute_loss_limit
                ),
            });
        }

        let duration = timestamp - event.peak_at;
        if duration > self.slow_recovery {
            warn!(duration_days = duration.num_days(), "slow drawdown recovery");
            alerts.push(DrawdownAlert {
                kind: DrawdownAlertKind::SlowRecovery,
                timestamp,
                message: format!("drawdown active for {} days", duration.num_days()),
            });
        }
        alerts
    }

    pub fn active_event(&self) -> Option<&DrawdownEvent> {
        self.active.as_ref()
    }

    pub fn completed_events(&self) -> impl Iterator<Item = &DrawdownEvent> {
        self.completed.iter()
    }

    /// Drawdown of the latest value against the running peak, in percent.
    pub fn current_drawdown_pct(&self) -> f64 {
        match (self.peak, self.values.back()) {
            (Some((_, peak)), Some((_, last))) if *last < peak => (peak - last) / peak * 100.0,
            _ => 0.0,
        }
    }

    /// Largest peak-to-trough drawdown seen so far, in percent.
    pub fn max_drawdown_pct(&self) -> f64 {
        self.max_drawdown_pct
    }

    /// Age of the active event measured to the latest observation.
    pub fn active_duration(&self) -> Option<Duration> {
        let event = self.active.as_ref()?;
        let (last, _) = self.values.back()?;
        Some(*last - event.peak_at)
    }

    pub fn average_recovery_time(&self) -> Option<Duration> {
        let times: Vec<Duration> = self
            .completed
            .iter()
            .filter_map(DrawdownEvent::recovery_time)
            .collect();
        if times.is_empty() {
            return None;
        }
        let total_ms: i64 = times.iter().map(Duration::num_milliseconds).sum();
        Some(Duration::milliseconds(total_ms / times.len() as i64))
    }

    /// Historical average recovery time scaled by the active event's
    /// severity.
    pub fn estimate_recovery_time(&self) -> Option<Duration> {
        let event = self.active.as_ref()?;
        let average = self.average_recovery_time()?;
        let scaled = average.num_milliseconds() as f64 * event.severity.recovery_adjustment();
        Some(Duration::milliseconds(scaled as i64))
    }

    pub fn values(&self) -> impl Iterator<Item = &(DateTime<Utc>, f64)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<DateTime<Utc>> {
        self.values.back().map(|(ts, _)| *ts)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn feed(tracker: &mut DrawdownTracker, values: &[f64]) -> Vec<DateTime<Utc>> {
        let start = Utc::now();
        values
            .iter()
            .enumerate()
            .map(|(i, v)| {
                let ts = start + Duration::hours(i as i64);
                tracker.update(ts, *v).unwrap();
                ts
            })
            .collect()
    }

    #[test]
    fn peak_trough_recovery() {
        let mut tracker = DrawdownTracker::new(&RiskConfig::default());
        let stamps = feed(&mut tracker, &[100.0, 95.0, 90.0, 85.0, 90.0, 95.0, 100.0]);

        assert!((tracker.max_drawdown_pct() - 15.0).abs() < 1e-9);
        assert!(tracker.active_event().is_none());

        let events: Vec<_> = tracker.completed_events().collect();
        assert_eq!(events.len(), 1);
        let event = events[0];
        assert_eq!(event.peak_value, 100.0);
        assert_eq!(event.trough_value, 85.0);
        assert_eq!(event.trough_at, stamps[3]);
        assert_eq!(event.recovered_at, Some(stamps[6]));
        assert_eq!(event.severity, DrawdownSeverity::Severe);
        assert_eq!(event.recovery_time(), Some(Duration::hours(3)));
    }

    #[test]
    fn active_event_tracks_current_and_trough() {
        let mut tracker = DrawdownTracker::new(&RiskConfig::default());
        feed(&mut tracker, &[200.0, 180.0, 190.0]);

        let event = tracker.active_event().unwrap();
        assert!((event.drawdown_pct - 10.0).abs() < 1e-9);
        assert_eq!(event.severity, DrawdownSeverity::Moderate);
        assert!((tracker.current_drawdown_pct() - 5.0).abs() < 1e-9);
        assert_eq!(tracker.active_duration(), Some(Duration::hours(2)));
    }

    #[test]
    fn invalid_values_are_rejected() {
        let mut tracker = DrawdownTracker::new(&RiskConfig::default());
        assert_eq!(
            tracker.update(Utc::now(), 0.0),
            Err(EngineError::InvalidPortfolioValue(0.0))
        );
        assert!(tracker.update(Utc::now(), f64::INFINITY).is_err());
        assert!(tracker.update(Utc::now(), -5.0).is_err());
        assert!(tracker.is_empty());
    }

    #[test]
    fn severity_bands() {
        let bands = [5.0, 10.0, 20.0, 50.0];
        assert_eq!(DrawdownSeverity::classify(5.0, &bands), DrawdownSeverity::Normal);
        assert_eq!(DrawdownSeverity::classify(7.0, &bands), DrawdownSeverity::Moderate);
        assert_eq!(DrawdownSeverity::classify(20.0, &bands), DrawdownSeverity::Severe);
        assert_eq!(DrawdownSeverity::classify(49.0, &bands), DrawdownSeverity::Critical);
        assert_eq!(DrawdownSeverity::classify(60.0, &bands), DrawdownSeverity::Catastrophic);
    }

    #[test]
    fn limit_breach_raises_alert() {
        let mut tracker = DrawdownTracker::new(&RiskConfig::default());
        let now = Utc::now();
        tracker.update(now, 100.0).unwrap();
        let alerts = tracker.update(now + Duration::minutes(1), 97.0).unwrap();
        assert!(alerts.iter().any(|a| a.kind == DrawdownAlertKind::LimitBreach));

        let alerts = tracker.update(now + Duration::days(8), 99.0).unwrap();
        assert!(alerts.iter().any(|a| a.kind == DrawdownAlertKind::SlowRecovery));
    }

    #[test]
    fn recovery_estimate_scales_with_severity() {
        let mut tracker = DrawdownTracker::new(&RiskConfig::default());
        // One completed event: trough at h1, recovered at h3 -> 2h.
        feed(&mut tracker, &[100.0, 90.0, 95.0, 100.0]);
        assert_eq!(tracker.average_recovery_time(), Some(Duration::hours(2)));
        assert!(tracker.estimate_recovery_time().is_none());

        let now = Utc::now() + Duration::days(1);
        tracker.update(now, 85.0).unwrap();
        // 15% -> severe -> x1.5
        assert_eq!(tracker.estimate_recovery_time(), Some(Duration::hours(3)));
    }
}
