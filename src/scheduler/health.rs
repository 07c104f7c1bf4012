// =============================================================================
// Health Check — overdue cadences, degrading trends, breaker state
// =============================================================================
//
// Runs on its own interval (default 5 min).  Each pass rebuilds the full
// active alert list from scratch:
//
//   cadence_overdue          last tick older than 2x the cadence interval
//   declining_success_rate   strictly falling over the last 5 records (>= 3)
//   declining_profit         same, on mean profit
//   low_success_rate         overall success < 0.6 with > 50 executions
//   circuit_breaker          risk gate tripped
// =============================================================================

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::engine::Engine;
use crate::recommendation::{Alert, AlertLevel};

const TREND_WINDOW: usize = 5;
const MIN_TREND_POINTS: usize = 3;
const LOW_SUCCESS_MIN_EXECUTIONS: u64 = 50;
const LOW_SUCCESS_RATE: f64 = 0.6;
const EXCELLENT_SUCCESS_RATE: f64 = 0.95;

/// True when `values` has at least three points and every point is strictly
/// below the one before it.
pub fn strictly_declining(values: &[f64]) -> bool {
    values.len() >= MIN_TREND_POINTS && values.windows(2).all(|w| w[0] > w[1])
}

/// Evaluate every health rule against the engine at `now`.
pub fn evaluate(engine: &Engine, now: DateTime<Utc>) -> Vec<Alert> {
    let mut alerts = Vec::new();

    for cadence in engine.overdue_cadences(now) {
        alerts.push(Alert::new(
            AlertLevel::Warning,
            "cadence_overdue",
            format!("{cadence} optimization overdue"),
        ));
    }

    let records = engine.recent_optimizations(TREND_WINDOW);
    let success: Vec<f64> = records.iter().map(|r| r.success_rate()).collect();
    let profit: Vec<f64> = records.iter().map(|r| r.avg_profit()).collect();
    if strictly_declining(&success) {
        alerts.push(Alert::new(
            AlertLevel::Warning,
            "declining_success_rate",
            "Declining success rate trend detected",
        ));
    }
    if strictly_declining(&profit) {
        alerts.push(Alert::new(
            AlertLevel::Warning,
            "declining_profit",
            "Declining profit trend detected",
        ));
    }

    let totals = engine.performance().totals();
    if totals.executions > LOW_SUCCESS_MIN_EXECUTIONS {
        if totals.success_rate < LOW_SUCCESS_RATE {
            alerts.push(Alert::new(
                AlertLevel::Error,
                "low_success_rate",
                format!(
                    "Low overall success rate {:.1}% over {} executions",
                    totals.success_rate * 100.0,
                    totals.executions
                ),
            ));
        } else if totals.success_rate > EXCELLENT_SUCCESS_RATE {
            info!(
                success_rate = format!("{:.3}", totals.success_rate),
                "excellent performance across strategies"
            );
        }
    }

    let breaker = engine.risk().check_circuit_breaker();
    if breaker.tripped {
        alerts.push(Alert::new(
            AlertLevel::Critical,
            "circuit_breaker",
            format!("Circuit breaker tripped: {}", breaker.reason),
        ));
    }

    alerts
}

/// One pass of the health task: evaluate, log, publish.
pub fn run_health_check(engine: &Engine) -> Vec<Alert> {
    let alerts = evaluate(engine, Utc::now());
    for alert in &alerts {
        warn!(level = %alert.level, kind = %alert.kind, "{}", alert.message);
    }
    engine.replace_alerts(alerts.clone());
    alerts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::regime::MarketRegime;
    use crate::runtime_config::EngineConfig;
    use crate::scheduler::Cadence;
    use crate::types::{ExecutionResult, MarketConditions, PortfolioSnapshot};
    use chrono::Duration;

    fn engine() -> Engine {
        let mut config = EngineConfig::default();
        config.strategies = vec!["tri_arb".into(), "dex_arb".into()];
        Engine::new(config).unwrap()
    }

    fn submit(engine: &Engine, n: usize, profit: f64) {
        for _ in 0..n {
            engine
                .submit_result(ExecutionResult {
                    strategy_id: "tri_arb".into(),
                    timestamp: Utc::now(),
                    profit,
                    success: profit > 0.0,
                    execution_time_us: 700.0,
                    slippage: 0.0,
                    gas_used: 90_000,
                    market_regime: MarketRegime::Ranging,
                    market_conditions: MarketConditions::default(),
                })
                .unwrap();
        }
    }

    fn kinds(alerts: &[Alert]) -> Vec<&str> {
        alerts.iter().map(|a| a.kind.as_str()).collect()
    }

    #[test]
    fn declining_needs_three_strict_steps() {
        assert!(strictly_declining(&[0.9, 0.8, 0.7]));
        assert!(!strictly_declining(&[0.9, 0.8]));
        assert!(!strictly_declining(&[0.9, 0.8, 0.8]));
        assert!(!strictly_declining(&[0.7, 0.8, 0.6]));
    }

    #[test]
    fn fresh_engine_is_healthy() {
        let e = engine();
        assert!(evaluate(&e, e.started_at()).is_empty());
    }

    #[test]
    fn overdue_cadences_are_flagged() {
        let e = engine();
        let later = e.started_at() + Duration::minutes(5);
        let alerts = evaluate(&e, later);
        // continuous (60s) and fast (240s) are past 2x their interval
        assert_eq!(kinds(&alerts), vec!["cadence_overdue", "cadence_overdue"]);
        assert!(alerts[0].message.starts_with("continuous"));
    }

    #[test]
    fn declining_profit_across_records() {
        let e = engine();
        for profit in [3.0, 2.0, 1.0] {
            submit(&e, 4, profit);
            e.run_cycle(Cadence::Fast).unwrap();
        }
        let alerts = evaluate(&e, Utc::now());
        assert!(kinds(&alerts).contains(&"declining_profit"));
        assert!(!kinds(&alerts).contains(&"declining_success_rate"));
    }

    #[test]
    fn low_overall_success_is_an_error() {
        let e = engine();
        submit(&e, 60, -1.0);
        for _ in 0..6 {
            e.run_cycle(Cadence::Continuous).unwrap();
        }
        let alerts = evaluate(&e, Utc::now());
        let low = alerts.iter().find(|a| a.kind == "low_success_rate").unwrap();
        assert_eq!(low.level, AlertLevel::Error);
    }

    #[test]
    fn tripped_breaker_is_critical_and_published() {
        let e = engine();
        let t0 = Utc::now();
        e.observe_portfolio(PortfolioSnapshot { timestamp: t0, total_value: 1_000.0 })
            .unwrap();
        e.observe_portfolio(PortfolioSnapshot {
            timestamp: t0 + Duration::seconds(10),
            total_value: 900.0,
        })
        .unwrap();

        let alerts = run_health_check(&e);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].level, AlertLevel::Critical);
        assert_eq!(e.active_alerts(), alerts);
        assert_eq!(e.alert_history(10).len(), 1);

        // a second pass replaces the active list but keeps history growing
        run_health_check(&e);
        assert_eq!(e.active_alerts().len(), 1);
        assert_eq!(e.alert_history(10).len(), 2);
    }
}
