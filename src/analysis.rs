// =============================================================================
// Batch Analytics — what each cadence learns from its drained results
// =============================================================================
//
//   fast    summarize()          success rate, profit moments, best regime/strategy
//   medium  comprehensive()      + time trend, batch risk, per-regime stats,
//                                  optimization potential
//   slow    deep()               + quarter trend, correlations, seasonality,
//                                  long-term improvement, predictive insights
//
// All functions are pure over a slice of results.  Sections that need more
// data than the batch holds come back as `None` so callers can tell "not
// enough data" apart from a genuine zero.
// =============================================================================

use std::collections::BTreeMap;

use chrono::Timelike;
use serde::{Deserialize, Serialize};

use crate::regime::MarketRegime;
use crate::stats::{max_relative_drawdown, mean, pearson, percentile, std_dev};
use crate::types::ExecutionResult;

const MIN_TREND_RESULTS: usize = 10;
const MIN_CORRELATION_RESULTS: usize = 20;
const MIN_INSIGHT_RESULTS: usize = 30;
const MIN_SEASONALITY_RESULTS: usize = 50;
const MIN_LONG_TERM_RESULTS: usize = 100;

/// Size of the "recent" window used by the potential and insight checks.
const RECENT_WINDOW: usize = 20;
const MAX_MOVING_AVERAGE_WINDOW: usize = 20;
const VOLATILITY_EDGE: usize = 10;

// =============================================================================
// Summary (fast)
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_trades: usize,
    pub success_rate: f64,
    pub avg_profit: f64,
    pub profit_std: f64,
    /// Gross gains over gross losses; `None` when the batch has no losing trade.
    pub profit_factor: Option<f64>,
    pub regime_performance: BTreeMap<MarketRegime, f64>,
    pub strategy_performance: BTreeMap<String, f64>,
    pub best_regime: MarketRegime,
    pub best_strategy: String,
}

pub fn summarize(results: &[ExecutionResult]) -> BatchSummary {
    let profits = profits(results);
    let successes = results.iter().filter(|r| r.success).count();

    let gains: f64 = profits.iter().filter(|p| **p > 0.0).sum();
    let losses: f64 = profits.iter().filter(|p| **p < 0.0).sum();
    let has_losses = profits.iter().any(|p| *p < 0.0);

    let regime_performance = mean_by(results, |r| r.market_regime);
    let strategy_performance = mean_by(results, |r| r.strategy_id.clone());

    BatchSummary {
        total_trades: results.len(),
        success_rate: ratio(successes, results.len()),
        avg_profit: mean(&profits),
        profit_std: std_dev(&profits),
        profit_factor: has_losses.then(|| gains / losses.abs()),
        best_regime: first_max(&regime_performance).unwrap_or(MarketRegime::Neutral),
        best_strategy: first_max(&strategy_performance).unwrap_or_else(|| "unknown".to_string()),
        regime_performance,
        strategy_performance,
    }
}

// =============================================================================
// Comprehensive (medium)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Declining,
    Stable,
}

impl std::fmt::Display for TrendDirection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Improving => write!(f, "improving"),
            Self::Declining => write!(f, "declining"),
            Self::Stable => write!(f, "stable"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityTrend {
    Increasing,
    Decreasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeTrend {
    pub direction: TrendDirection,
    pub volatility_trend: VolatilityTrend,
    pub consistency_score: f64,
}

/// Risk statistics of the batch's own profit series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BatchRiskMetrics {
    /// 5th percentile of profits.
    pub var_95: f64,
    /// Relative drawdown of the cumulative profit curve.
    pub max_drawdown: f64,
    pub sharpe_ratio: f64,
    /// `None` when `var_95` is zero.
    pub risk_adjusted_return: Option<f64>,
    pub tail_ratio: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ConditionStats {
    pub avg_profit: f64,
    pub success_rate: f64,
    pub profit_std: f64,
    pub sample_size: usize,
}

/// Performance grouped by the regime active at execution time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionAnalysis {
    pub conditions: BTreeMap<MarketRegime, ConditionStats>,
    pub best_condition: Option<MarketRegime>,
    pub worst_condition: Option<MarketRegime>,
    pub performance_spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComprehensiveAnalysis {
    pub summary: BatchSummary,
    pub time_trend: Option<TimeTrend>,
    pub risk: Option<BatchRiskMetrics>,
    pub conditions: ConditionAnalysis,
    pub optimization_potential: f64,
}

pub fn comprehensive(results: &[ExecutionResult]) -> ComprehensiveAnalysis {
    ComprehensiveAnalysis {
        summary: summarize(results),
        time_trend: time_trend(results),
        risk: batch_risk(results),
        conditions: condition_analysis(results),
        optimization_potential: optimization_potential(results),
    }
}

pub fn time_trend(results: &[ExecutionResult]) -> Option<TimeTrend> {
    if results.len() < MIN_TREND_RESULTS {
        return None;
    }
    let p = profits(&chronological(results));
    let n = p.len();

    let window = MAX_MOVING_AVERAGE_WINDOW.min(n / 4);
    let direction = if window > 1 {
        let first = mean(&p[..window]);
        let last = mean(&p[n - window..]);
        if last > first {
            TrendDirection::Improving
        } else {
            TrendDirection::Declining
        }
    } else {
        TrendDirection::Stable
    };

    let volatility_trend = if std_dev(&p[n - VOLATILITY_EDGE..]) > std_dev(&p[..VOLATILITY_EDGE]) {
        VolatilityTrend::Increasing
    } else {
        VolatilityTrend::Decreasing
    };

    Some(TimeTrend {
        direction,
        volatility_trend,
        consistency_score: consistency(&p),
    })
}

pub fn batch_risk(results: &[ExecutionResult]) -> Option<BatchRiskMetrics> {
    if results.is_empty() {
        return None;
    }
    let p = profits(results);
    let avg = mean(&p);
    let sd = std_dev(&p);
    let var_95 = percentile(&p, 5.0);

    let p75 = percentile(&p, 75.0);
    let upper: Vec<f64> = p.iter().copied().filter(|v| *v > p75).collect();

    let (risk_adjusted_return, tail_ratio) = if var_95 != 0.0 {
        (Some(avg / var_95.abs()), mean(&upper) / var_95.abs())
    } else {
        (None, 0.0)
    };

    Some(BatchRiskMetrics {
        var_95,
        max_drawdown: max_relative_drawdown(&p),
        sharpe_ratio: if sd > 0.0 { avg / sd } else { 0.0 },
        risk_adjusted_return,
        tail_ratio,
    })
}

pub fn condition_analysis(results: &[ExecutionResult]) -> ConditionAnalysis {
    let mut grouped: BTreeMap<MarketRegime, Vec<f64>> = BTreeMap::new();
    for r in results {
        grouped.entry(r.market_regime).or_default().push(r.profit);
    }

    let conditions: BTreeMap<MarketRegime, ConditionStats> = grouped
        .into_iter()
        .map(|(regime, p)| {
            let wins = p.iter().filter(|v| **v > 0.0).count();
            let stats = ConditionStats {
                avg_profit: mean(&p),
                success_rate: ratio(wins, p.len()),
                profit_std: std_dev(&p),
                sample_size: p.len(),
            };
            (regime, stats)
        })
        .collect();

    let avgs: BTreeMap<MarketRegime, f64> =
        conditions.iter().map(|(k, s)| (*k, s.avg_profit)).collect();
    let best_condition = first_max(&avgs);
    let worst_condition = first_min(&avgs);
    let performance_spread = match (best_condition, worst_condition) {
        (Some(b), Some(w)) => avgs[&b] - avgs[&w],
        _ => 0.0,
    };

    ConditionAnalysis {
        conditions,
        best_condition,
        worst_condition,
        performance_spread,
    }
}

/// How much headroom the recent results show against the earlier ones, in
/// [0, 1].  0.5 means "unknown".
pub fn optimization_potential(results: &[ExecutionResult]) -> f64 {
    if results.len() < RECENT_WINDOW {
        return 0.5;
    }
    let p = profits(results);
    let split = p.len() - RECENT_WINDOW;
    let recent = mean(&p[split..]);
    let historical = if split > 0 { mean(&p[..split]) } else { recent };

    if historical > 0.0 {
        ((historical - recent) / historical).clamp(0.0, 1.0)
    } else {
        0.5
    }
}

// =============================================================================
// Deep (slow)
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PeriodPerformance {
    pub avg_profit: f64,
    pub success_rate: f64,
    pub trade_count: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuarterTrend {
    pub periods: Vec<PeriodPerformance>,
    pub direction: TrendDirection,
    pub consistency_score: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Correlations {
    pub profit_latency: f64,
    pub profit_slippage: f64,
    pub latency_gas: f64,
    /// Only over results that carry a gas price; `None` with too few of them.
    pub profit_gas_price: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seasonality {
    pub hourly_avg_profit: BTreeMap<u32, f64>,
    pub best_hour: u32,
    pub worst_hour: u32,
    pub hourly_spread: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeepAnalysis {
    pub comprehensive: ComprehensiveAnalysis,
    pub quarter_trend: Option<QuarterTrend>,
    pub correlations: Option<Correlations>,
    pub seasonality: Option<Seasonality>,
    /// Relative change of the last quarter's mean profit over the first's.
    pub improvement_ratio: Option<f64>,
    pub predictive_insights: Vec<String>,
    pub long_term_recommendations: Vec<String>,
}

pub fn deep(results: &[ExecutionResult]) -> DeepAnalysis {
    let comprehensive = comprehensive(results);
    let ordered = chronological(results);

    let improvement_ratio = improvement_ratio(&ordered);
    let long_term_recommendations = long_term_recommendations(
        improvement_ratio,
        comprehensive.risk.as_ref().map_or(0.0, |r| r.max_drawdown),
        ordered.len(),
    );

    DeepAnalysis {
        quarter_trend: quarter_trend(&ordered),
        correlations: correlations(&ordered),
        seasonality: seasonality(&ordered),
        improvement_ratio,
        predictive_insights: predictive_insights(&ordered),
        long_term_recommendations,
        comprehensive,
    }
}

pub fn quarter_trend(results: &[ExecutionResult]) -> Option<QuarterTrend> {
    if results.len() < MIN_TREND_RESULTS {
        return None;
    }
    let period_size = results.len() / 4;
    let periods: Vec<PeriodPerformance> = results
        .chunks(period_size)
        .map(|chunk| PeriodPerformance {
            avg_profit: mean(&profits(chunk)),
            success_rate: ratio(chunk.iter().filter(|r| r.success).count(), chunk.len()),
            trade_count: chunk.len(),
        })
        .collect();

    let avgs: Vec<f64> = periods.iter().map(|p| p.avg_profit).collect();
    let direction = match (avgs.first(), avgs.last()) {
        (Some(first), Some(last)) if last > first => TrendDirection::Improving,
        _ => TrendDirection::Declining,
    };

    Some(QuarterTrend {
        consistency_score: consistency(&avgs),
        periods,
        direction,
    })
}

pub fn correlations(results: &[ExecutionResult]) -> Option<Correlations> {
    if results.len() < MIN_CORRELATION_RESULTS {
        return None;
    }
    let p = profits(results);
    let latency: Vec<f64> = results.iter().map(|r| r.execution_time_us).collect();
    let slippage: Vec<f64> = results.iter().map(|r| r.slippage).collect();
    let gas: Vec<f64> = results.iter().map(|r| r.gas_used as f64).collect();

    let (priced_profit, gas_price): (Vec<f64>, Vec<f64>) = results
        .iter()
        .filter_map(|r| r.market_conditions.gas_price_gwei.map(|g| (r.profit, g)))
        .unzip();
    let profit_gas_price = (gas_price.len() >= MIN_CORRELATION_RESULTS)
        .then(|| pearson(&priced_profit, &gas_price));

    Some(Correlations {
        profit_latency: pearson(&p, &latency),
        profit_slippage: pearson(&p, &slippage),
        latency_gas: pearson(&latency, &gas),
        profit_gas_price,
    })
}

pub fn seasonality(results: &[ExecutionResult]) -> Option<Seasonality> {
    if results.len() < MIN_SEASONALITY_RESULTS {
        return None;
    }
    let mut by_hour: BTreeMap<u32, Vec<f64>> = BTreeMap::new();
    for r in results {
        by_hour.entry(r.timestamp.hour()).or_default().push(r.profit);
    }
    let hourly_avg_profit: BTreeMap<u32, f64> =
        by_hour.into_iter().map(|(h, p)| (h, mean(&p))).collect();

    let best_hour = first_max(&hourly_avg_profit)?;
    let worst_hour = first_min(&hourly_avg_profit)?;
    let hourly_spread = hourly_avg_profit[&best_hour] - hourly_avg_profit[&worst_hour];

    Some(Seasonality {
        hourly_avg_profit,
        best_hour,
        worst_hour,
        hourly_spread,
    })
}

fn improvement_ratio(results: &[ExecutionResult]) -> Option<f64> {
    if results.len() < MIN_LONG_TERM_RESULTS {
        return None;
    }
    let quarter = results.len() / 4;
    let first = mean(&profits(&results[..quarter]));
    let last = mean(&profits(&results[results.len() - quarter..]));
    Some(if first != 0.0 {
        (last - first) / first.abs()
    } else {
        0.0
    })
}

fn long_term_recommendations(improvement: Option<f64>, max_drawdown: f64, n: usize) -> Vec<String> {
    let mut out = Vec::new();
    if n < MIN_LONG_TERM_RESULTS {
        return out;
    }
    match improvement {
        Some(r) if r > 0.2 => {
            out.push("Strong long-term improvement - consider increasing position sizes".to_string())
        }
        Some(r) if r < -0.2 => out.push(
            "Long-term performance decline - review strategy parameters and market conditions"
                .to_string(),
        ),
        _ => {}
    }
    if max_drawdown > 0.2 {
        out.push("High maximum drawdown - implement more conservative risk management".to_string());
    }
    out
}

pub fn predictive_insights(results: &[ExecutionResult]) -> Vec<String> {
    let mut out = Vec::new();
    if results.len() < MIN_INSIGHT_RESULTS {
        return out;
    }
    let recent = &results[results.len() - RECENT_WINDOW..];
    let p = profits(recent);
    let success = ratio(recent.iter().filter(|r| r.success).count(), recent.len());

    if success > 0.9 {
        out.push("High success rate trend suggests optimal market conditions".to_string());
    } else if success < 0.6 {
        out.push("Low success rate trend suggests challenging market conditions".to_string());
    }
    if std_dev(&p) > mean(&p) * 2.0 {
        out.push("High profit volatility detected - consider risk management adjustments".to_string());
    }
    out
}

// =============================================================================
// Recommendation strings
// =============================================================================

pub fn fast_recommendations(summary: &BatchSummary) -> Vec<String> {
    let mut out = Vec::new();
    if summary.total_trades == 0 {
        return out;
    }
    if summary.success_rate < 0.7 {
        out.push("Increase confidence threshold to reduce low-quality trades".to_string());
    }
    if summary.profit_std > summary.avg_profit * 2.0 {
        out.push("High profit volatility detected - consider reducing position sizes".to_string());
    }
    out
}

pub fn medium_recommendations(analysis: &ComprehensiveAnalysis) -> Vec<String> {
    let mut out = Vec::new();
    if let Some(best) = analysis.conditions.best_condition {
        out.push(format!("Current market conditions favor {best} strategies"));
    }
    if analysis.risk.map_or(false, |r| r.max_drawdown > 0.1) {
        out.push("High drawdown detected - implement stricter risk controls".to_string());
    }
    if analysis.summary.total_trades > 0 {
        out.push(format!(
            "Focus on {} strategy for current conditions",
            analysis.summary.best_strategy
        ));
    }
    out
}

pub fn slow_recommendations(analysis: &DeepAnalysis) -> Vec<String> {
    let mut out = Vec::new();
    match analysis.quarter_trend.as_ref().map(|q| q.direction) {
        Some(TrendDirection::Declining) => {
            out.push("Performance declining - consider strategy overhaul".to_string())
        }
        Some(TrendDirection::Improving) => {
            out.push("Performance improving - consider scaling up".to_string())
        }
        _ => {}
    }
    if let Some(s) = &analysis.seasonality {
        out.push(format!(
            "Best trading hour is {:02}:00 UTC, worst is {:02}:00 UTC",
            s.best_hour, s.worst_hour
        ));
    }
    out.extend(analysis.predictive_insights.iter().cloned());
    out.extend(analysis.long_term_recommendations.iter().cloned());
    out
}

// =============================================================================
// Helpers
// =============================================================================

fn profits(results: &[ExecutionResult]) -> Vec<f64> {
    results.iter().map(|r| r.profit).collect()
}

fn chronological(results: &[ExecutionResult]) -> Vec<ExecutionResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by_key(|r| r.timestamp);
    sorted
}

fn ratio(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

/// `1 - std / |mean|`; a zero mean counts as fully inconsistent.
fn consistency(values: &[f64]) -> f64 {
    let m = mean(values);
    if m == 0.0 {
        0.0
    } else {
        1.0 - std_dev(values) / m.abs()
    }
}

fn mean_by<K: Ord>(results: &[ExecutionResult], key: impl Fn(&ExecutionResult) -> K) -> BTreeMap<K, f64> {
    let mut grouped: BTreeMap<K, (f64, usize)> = BTreeMap::new();
    for r in results {
        let slot = grouped.entry(key(r)).or_insert((0.0, 0));
        slot.0 += r.profit;
        slot.1 += 1;
    }
    grouped
        .into_iter()
        .map(|(k, (sum, n))| (k, sum / n as f64))
        .collect()
}

/// Key of the largest value; the first key wins ties.
fn first_max<K: Clone>(map: &BTreeMap<K, f64>) -> Option<K> {
    let mut best: Option<(&K, f64)> = None;
    for (k, v) in map {
        if best.map_or(true, |(_, b)| *v > b) {
            best = Some((k, *v));
        }
    }
    best.map(|(k, _)| k.clone())
}

fn first_min<K: Clone>(map: &BTreeMap<K, f64>) -> Option<K> {
    let mut worst: Option<(&K, f64)> = None;
    for (k, v) in map {
        if worst.map_or(true, |(_, w)| *v < w) {
            worst = Some((k, *v));
        }
    }
    worst.map(|(k, _)| k.clone())
}
