// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`.  Health is public; everything else
// takes the `AuthBearer` extractor.
//
//   GET  /health                       liveness + state version
//   GET  /status                       full StatusReport
//   GET  /recommendation               latest published recommendation
//   GET  /risk                         fresh risk evaluation + backtests
//   GET  /optimizations?limit=         recent optimization records
//   GET  /alerts?limit=                active alerts + history
//   POST /results                      submit one ExecutionResult
//   POST /market                       observe one MarketSample
//   POST /portfolio                    observe one PortfolioSnapshot
//   POST /control/reset-performance    clear one or all strategy metrics
//   GET  /ws?token=                    recommendation push stream
//
// Engine input errors come back as 400 with the error message; failed risk
// computations come back as 500.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::engine::Engine;
use crate::error::EngineError;
use crate::recommendation::Alert;
use crate::risk::{CircuitBreakerStatus, DrawdownAlert, DrawdownEvent, RiskState, VarBacktest};
use crate::sink::SubmitOutcome;
use crate::types::{ExecutionResult, MarketSample, PortfolioSnapshot};

const DEFAULT_LIST_LIMIT: usize = 20;
const MAX_LIST_LIMIT: usize = 500;

// =============================================================================
// Router construction
// =============================================================================

pub fn router(engine: Arc<Engine>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        // ── Authenticated ───────────────────────────────────────────
        .route("/api/v1/status", get(status))
        .route("/api/v1/recommendation", get(recommendation))
        .route("/api/v1/risk", get(risk))
        .route("/api/v1/optimizations", get(optimizations))
        .route("/api/v1/alerts", get(alerts))
        .route("/api/v1/results", post(submit_result))
        .route("/api/v1/market", post(observe_market))
        .route("/api/v1/portfolio", post(observe_portfolio))
        .route("/api/v1/control/reset-performance", post(reset_performance))
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        .layer(cors)
        .with_state(engine)
}

// =============================================================================
// Error mapping
// =============================================================================

pub struct ApiError(EngineError);

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            EngineError::InvalidRiskMetric { .. }
            | EngineError::Computation(_)
            | EngineError::CadenceNotPermitted { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        };
        let message = self.0.to_string();
        warn!(status = status.as_u16(), error = %message, "request rejected");
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<usize>,
}

impl LimitQuery {
    fn resolve(&self) -> usize {
        self.limit.unwrap_or(DEFAULT_LIST_LIMIT).min(MAX_LIST_LIMIT)
    }
}

// =============================================================================
// Health (public)
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: engine.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Read endpoints (authenticated)
// =============================================================================

async fn status(_auth: AuthBearer, State(engine): State<Arc<Engine>>) -> impl IntoResponse {
    Json(engine.build_status())
}

async fn recommendation(_auth: AuthBearer, State(engine): State<Arc<Engine>>) -> Response {
    match engine.current_recommendation() {
        Some(rec) => Json(rec).into_response(),
        None => (
            StatusCode::NOT_FOUND,
            Json(serde_json::json!({ "error": "no recommendation published yet" })),
        )
            .into_response(),
    }
}

#[derive(Serialize)]
struct RiskReport {
    state: RiskState,
    backtests: Vec<VarBacktest>,
    #[serde(skip_serializing_if = "Option::is_none")]
    active_drawdown: Option<DrawdownEvent>,
    drawdown_history: Vec<DrawdownEvent>,
    alerts: Vec<DrawdownAlert>,
}

async fn risk(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
) -> Result<Json<RiskReport>, ApiError> {
    let gate = engine.risk();
    let state = gate.evaluate()?;
    let backtests = engine
        .config()
        .risk
        .var_confidence_levels
        .iter()
        .map(|&c| gate.backtest_var(c))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Json(RiskReport {
        state,
        backtests,
        active_drawdown: gate.active_drawdown(),
        drawdown_history: gate.drawdown_history(DEFAULT_LIST_LIMIT),
        alerts: gate.recent_alerts(DEFAULT_LIST_LIMIT),
    }))
}

async fn optimizations(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(engine.recent_optimizations(query.resolve()))
}

#[derive(Serialize)]
struct AlertsResponse {
    active: Vec<Alert>,
    history: Vec<Alert>,
}

async fn alerts(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Query(query): Query<LimitQuery>,
) -> impl IntoResponse {
    Json(AlertsResponse {
        active: engine.active_alerts(),
        history: engine.alert_history(query.resolve()),
    })
}

// =============================================================================
// Ingestion (authenticated)
// =============================================================================

#[derive(Serialize)]
struct SubmitResponse {
    outcome: SubmitOutcome,
    pending: usize,
}

async fn submit_result(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Json(result): Json<ExecutionResult>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let outcome = engine.submit_result(result)?;
    let status = match outcome {
        SubmitOutcome::Accepted => StatusCode::ACCEPTED,
        SubmitOutcome::Dropped => StatusCode::SERVICE_UNAVAILABLE,
    };
    Ok((
        status,
        Json(SubmitResponse {
            outcome,
            pending: engine.queue_status().pending,
        }),
    ))
}

async fn observe_market(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Json(sample): Json<MarketSample>,
) -> Result<StatusCode, ApiError> {
    engine.observe_market(sample)?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Serialize)]
struct PortfolioResponse {
    circuit_breaker: CircuitBreakerStatus,
    max_position_scalar: f64,
}

async fn observe_portfolio(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Json(snapshot): Json<PortfolioSnapshot>,
) -> Result<Json<PortfolioResponse>, ApiError> {
    engine.observe_portfolio(snapshot)?;
    let gate = engine.risk();
    Ok(Json(PortfolioResponse {
        circuit_breaker: gate.check_circuit_breaker(),
        max_position_scalar: gate.max_position_scalar(),
    }))
}

// =============================================================================
// Control (authenticated)
// =============================================================================

#[derive(Deserialize)]
struct ResetRequest {
    #[serde(default)]
    strategy_id: Option<String>,
}

async fn reset_performance(
    _auth: AuthBearer,
    State(engine): State<Arc<Engine>>,
    Json(req): Json<ResetRequest>,
) -> Result<impl IntoResponse, ApiError> {
    engine.reset_performance(req.strategy_id.as_deref())?;
    let scope = req.strategy_id.unwrap_or_else(|| "all".to_string());
    info!(scope = %scope, "performance metrics reset via API");

    Ok(Json(serde_json::json!({
        "reset": scope,
        "state_version": engine.current_state_version(),
    })))
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::auth::ADMIN_TOKEN_ENV;
    use crate::regime::MarketRegime;
    use crate::runtime_config::EngineConfig;
    use crate::scheduler::Cadence;
    use crate::types::MarketConditions;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request};
    use chrono::Utc;
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin-token";

    fn app() -> (Router, Arc<Engine>) {
        std::env::set_var(ADMIN_TOKEN_ENV, TOKEN);
        let mut config = EngineConfig::default();
        config.strategies = vec!["tri_arb".into(), "dex_arb".into()];
        let engine = Arc::new(Engine::new(config).unwrap());
        (router(Arc::clone(&engine)), engine)
    }

    fn get_req(uri: &str) -> Request<Body> {
        Request::get(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .body(Body::empty())
            .unwrap()
    }

    fn post_json(uri: &str, body: String) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, format!("Bearer {TOKEN}"))
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .unwrap()
    }

    async fn json_body(resp: Response) -> serde_json::Value {
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    fn result(strategy: &str) -> ExecutionResult {
        ExecutionResult {
            strategy_id: strategy.into(),
            timestamp: Utc::now(),
            profit: 2.5,
            success: true,
            execution_time_us: 650.0,
            slippage: 0.0004,
            gas_used: 120_000,
            market_regime: MarketRegime::Ranging,
            market_conditions: MarketConditions::default(),
        }
    }

    #[tokio::test]
    async fn health_is_public() {
        let (app, _) = app();
        let resp = app
            .oneshot(Request::get("/api/v1/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["status"], "ok");
    }

    #[tokio::test]
    async fn operator_routes_need_the_token() {
        let (app, _) = app();
        let resp = app
            .clone()
            .oneshot(Request::get("/api/v1/status").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);

        let resp = app
            .oneshot(
                Request::get("/api/v1/status")
                    .header(header::AUTHORIZATION, "Bearer wrong-token-value")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn submitted_results_reach_the_queue() {
        let (app, engine) = app();
        let body = serde_json::to_string(&result("tri_arb")).unwrap();
        let resp = app.oneshot(post_json("/api/v1/results", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        let json = json_body(resp).await;
        assert_eq!(json["outcome"], "accepted");
        assert_eq!(json["pending"], 1);

        engine.run_cycle(Cadence::Continuous).unwrap();
        assert_eq!(engine.performance().totals().executions, 1);
    }

    #[tokio::test]
    async fn unknown_strategy_is_a_bad_request() {
        let (app, _) = app();
        let body = serde_json::to_string(&result("ghost")).unwrap();
        let resp = app.oneshot(post_json("/api/v1/results", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = json_body(resp).await;
        assert!(json["error"].as_str().unwrap().contains("ghost"));
    }

    #[tokio::test]
    async fn invalid_portfolio_value_is_rejected() {
        let (app, _) = app();
        let body = serde_json::json!({ "timestamp": Utc::now(), "total_value": -5.0 }).to_string();
        let resp = app.oneshot(post_json("/api/v1/portfolio", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn recommendation_appears_after_a_tick() {
        let (app, engine) = app();
        let resp = app.clone().oneshot(get_req("/api/v1/recommendation")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);

        engine.run_cycle(Cadence::Continuous).unwrap();
        let resp = app.oneshot(get_req("/api/v1/recommendation")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["risk_gate_open"], true);
        assert_eq!(json["cadence"], "continuous");
    }

    #[tokio::test]
    async fn risk_report_covers_every_confidence_level() {
        let (app, engine) = app();
        let resp = app.oneshot(get_req("/api/v1/risk")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        let levels = engine.config().risk.var_confidence_levels.len();
        assert_eq!(json["backtests"].as_array().unwrap().len(), levels);
        assert_eq!(json["state"]["circuit_breaker"]["tripped"], false);
    }

    #[tokio::test]
    async fn reset_rejects_unknown_strategy() {
        let (app, _) = app();
        let resp = app
            .clone()
            .oneshot(post_json(
                "/api/v1/control/reset-performance",
                r#"{"strategy_id":"ghost"}"#.into(),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);

        let resp = app
            .oneshot(post_json("/api/v1/control/reset-performance", "{}".into()))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(json_body(resp).await["reset"], "all");
    }
}
