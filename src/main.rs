// =============================================================================
// Aurora Tuner — Main Entry Point
// =============================================================================
//
// Loads the engine config (writing a template on first run), starts the
// cadence scheduler and serves the operator API until Ctrl+C.
// =============================================================================

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use aurora_tuner::{api, Engine, EngineConfig, Scheduler};

const DEFAULT_CONFIG_PATH: &str = "engine_config.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Aurora Tuner starting up");

    let config_path =
        std::env::var("AURORA_CONFIG_PATH").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
    let mut config = load_or_init_config(Path::new(&config_path));
    config.apply_env_overrides();
    config.validate().context("engine config rejected after env overrides")?;

    // ── 2. Engine & scheduler ────────────────────────────────────────────
    let engine = Arc::new(Engine::new(config).context("failed to build engine")?);
    let scheduler = Scheduler::start(Arc::clone(&engine));

    // ── 3. API server ────────────────────────────────────────────────────
    let bind_addr = std::env::var("AURORA_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(Arc::clone(&engine));
    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 4. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received, stopping gracefully");

    scheduler.shutdown().await;
    server.abort();

    info!(
        state_version = engine.current_state_version(),
        "Aurora Tuner shut down complete"
    );
    Ok(())
}

/// Missing file: write the defaults as a template.  Unreadable or invalid
/// file: keep running on defaults and leave the file alone.
fn load_or_init_config(path: &Path) -> EngineConfig {
    if !path.exists() {
        let config = EngineConfig::default();
        match config.save(path) {
            Ok(()) => info!(path = %path.display(), "wrote default engine config template"),
            Err(e) => warn!(error = %e, "failed to write engine config template"),
        }
        return config;
    }

    EngineConfig::load(path).unwrap_or_else(|e| {
        warn!(error = %format!("{e:#}"), "failed to load config, using defaults");
        EngineConfig::default()
    })
}
