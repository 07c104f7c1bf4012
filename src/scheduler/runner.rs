// =============================================================================
// Scheduler Runner — one tokio task per cadence plus the health task
// =============================================================================
//
// Every task loops on `select!` between its interval and the shared shutdown
// watch.  The tick body runs to completion inside the select arm, so a
// shutdown signal is only observed between ticks.
//
// A failing tick is logged at error level and recorded on the engine; a
// panicking tick is caught and treated the same.  Neither stops the task.
// =============================================================================

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

use super::{health, Cadence};
use crate::engine::Engine;

pub struct Scheduler {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

impl Scheduler {
    /// Spawn the four cadence tasks and the health task.
    pub fn start(engine: Arc<Engine>) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let config = engine.config().scheduler.clone();

        let mut handles = Vec::with_capacity(Cadence::ALL.len() + 1);
        for cadence in Cadence::ALL {
            let period = cadence.interval(&config);
            let engine = Arc::clone(&engine);
            let rx = shutdown_rx.clone();
            handles.push(tokio::spawn(async move {
                run_every(period, rx, cadence.as_str(), move || run_tick(&engine, cadence)).await;
            }));
            info!(cadence = %cadence, interval_ms = period.as_millis() as u64, "cadence task started");
        }

        let health_period = config.health_interval();
        let health_engine = Arc::clone(&engine);
        handles.push(tokio::spawn(async move {
            run_every(health_period, shutdown_rx, "health", move || {
                run_health(&health_engine)
            })
            .await;
        }));

        Self {
            shutdown_tx,
            handles,
        }
    }

    /// Signal every task and wait for each to finish its current tick.
    pub async fn shutdown(self) {
        let _ = self.shutdown_tx.send(true);
        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "scheduler task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}

async fn run_every<F>(period: Duration, mut shutdown: watch::Receiver<bool>, name: &'static str, mut tick: F)
where
    F: FnMut(),
{
    let mut interval = tokio::time::interval(period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => tick(),
            changed = shutdown.changed() => {
                if changed.is_err() || *shutdown.borrow() {
                    break;
                }
            }
        }
    }
    debug!(task = name, "scheduler task exiting");
}

fn run_tick(engine: &Engine, cadence: Cadence) {
    match catch_unwind(AssertUnwindSafe(|| engine.run_cycle(cadence))) {
        Ok(Ok(outcome)) => {
            debug!(cadence = %cadence, drained = outcome.drained, "tick ok");
        }
        Ok(Err(e)) => {
            error!(cadence = %cadence, error = %e, "cycle failed, skipping tick");
            engine.record_failure(cadence, e.to_string());
        }
        Err(payload) => {
            let msg = panic_message(payload.as_ref());
            error!(cadence = %cadence, panic = %msg, "cycle panicked, skipping tick");
            engine.record_failure(cadence, format!("panic: {msg}"));
        }
    }
}

fn run_health(engine: &Engine) {
    if let Err(payload) = catch_unwind(AssertUnwindSafe(|| health::run_health_check(engine))) {
        let msg = panic_message(payload.as_ref());
        error!(panic = %msg, "health check panicked");
        engine.push_error_with_code(format!("health check panic: {msg}"), Some("health".into()));
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
