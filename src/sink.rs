// =============================================================================
// ExecutionResultSink — bounded, non-blocking outcome queue
// =============================================================================
//
// The executor pushes outcomes in; the cadence cycles drain them out at their
// own pace.  Neither side ever waits: `submit` drops and counts when full,
// `drain` returns whatever is available up to the caller's cap.
// =============================================================================

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use serde::Serialize;
use tracing::warn;

use crate::error::EngineResult;
use crate::types::ExecutionResult;

/// Outcome of a `submit` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    Accepted,
    /// Queue at capacity; the result was discarded.
    Dropped,
}

pub struct ExecutionResultSink {
    queue: Mutex<VecDeque<ExecutionResult>>,
    capacity: usize,
    accepted: AtomicU64,
    dropped: AtomicU64,
}

impl ExecutionResultSink {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: Mutex::new(VecDeque::with_capacity(capacity.min(1_024))),
            capacity,
            accepted: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue a validated result.  Malformed results are rejected with an
    /// error; a full queue is not an error and only increments the drop
    /// counter.
    pub fn submit(&self, result: ExecutionResult) -> EngineResult<SubmitOutcome> {
        result.validate()?;

        let mut queue = self.queue.lock();
        if queue.len() >= self.capacity {
            drop(queue);
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            warn!(
                strategy = %result.strategy_id,
                capacity = self.capacity,
                dropped_total = dropped,
                "execution result queue full, dropping result"
            );
            return Ok(SubmitOutcome::Dropped);
        }
        queue.push_back(result);
        drop(queue);

        self.accepted.fetch_add(1, Ordering::Relaxed);
        Ok(SubmitOutcome::Accepted)
    }

    /// Remove and return up to `max` results in arrival order.
    pub fn drain(&self, max: usize) -> Vec<ExecutionResult> {
        let mut queue = self.queue.lock();
        let n = max.min(queue.len());
        queue.drain(..n).collect()
    }

    pub fn len(&self) -> usize {
        self.queue.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn accepted_count(&self) -> u64 {
        self.accepted.load(Ordering::Relaxed)
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
