//! Engine events delivered to observers.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use super::mode::WorkMode;
use super::outcome::LoopOutcome;

/// Event type constants
pub mod event_types {
    pub const RUN_STARTED: &str = "run.started";
    pub const ITERATION_STARTED: &str = "iteration.started";
    pub const ITERATION_COMPLETE: &str = "iteration.complete";
    pub const MILESTONE: &str = "iteration.milestone";
    pub const RUN_COMPLETE: &str = "run.complete";
    pub const RUN_STAGNANT: &str = "run.stagnant";
    pub const RUN_MAX_ITERATIONS: &str = "run.max_iterations";
    pub const RUN_INTERRUPTED: &str = "run.interrupted";
    pub const RUN_FAILED: &str = "run.failed";
    /// An iteration failed; always followed by `run.failed`
    pub const ERROR: &str = "run.error";
}

/// Milestone events fire every this many iterations
pub const MILESTONE_INTERVAL: u32 = 10;

/// Something the iteration controller did.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LoopEvent {
    /// Event type (e.g., "iteration.started", "run.complete")
    pub event_type: String,
    /// 1-based iteration the event belongs to, if any
    pub iteration: Option<u32>,
    /// Event-specific payload data
    pub payload: Value,
    pub created_at: DateTime<Utc>,
}

impl LoopEvent {
    /// Create a new event with the given type and payload
    pub fn new(event_type: &str, iteration: Option<u32>, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            iteration,
            payload,
            created_at: Utc::now(),
        }
    }

    pub fn run_started(mode: WorkMode, max_iterations: u32, task: &str) -> Self {
        Self::new(
            event_types::RUN_STARTED,
            None,
            serde_json::json!({
                "mode": mode.as_str(),
                "max_iterations": max_iterations,
                "task": task,
            }),
        )
    }

    pub fn iteration_started(iteration: u32, max_iterations: u32) -> Self {
        Self::new(
            event_types::ITERATION_STARTED,
            Some(iteration),
            serde_json::json!({ "max_iterations": max_iterations }),
        )
    }

    pub fn iteration_complete(iteration: u32, duration_ms: i64, remaining: Option<u32>) -> Self {
        Self::new(
            event_types::ITERATION_COMPLETE,
            Some(iteration),
            serde_json::json!({
                "duration_ms": duration_ms,
                "remaining": remaining,
            }),
        )
    }

    pub fn milestone(iteration: u32) -> Self {
        Self::new(event_types::MILESTONE, Some(iteration), Value::Null)
    }

    /// Create an error event for a failed iteration
    pub fn error(iteration: u32, message: &str) -> Self {
        Self::new(
            event_types::ERROR,
            Some(iteration),
            serde_json::json!({ "message": message }),
        )
    }

    /// Create the terminal event for `outcome`
    pub fn finished(outcome: &LoopOutcome, iterations: u32, no_work_streak: u32) -> Self {
        let event_type = match outcome {
            LoopOutcome::Completed => event_types::RUN_COMPLETE,
            LoopOutcome::StagnantCompleted => event_types::RUN_STAGNANT,
            LoopOutcome::MaxIterationsReached => event_types::RUN_MAX_ITERATIONS,
            LoopOutcome::Interrupted => event_types::RUN_INTERRUPTED,
            LoopOutcome::Failed(_) => event_types::RUN_FAILED,
        };
        let mut payload = serde_json::json!({
            "outcome": outcome.as_str(),
            "iterations": iterations,
        });
        if matches!(outcome, LoopOutcome::StagnantCompleted) {
            payload["no_work_streak"] = no_work_streak.into();
        }
        if let LoopOutcome::Failed(reason) = outcome {
            payload["message"] = reason.as_str().into();
        }
        Self::new(event_type, Some(iterations), payload)
    }

    /// Check if this event ends a run
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.event_type.as_str(),
            event_types::RUN_COMPLETE
                | event_types::RUN_STAGNANT
                | event_types::RUN_MAX_ITERATIONS
                | event_types::RUN_INTERRUPTED
                | event_types::RUN_FAILED
        )
    }
}
