//! Agent process layer
//!
//! This module provides:
//! - ProcessClient: single-slot spawn / stream / terminate of the agent CLI
//! - ExecutionRequest / ExecutionOutcome: the per-call value types
//! - AgentRunner: the seam the iteration controller drives

pub mod client;
pub mod signal;
pub mod types;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;

pub use client::{DEFAULT_BINARY, DEFAULT_ZOMBIE_TIMEOUT, KILL_BUFFER, ProcessClient};
pub use signal::{KillSignal, send_signal};
pub use types::{ExecutionCallbacks, ExecutionMode, ExecutionOutcome, ExecutionRequest};

/// Runs agent invocations on behalf of the iteration controller
#[async_trait]
pub trait AgentRunner: Send + Sync {
    /// Run one invocation in the mode the request names
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome>;

    /// Terminate any live invocation and refuse new ones
    async fn shutdown(&self, grace: Duration);

    /// Signal the live invocation; false when nothing is running
    fn kill(&self, signal: KillSignal) -> bool;
}

#[async_trait]
impl AgentRunner for ProcessClient {
    async fn execute(&self, request: ExecutionRequest) -> Result<ExecutionOutcome> {
        ProcessClient::execute(self, request).await
    }

    async fn shutdown(&self, grace: Duration) {
        ProcessClient::shutdown(self, grace).await
    }

    fn kill(&self, signal: KillSignal) -> bool {
        ProcessClient::kill(self, signal)
    }
}
