//! Runner module - the fresh-context iteration loop.
//!
//! This module provides:
//! - IterationController: drives the agent until a terminal state
//! - EngineConfig: per-run settings
//! - LoopObserver: in-process event delivery
//! - ShutdownHandle: graceful stop with escalation

mod loop_runner;
mod shutdown;
mod state;

pub use loop_runner::{DEFAULT_DELAY, DEFAULT_SHUTDOWN_GRACE, EngineConfig, IterationController, LoopObserver};
pub use shutdown::ShutdownHandle;
pub use state::IterationState;
