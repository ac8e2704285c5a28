//! Wiggum - runs a coding agent in a fresh-context loop
//!
//! Wiggum implements the "Ralph Wiggum" pattern: spawn the agent CLI with a
//! fresh context each iteration, let it read and write a status file in the
//! workspace, and stop when that file says the work is done.

pub mod domain;
pub mod error;
pub mod notification;
pub mod process;
pub mod prompt;
pub mod runner;
pub mod status;
pub mod storage;
pub mod stream;
pub mod workspace;

pub use error::{Result, WiggumError};
