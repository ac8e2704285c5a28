//! Domain types for Wiggum
//!
//! This module contains the core domain types:
//! - WorkMode: loop vs iterative, fixed per workspace
//! - LoopEvent: what the iteration controller reports to observers
//! - LoopOutcome: terminal state of a run

pub mod event;
pub mod mode;
pub mod outcome;

pub use event::{LoopEvent, MILESTONE_INTERVAL, event_types};
pub use mode::WorkMode;
pub use outcome::LoopOutcome;
