//! Status file handling
//!
//! This module provides:
//! - StatusRecord: the agent-written `status.json`
//! - StatusDelta: what changed between two snapshots
//! - CompletionDetector: mode-aware completion and remaining-work queries
//! - StatusWatcher: debounced change events for notifications

pub mod delta;
pub mod detector;
pub mod record;
pub mod watcher;

pub use delta::{StatusDelta, has_significant_change};
pub use detector::{ChecklistCounts, CompletionDetector, DEFAULT_COMPLETION_MARKER};
pub use record::{Progress, StatusRecord};
pub use watcher::{DEFAULT_DEBOUNCE, StatusChange, StatusWatcher, WatcherConfig, WatcherState};
