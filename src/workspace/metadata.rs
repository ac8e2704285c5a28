//! Per-workspace settings and run bookkeeping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::WorkMode;
use crate::error::Result;
use crate::status::DEFAULT_COMPLETION_MARKER;

pub const DEFAULT_MAX_ITERATIONS: u32 = 50;
pub const DEFAULT_STAGNATION_THRESHOLD: u32 = 2;

fn default_max_iterations() -> u32 {
    DEFAULT_MAX_ITERATIONS
}

fn default_stagnation_threshold() -> u32 {
    DEFAULT_STAGNATION_THRESHOLD
}

fn default_completion_marker() -> String {
    DEFAULT_COMPLETION_MARKER.to_string()
}

/// Contents of `metadata.json`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkspaceMetadata {
    pub task: String,
    #[serde(default)]
    pub mode: WorkMode,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,
    /// Delay between iterations; None defers to configuration
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_ms: Option<u64>,
    /// Consecutive no-work iterations before stopping; 0 disables
    #[serde(default = "default_stagnation_threshold")]
    pub stagnation_threshold: u32,
    #[serde(default = "default_completion_marker")]
    pub completion_marker: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notification_url: Option<String>,

    //=== Run bookkeeping ===
    #[serde(default)]
    pub iteration_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl WorkspaceMetadata {
    pub fn new(task: impl Into<String>, mode: WorkMode) -> Self {
        let now = Utc::now();
        Self {
            task: task.into(),
            mode,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            delay_ms: None,
            stagnation_threshold: DEFAULT_STAGNATION_THRESHOLD,
            completion_marker: default_completion_marker(),
            notification_url: None,
            iteration_count: 0,
            last_outcome: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Read/update access to workspace metadata.
///
/// `update` applies the closure to the current record and persists it.
pub trait MetadataStore: Send + Sync {
    fn read(&self) -> Result<WorkspaceMetadata>;

    fn update(&self, apply: &mut dyn FnMut(&mut WorkspaceMetadata)) -> Result<WorkspaceMetadata>;
}
