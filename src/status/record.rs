//! The status file the agent writes after each iteration.

use std::path::Path;

use serde::{Deserialize, Serialize};

/// Loop-mode progress counter
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Progress {
    pub completed: u32,
    pub total: u32,
}

impl Progress {
    pub fn remaining(&self) -> u32 {
        self.total.saturating_sub(self.completed)
    }
}

/// Contents of `status.json`.
///
/// Unknown fields are ignored so agents can add their own notes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusRecord {
    #[serde(default)]
    pub complete: bool,
    /// Iterative mode: whether the last iteration did any work
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub worked: Option<bool>,
    /// Loop mode: task-list progress
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<Progress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_updated: Option<String>,
}

impl StatusRecord {
    /// Parse a record from raw file contents
    pub fn parse(contents: &str) -> Option<Self> {
        match serde_json::from_str(contents) {
            Ok(record) => Some(record),
            Err(e) => {
                log::debug!("Status file did not parse: {}", e);
                None
            }
        }
    }

    /// Read and parse `path`; None if missing or invalid
    pub fn try_load(path: &Path) -> Option<Self> {
        let contents = std::fs::read_to_string(path).ok()?;
        Self::parse(&contents)
    }

    /// Read `path`, falling back to the default record
    pub fn load(path: &Path) -> Self {
        Self::try_load(path).unwrap_or_default()
    }
}
