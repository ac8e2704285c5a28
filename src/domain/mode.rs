//! Workspace execution mode.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// How the agent is asked to work; fixed per workspace
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkMode {
    /// One task-list item per iteration, progress reported as counts
    #[default]
    Loop,
    /// Autonomous work, each iteration reports whether it did anything
    Iterative,
}

impl WorkMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Loop => "loop",
            Self::Iterative => "iterative",
        }
    }
}

impl fmt::Display for WorkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for WorkMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "loop" => Ok(Self::Loop),
            "iterative" => Ok(Self::Iterative),
            other => Err(format!("unknown mode '{}' (expected loop or iterative)", other)),
        }
    }
}
