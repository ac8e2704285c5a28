//! Terminal states of an engine run.

/// Outcome of a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopOutcome {
    /// The completion detector reported done
    Completed,
    /// Iterative mode stopped after too many no-work iterations
    StagnantCompleted,
    /// The iteration limit was hit
    MaxIterationsReached,
    /// An iteration failed; no retry
    Failed(String),
    /// A shutdown request ended the run
    Interrupted,
}

impl LoopOutcome {
    /// Label stored in workspace metadata
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::StagnantCompleted => "stagnant",
            Self::MaxIterationsReached => "max_iterations",
            Self::Failed(_) => "failed",
            Self::Interrupted => "interrupted",
        }
    }

    /// Process exit code for the command-line layer
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Completed | Self::StagnantCompleted | Self::MaxIterationsReached => 0,
            Self::Failed(_) => 1,
            Self::Interrupted => 130,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }
}
