//! Request and outcome types for agent process execution.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use crate::stream::ToolEvent;

/// How the agent process is run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Inherited stdio; a human drives the session
    Interactive,
    /// Piped stdout/stderr, one-shot
    #[default]
    Captured,
    /// One-shot with the structured event stream parsed as it arrives
    Streamed,
}

pub type ChunkCallback = Arc<dyn Fn(&str) + Send + Sync>;
pub type ToolEventCallback = Arc<dyn Fn(&ToolEvent) + Send + Sync>;

/// Optional per-call observers.
///
/// All callbacks run on the task driving the process, so they must not block.
#[derive(Clone, Default)]
pub struct ExecutionCallbacks {
    pub on_stdout: Option<ChunkCallback>,
    pub on_stderr: Option<ChunkCallback>,
    pub on_tool_event: Option<ToolEventCallback>,
    pub on_raw_output: Option<ChunkCallback>,
    pub on_parse_error: Option<ChunkCallback>,
}

impl ExecutionCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_stdout(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stdout = Some(Arc::new(f));
        self
    }

    pub fn on_stderr(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_stderr = Some(Arc::new(f));
        self
    }

    pub fn on_tool_event(mut self, f: impl Fn(&ToolEvent) + Send + Sync + 'static) -> Self {
        self.on_tool_event = Some(Arc::new(f));
        self
    }

    pub fn on_raw_output(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_raw_output = Some(Arc::new(f));
        self
    }

    pub fn on_parse_error(mut self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.on_parse_error = Some(Arc::new(f));
        self
    }

    pub(crate) fn stdout(&self, chunk: &str) {
        if let Some(cb) = &self.on_stdout {
            cb(chunk);
        }
    }

    pub(crate) fn stderr(&self, chunk: &str) {
        if let Some(cb) = &self.on_stderr {
            cb(chunk);
        }
    }

    pub(crate) fn raw(&self, chunk: &str) {
        if let Some(cb) = &self.on_raw_output {
            cb(chunk);
        }
    }
}

impl fmt::Debug for ExecutionCallbacks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionCallbacks")
            .field("on_stdout", &self.on_stdout.is_some())
            .field("on_stderr", &self.on_stderr.is_some())
            .field("on_tool_event", &self.on_tool_event.is_some())
            .field("on_raw_output", &self.on_raw_output.is_some())
            .field("on_parse_error", &self.on_parse_error.is_some())
            .finish()
    }
}

/// One agent invocation
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    pub prompt: String,
    pub system_prompt: Option<String>,
    pub cwd: Option<PathBuf>,
    pub mode: ExecutionMode,
    pub callbacks: ExecutionCallbacks,
}

impl ExecutionRequest {
    /// Create a captured-mode request for `prompt`
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            system_prompt: None,
            cwd: None,
            mode: ExecutionMode::Captured,
            callbacks: ExecutionCallbacks::default(),
        }
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = Some(system_prompt.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_callbacks(mut self, callbacks: ExecutionCallbacks) -> Self {
        self.callbacks = callbacks;
        self
    }
}

/// Result of a completed agent invocation
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ExecutionOutcome {
    /// Captured stdout, or the extracted final result in streamed mode
    pub output: String,
    /// Exit code; None when killed by a signal or the exit was lost
    pub exit_code: Option<i32>,
    /// The zombie ceiling elapsed before an exit event was observed
    pub exit_lost: bool,
}
