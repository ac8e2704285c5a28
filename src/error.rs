//! Error types for Wiggum
//!
//! Centralized error handling using thiserror.

use thiserror::Error;

/// All error types that can occur in Wiggum
#[derive(Debug, Error)]
pub enum WiggumError {
    /// The agent binary could not be launched
    #[error("Failed to spawn agent: {message}")]
    Spawn {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The agent ran but exited unsuccessfully
    #[error("Agent exited with code {code:?}: {stderr}")]
    NonZeroExit { code: Option<i32>, stderr: String },

    /// Shutdown has begun; no further agent runs are accepted
    #[error("Shutdown in progress")]
    ShutdownInProgress,

    /// Another agent process is still live
    #[error("An agent process is already running (pid {0})")]
    Busy(u32),

    /// Workspace layout or metadata error
    #[error("Workspace error: {0}")]
    Workspace(String),

    /// Notification delivery error
    #[error("Notification error: {0}")]
    Notification(String),

    /// Prompt template error
    #[error("Template error: {0}")]
    Template(String),

    /// File watcher error
    #[error("Watch error: {0}")]
    Watch(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl WiggumError {
    /// Create a Spawn error without an underlying cause
    pub fn spawn(message: impl Into<String>) -> Self {
        Self::Spawn {
            message: message.into(),
            source: None,
        }
    }

    /// Create a Spawn error wrapping the OS error
    pub fn spawn_with_source(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            message: message.into(),
            source: Some(source),
        }
    }

    /// True when the error only reflects a shutdown request, not an agent failure
    pub fn is_shutdown(&self) -> bool {
        matches!(self, Self::ShutdownInProgress)
    }

    /// Exit code carried by a NonZeroExit error
    pub fn exit_code(&self) -> Option<i32> {
        match self {
            Self::NonZeroExit { code, .. } => *code,
            _ => None,
        }
    }
}

impl From<notify::Error> for WiggumError {
    fn from(err: notify::Error) -> Self {
        Self::Watch(err.to_string())
    }
}

/// Result type alias for Wiggum operations
pub type Result<T> = std::result::Result<T, WiggumError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spawn_error() {
        let err = WiggumError::spawn("claude not found");
        assert_eq!(err.to_string(), "Failed to spawn agent: claude not found");
    }

    #[test]
    fn test_spawn_error_keeps_source() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "no such file");
        let err = WiggumError::spawn_with_source("claude", io_err);
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_non_zero_exit_error() {
        let err = WiggumError::NonZeroExit {
            code: Some(7),
            stderr: "boom".to_string(),
        };
        assert_eq!(err.to_string(), "Agent exited with code Some(7): boom");
        assert_eq!(err.exit_code(), Some(7));
    }

    #[test]
    fn test_shutdown_is_distinguishable() {
        assert!(WiggumError::ShutdownInProgress.is_shutdown());
        assert!(!WiggumError::spawn("x").is_shutdown());
        assert_eq!(WiggumError::ShutdownInProgress.exit_code(), None);
    }

    #[test]
    fn test_busy_error() {
        let err = WiggumError::Busy(4242);
        assert!(err.to_string().contains("4242"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: WiggumError = io_err.into();
        assert!(matches!(err, WiggumError::Io(_)));
        assert!(err.to_string().contains("file not found"));
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid").unwrap_err();
        let err: WiggumError = json_err.into();
        assert!(matches!(err, WiggumError::Json(_)));
    }
}
