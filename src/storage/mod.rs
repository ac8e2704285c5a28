//! Storage layer for iteration logs.
//!
//! This module provides:
//! - LogSink: destination for raw agent output and iteration records
//! - FileLogSink: append-only files under the workspace logs directory
//! - NullLogSink: discards everything

pub mod log_sink;

pub use log_sink::{FileLogSink, IterationLogRecord, LogSink, NullLogSink, OutputStream};
