//! Iteration log sink.
//!
//! Raw agent output goes to `iterations.log`; structured start / complete /
//! error records go to `iterations.jsonl`, one JSON object per line.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::error::Result;

const RAW_LOG_FILE: &str = "iterations.log";
const RECORD_LOG_FILE: &str = "iterations.jsonl";

/// Which pipe a raw chunk came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// One structured log line
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IterationLogRecord {
    IterationStart {
        iteration: u32,
        timestamp: DateTime<Utc>,
    },
    IterationComplete {
        iteration: u32,
        timestamp: DateTime<Utc>,
        duration_ms: i64,
        output_bytes: usize,
        exit_lost: bool,
    },
    IterationError {
        iteration: u32,
        timestamp: DateTime<Utc>,
        duration_ms: i64,
        message: String,
    },
}

impl IterationLogRecord {
    pub fn start(iteration: u32) -> Self {
        Self::IterationStart {
            iteration,
            timestamp: Utc::now(),
        }
    }

    pub fn complete(iteration: u32, started: DateTime<Utc>, output_bytes: usize, exit_lost: bool) -> Self {
        let timestamp = Utc::now();
        Self::IterationComplete {
            iteration,
            timestamp,
            duration_ms: (timestamp - started).num_milliseconds(),
            output_bytes,
            exit_lost,
        }
    }

    pub fn error(iteration: u32, started: DateTime<Utc>, message: impl Into<String>) -> Self {
        let timestamp = Utc::now();
        Self::IterationError {
            iteration,
            timestamp,
            duration_ms: (timestamp - started).num_milliseconds(),
            message: message.into(),
        }
    }

    pub fn iteration(&self) -> u32 {
        match self {
            Self::IterationStart { iteration, .. }
            | Self::IterationComplete { iteration, .. }
            | Self::IterationError { iteration, .. } => *iteration,
        }
    }
}

/// Destination for agent output and iteration records.
///
/// Implementations must never fail the caller; write problems are theirs.
pub trait LogSink: Send + Sync {
    fn raw(&self, stream: OutputStream, chunk: &str);

    fn record(&self, record: &IterationLogRecord);
}

/// Discards everything
#[derive(Debug, Default)]
pub struct NullLogSink;

impl LogSink for NullLogSink {
    fn raw(&self, _stream: OutputStream, _chunk: &str) {}

    fn record(&self, _record: &IterationLogRecord) {}
}

struct SinkWriters {
    raw: Box<dyn Write + Send>,
    records: Box<dyn Write + Send>,
}

/// File-backed sink. Disables itself after the first write error.
pub struct FileLogSink {
    writers: Mutex<Option<SinkWriters>>,
}

impl FileLogSink {
    /// Open (appending) the log files in `dir`, creating it if needed
    pub fn open(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)?;
        let open = |name: &str| OpenOptions::new().create(true).append(true).open(dir.join(name));
        let raw = open(RAW_LOG_FILE)?;
        let records = open(RECORD_LOG_FILE)?;
        Ok(Self::from_writers(Box::new(raw), Box::new(records)))
    }

    pub fn from_writers(raw: Box<dyn Write + Send>, records: Box<dyn Write + Send>) -> Self {
        Self {
            writers: Mutex::new(Some(SinkWriters { raw, records })),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.writers.lock().map(|w| w.is_some()).unwrap_or(false)
    }

    fn write_with(&self, write: impl FnOnce(&mut SinkWriters) -> io::Result<()>) {
        let Ok(mut guard) = self.writers.lock() else {
            return;
        };
        let Some(writers) = guard.as_mut() else {
            return;
        };
        if let Err(e) = write(writers) {
            log::warn!("Iteration log disabled after write error: {}", e);
            *guard = None;
        }
    }
}

impl LogSink for FileLogSink {
    fn raw(&self, stream: OutputStream, chunk: &str) {
        self.write_with(|w| match stream {
            OutputStream::Stdout => w.raw.write_all(chunk.as_bytes()),
            OutputStream::Stderr => {
                for line in chunk.lines() {
                    writeln!(w.raw, "[stderr] {}", line)?;
                }
                Ok(())
            }
        });
    }

    fn record(&self, record: &IterationLogRecord) {
        self.write_with(|w| {
            let line = serde_json::to_string(record).map_err(io::Error::other)?;
            writeln!(w.records, "{}", line)?;
            w.records.flush()?;
            if let IterationLogRecord::IterationStart { iteration, timestamp } = record {
                writeln!(w.raw, "\n=== iteration {} started {} ===", iteration, timestamp.to_rfc3339())?;
            }
            w.raw.flush()
        });
    }
}
