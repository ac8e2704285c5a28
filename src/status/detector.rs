//! Completion detection from the status file and the fallback task list.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::record::StatusRecord;
use crate::domain::WorkMode;

/// Marker an agent writes into the task list when it has no status file
pub const DEFAULT_COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

static CHECKLIST_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*[-*]\s+\[( |x|X)\]").expect("checklist regex"));

static REMAINING_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)remaining:\s*(\d+)").expect("remaining regex"));

/// Checked / unchecked counts of a markdown checklist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChecklistCounts {
    pub checked: u32,
    pub unchecked: u32,
}

impl ChecklistCounts {
    pub fn parse(text: &str) -> Self {
        CHECKLIST_RE
            .captures_iter(text)
            .fold(Self::default(), |mut counts, caps| {
                if &caps[1] == " " {
                    counts.unchecked += 1;
                } else {
                    counts.checked += 1;
                }
                counts
            })
    }

    pub fn total(&self) -> u32 {
        self.checked + self.unchecked
    }

    /// All items checked and at least one exists
    pub fn all_done(&self) -> bool {
        self.total() > 0 && self.unchecked == 0
    }
}

/// Reads completion state. Never writes.
#[derive(Debug, Clone)]
pub struct CompletionDetector {
    status_path: PathBuf,
    task_list_path: PathBuf,
    completion_marker: String,
}

impl CompletionDetector {
    pub fn new(status_path: impl Into<PathBuf>, task_list_path: impl Into<PathBuf>) -> Self {
        Self {
            status_path: status_path.into(),
            task_list_path: task_list_path.into(),
            completion_marker: DEFAULT_COMPLETION_MARKER.to_string(),
        }
    }

    pub fn with_completion_marker(mut self, marker: impl Into<String>) -> Self {
        self.completion_marker = marker.into();
        self
    }

    pub fn status_path(&self) -> &Path {
        &self.status_path
    }

    pub fn task_list_path(&self) -> &Path {
        &self.task_list_path
    }

    /// Current status record, default when missing or invalid
    pub fn read_status(&self) -> StatusRecord {
        StatusRecord::load(&self.status_path)
    }

    fn read_task_list(&self) -> Option<String> {
        std::fs::read_to_string(&self.task_list_path).ok()
    }

    /// Whether the work is done.
    ///
    /// Loop mode trusts a valid status record and only consults the task list
    /// marker when there is none. Iterative mode also accepts a fully checked
    /// task list.
    pub fn is_complete(&self, mode: WorkMode) -> bool {
        match mode {
            WorkMode::Loop => match StatusRecord::try_load(&self.status_path) {
                Some(record) => record.complete,
                None => self
                    .read_task_list()
                    .is_some_and(|text| text.contains(&self.completion_marker)),
            },
            WorkMode::Iterative => {
                self.read_status().complete
                    || self
                        .read_task_list()
                        .is_some_and(|text| ChecklistCounts::parse(&text).all_done())
            }
        }
    }

    /// Remaining work items, if known
    pub fn remaining_count(&self, mode: WorkMode) -> Option<u32> {
        match mode {
            WorkMode::Loop => {
                if let Some(progress) = StatusRecord::try_load(&self.status_path).and_then(|r| r.progress) {
                    return Some(progress.remaining());
                }
                let text = self.read_task_list()?;
                REMAINING_RE
                    .captures(&text)
                    .and_then(|caps| caps[1].parse().ok())
            }
            WorkMode::Iterative => self
                .read_task_list()
                .map(|text| ChecklistCounts::parse(&text).unchecked),
        }
    }
}
