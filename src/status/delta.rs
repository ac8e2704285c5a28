//! Differences between two status snapshots.

use serde::Serialize;

use super::record::StatusRecord;

/// What changed between two snapshots. Derived, never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusDelta {
    pub progress_changed: bool,
    pub completed_delta: i64,
    pub total_delta: i64,
    pub completion_status_changed: bool,
    pub summary_changed: bool,
}

impl StatusDelta {
    /// Compute the delta from `previous` (None for the first snapshot) to `current`
    pub fn between(previous: Option<&StatusRecord>, current: &StatusRecord) -> Self {
        let prev_progress = previous.and_then(|p| p.progress).unwrap_or_default();
        let cur_progress = current.progress.unwrap_or_default();

        let completed_delta = i64::from(cur_progress.completed) - i64::from(prev_progress.completed);
        let total_delta = i64::from(cur_progress.total) - i64::from(prev_progress.total);

        Self {
            progress_changed: completed_delta != 0 || total_delta != 0,
            completed_delta,
            total_delta,
            completion_status_changed: previous.map(|p| p.complete) != Some(current.complete),
            summary_changed: previous.map(|p| &p.summary) != Some(&current.summary),
        }
    }

    /// True if any meaningful field changed
    pub fn is_meaningful(&self) -> bool {
        self.progress_changed || self.completion_status_changed || self.summary_changed
    }
}

/// Decide whether a new snapshot is worth an event.
///
/// The first snapshot always is. After that, with `only_meaningful` set,
/// only progress, completion or summary changes count; a rewrite that only
/// bumps `lastUpdated` does not.
pub fn has_significant_change(previous: Option<&StatusRecord>, current: &StatusRecord, only_meaningful: bool) -> bool {
    match previous {
        None => true,
        Some(_) if !only_meaningful => true,
        Some(_) => StatusDelta::between(previous, current).is_meaningful(),
    }
}
