//! Per-run iteration state. Reset on every run, never persisted.

/// Counters and flags the controller carries between iterations
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IterationState {
    /// Iterations finished so far
    pub iteration: u32,
    /// Consecutive iterations that reported `worked: false`
    pub no_work_streak: u32,
    pub complete: bool,
    /// Completion was forced by the stagnation threshold
    pub stagnated: bool,
    pub shutdown_requested: bool,
}

impl IterationState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply the `worked` flag from the latest status record.
    ///
    /// `None` leaves the streak unchanged. Returns true once the streak
    /// reaches `threshold`; a threshold of 0 never trips.
    pub fn record_work(&mut self, worked: Option<bool>, threshold: u32) -> bool {
        match worked {
            Some(true) => self.no_work_streak = 0,
            Some(false) => self.no_work_streak += 1,
            None => {}
        }
        threshold > 0 && self.no_work_streak >= threshold
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streak_trips_at_threshold() {
        let mut state = IterationState::new();
        assert!(!state.record_work(Some(false), 2));
        assert!(state.record_work(Some(false), 2));
        assert_eq!(state.no_work_streak, 2);
    }

    #[test]
    fn test_work_resets_streak() {
        let mut state = IterationState::new();
        state.record_work(Some(false), 3);
        state.record_work(Some(false), 3);
        assert!(!state.record_work(Some(true), 3));
        assert_eq!(state.no_work_streak, 0);
    }

    #[test]
    fn test_missing_flag_keeps_streak() {
        let mut state = IterationState::new();
        state.record_work(Some(false), 2);
        assert!(!state.record_work(None, 2));
        assert_eq!(state.no_work_streak, 1);
    }

    #[test]
    fn test_zero_threshold_disables() {
        let mut state = IterationState::new();
        for _ in 0..5 {
            assert!(!state.record_work(Some(false), 0));
        }
    }
}
