//! Poll window planning.
//!
//! Each window reaches back `overlap` millis past the end of the previous
//! one, so a message landing on a cycle boundary is queried twice and
//! relies on dedup rather than being lost.

use crate::types::PollWindow;

/// Compute the window for the next poll cycle.
///
/// `query_end_millis` is `now_millis`;
/// `query_start_millis = last_cycle_end_millis - overlap_millis`.
/// For the first cycle, pass the engine start time as
/// `last_cycle_end_millis`.
pub fn next_window(last_cycle_end_millis: i64, overlap_millis: u64, now_millis: i64) -> PollWindow {
    let overlap = i64::try_from(overlap_millis).unwrap_or(i64::MAX);
    PollWindow {
        query_start_millis: last_cycle_end_millis.saturating_sub(overlap),
        query_end_millis: now_millis,
    }
}

/// Tracks the end of the last completed cycle and plans windows from it.
#[derive(Debug, Clone)]
pub struct PollWindowPlanner {
    overlap_millis: u64,
    last_cycle_end_millis: i64,
}

impl PollWindowPlanner {
    /// Start planning from `start_millis` (engine start time).
    pub fn new(start_millis: i64, overlap_millis: u64) -> Self {
        Self {
            overlap_millis,
            last_cycle_end_millis: start_millis,
        }
    }

    /// Window for a cycle beginning at `now_millis`
    pub fn plan(&self, now_millis: i64) -> PollWindow {
        next_window(self.last_cycle_end_millis, self.overlap_millis, now_millis)
    }

    /// Record that a cycle which began at `cycle_time_millis` completed.
    pub fn complete_cycle(&mut self, cycle_time_millis: i64) {
        self.last_cycle_end_millis = cycle_time_millis;
    }

    /// End of the last completed cycle
    pub fn last_cycle_end_millis(&self) -> i64 {
        self.last_cycle_end_millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_window_looks_back_by_overlap() {
        let planner = PollWindowPlanner::new(5000, 5000);
        assert_eq!(
            planner.plan(5000),
            PollWindow {
                query_start_millis: 0,
                query_end_millis: 5000,
            }
        );
    }

    #[test]
    fn test_window_starts_before_previous_end() {
        let mut planner = PollWindowPlanner::new(5000, 5000);
        planner.complete_cycle(5000);

        let window = planner.plan(10_000);
        assert_eq!(window.query_start_millis, 0);
        assert_eq!(window.query_end_millis, 10_000);

        planner.complete_cycle(10_000);
        let window = planner.plan(15_000);
        assert_eq!(window.query_start_millis, 5000);
    }

    #[test]
    fn test_consecutive_windows_overlap() {
        let overlap = 2000;
        let first = next_window(0, overlap, 10_000);
        let second = next_window(first.query_end_millis, overlap, 20_000);

        let boundary_message = first.query_end_millis - overlap as i64 / 2;
        assert!(first.contains(boundary_message));
        assert!(second.contains(boundary_message));
    }

    #[test]
    fn test_zero_overlap() {
        let window = next_window(7000, 0, 9000);
        assert_eq!(window.query_start_millis, 7000);
    }

    #[test]
    fn test_window_saturates() {
        let window = next_window(i64::MIN + 1, u64::MAX, 0);
        assert_eq!(window.query_start_millis, i64::MIN);
    }
}
