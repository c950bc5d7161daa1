//! Window arithmetic over one schedule's repeat grid.

use chrono::{DateTime, Duration, Utc};

use cadence_core::Period;

/// The sequence of back-to-back windows `[origin + i·step, origin + (i+1)·step)`.
#[derive(Debug, Clone, Copy)]
pub(super) struct WindowGrid {
    origin: DateTime<Utc>,
    step_ms: i64,
    repeat_minutes: i64,
}

impl WindowGrid {
    /// `None` unless `repeat_minutes` is positive and its length fits in milliseconds.
    pub(super) fn new(origin: DateTime<Utc>, repeat_minutes: i64) -> Option<Self> {
        let step_ms = repeat_minutes.checked_mul(60_000).filter(|ms| *ms > 0)?;
        Some(Self {
            origin,
            step_ms,
            repeat_minutes,
        })
    }

    /// Index of the window containing `t`, or `None` before the grid starts.
    pub(super) fn index_of(&self, t: DateTime<Utc>) -> Option<u64> {
        if t < self.origin {
            return None;
        }
        // Elapsed time is non-negative, so truncating to whole milliseconds is a floor.
        let elapsed_ms = (t - self.origin).num_milliseconds();
        Some((elapsed_ms / self.step_ms) as u64)
    }

    /// The window at `index`, or `None` if it lies outside the representable time range.
    pub(super) fn window(&self, index: u64) -> Option<Period> {
        let offset_ms = i64::try_from(index).ok()?.checked_mul(self.step_ms)?;
        let start = self
            .origin
            .checked_add_signed(Duration::try_milliseconds(offset_ms)?)?;
        Period::starting_at(start, self.repeat_minutes)
    }

    /// First window whose start is at or after `t`.
    pub(super) fn first_starting_at_or_after(&self, t: DateTime<Utc>) -> u64 {
        if t <= self.origin {
            return 0;
        }
        let elapsed_ms = (t - self.origin).num_milliseconds();
        let mut index = (elapsed_ms / self.step_ms) as u64;
        while self.window(index).is_some_and(|w| w.start < t) {
            index += 1;
        }
        index
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;

    fn grid() -> (DateTime<Utc>, WindowGrid) {
        let origin = Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap();
        (origin, WindowGrid::new(origin, 60).unwrap())
    }

    #[test]
    fn boundaries_belong_to_the_next_window() {
        let (origin, g) = grid();
        assert_eq!(g.index_of(origin), Some(0));
        assert_eq!(g.index_of(origin + Duration::minutes(60) - Duration::nanoseconds(1)), Some(0));
        assert_eq!(g.index_of(origin + Duration::minutes(60)), Some(1));
        assert_eq!(g.index_of(origin - Duration::seconds(1)), None);
    }

    #[test]
    fn window_of_index_contains_its_instants() {
        let (origin, g) = grid();
        let w = g.window(3).unwrap();
        assert_eq!(w.start, origin + Duration::minutes(180));
        assert_eq!(w.expiry, origin + Duration::minutes(240));
        assert_eq!(g.index_of(w.start), Some(3));
    }

    #[test]
    fn first_start_rounds_up() {
        let (origin, g) = grid();
        assert_eq!(g.first_starting_at_or_after(origin - Duration::days(1)), 0);
        assert_eq!(g.first_starting_at_or_after(origin + Duration::minutes(60)), 1);
        assert_eq!(g.first_starting_at_or_after(origin + Duration::minutes(61)), 2);
        assert_eq!(g.first_starting_at_or_after(origin + Duration::milliseconds(1)), 1);
    }

    #[test]
    fn oversized_steps_are_refused() {
        let (origin, g) = grid();
        assert!(WindowGrid::new(origin, i64::MAX).is_none());
        assert!(WindowGrid::new(origin, 0).is_none());
        assert!(g.window(u64::MAX).is_none());
    }
}
