//! Incremental fetch windows

use chrono::{Days, NaiveDate};
use std::fmt::Display;

/// An inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateWindow {
    /// Returns `None` for an empty range.
    pub fn new(start: NaiveDate, end: NaiveDate) -> Option<Self> {
        (start <= end).then_some(Self { start, end })
    }

    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }

    pub fn num_days(&self) -> i64 {
        (self.end - self.start).num_days() + 1
    }
}

impl Display for DateWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// Computes the range still missing from the store for one series.
///
/// Starts the day after the latest stored observation, or at the competition
/// start for a series with no history, and ends today. Skipped runs widen the
/// window; a second run on the same day yields `None`.
pub fn fetch_window(
    latest_stored: Option<NaiveDate>,
    competition_start: NaiveDate,
    today: NaiveDate,
) -> Option<DateWindow> {
    let start = match latest_stored {
        Some(latest) => latest.checked_add_days(Days::new(1))?,
        None => competition_start,
    };
    DateWindow::new(start, today)
}

/// Last day whose closes are final as of `today`.
///
/// Today's bar keeps moving until its session closes and a stored row is never
/// rewritten, so update windows stop the day before.
pub fn last_settled_day(today: NaiveDate) -> Option<NaiveDate> {
    today.checked_sub_days(Days::new(1))
}
