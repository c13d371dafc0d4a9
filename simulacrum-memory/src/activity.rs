// Copyright 2026 Simulacrum Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Activity-day tracking
//!
//! Decay is scheduled in activity days, calendar days with recorded user
//! engagement, rather than wall-clock time. Two weeks of vacation ages
//! nothing; two weeks of daily use ages things fourteen days.

use std::collections::BTreeSet;

use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Monotonic counter of engagement days
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ActivityTracker {
    days: BTreeSet<NaiveDate>,
}

impl ActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record engagement on a specific date. Idempotent per date.
    pub fn record(&mut self, date: NaiveDate) {
        self.days.insert(date);
    }

    /// Record engagement today
    pub fn record_today(&mut self) {
        self.record(Utc::now().date_naive());
    }

    /// Current activity day: the count of distinct engagement days.
    /// Day numbering starts at 1 on the first recorded day; 0 means no
    /// activity yet.
    pub fn current_day(&self) -> u32 {
        self.days.len() as u32
    }

    /// Activity days elapsed since a recorded day number
    pub fn days_since(&self, day: u32) -> u32 {
        self.current_day().saturating_sub(day)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    #[test]
    fn test_activity_days_count_distinct_dates() {
        let mut tracker = ActivityTracker::new();
        assert_eq!(tracker.current_day(), 0);

        tracker.record(date("2026-08-01"));
        tracker.record(date("2026-08-01")); // same day, idempotent
        tracker.record(date("2026-08-02"));
        assert_eq!(tracker.current_day(), 2);
    }

    #[test]
    fn test_vacation_gap_does_not_age() {
        let mut tracker = ActivityTracker::new();
        tracker.record(date("2026-07-01"));
        let stamped = tracker.current_day();

        // A month passes with no recorded engagement: still zero days since
        assert_eq!(tracker.days_since(stamped), 0);

        // Three active days later, three days have passed
        tracker.record(date("2026-08-01"));
        tracker.record(date("2026-08-02"));
        tracker.record(date("2026-08-03"));
        assert_eq!(tracker.days_since(stamped), 3);
    }
}
