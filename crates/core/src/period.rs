use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Inclusive calendar-date range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl fmt::Display for DateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} to {}", self.start, self.end)
    }
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        DateRange { start, end }
    }

    /// Smallest range covering every date, or `None` for an empty input.
    pub fn spanning<I: IntoIterator<Item = NaiveDate>>(dates: I) -> Option<Self> {
        dates.into_iter().fold(None, |range, date| match range {
            None => Some(DateRange::new(date, date)),
            Some(r) => Some(DateRange::new(r.start.min(date), r.end.max(date))),
        })
    }

    /// Widens the range by `days` on each side, clamping at the calendar bounds.
    pub fn expand(self, days: u64) -> Self {
        DateRange {
            start: self.start.checked_sub_days(Days::new(days)).unwrap_or(NaiveDate::MIN),
            end: self.end.checked_add_days(Days::new(days)).unwrap_or(NaiveDate::MAX),
        }
    }

    pub fn contains(self, date: NaiveDate) -> bool {
        date >= self.start && date <= self.end
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    #[test]
    fn date_range_contains() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 12, 31));
        assert!(range.contains(d(2024, 6, 15)));
        assert!(range.contains(d(2024, 1, 1))); // inclusive start
        assert!(range.contains(d(2024, 12, 31))); // inclusive end
        assert!(!range.contains(d(2023, 12, 31)));
        assert!(!range.contains(d(2025, 1, 1)));
    }

    #[test]
    fn date_range_display() {
        let range = DateRange::new(d(2024, 1, 1), d(2024, 12, 31));
        assert_eq!(range.to_string(), "2024-01-01 to 2024-12-31");
    }

    #[test]
    fn spanning_picks_min_and_max() {
        let range = DateRange::spanning([d(2024, 2, 10), d(2024, 2, 1), d(2024, 2, 5)]).unwrap();
        assert_eq!(range, DateRange::new(d(2024, 2, 1), d(2024, 2, 10)));
        assert!(DateRange::spanning(Vec::new()).is_none());
    }

    #[test]
    fn expand_crosses_month_boundaries() {
        let range = DateRange::new(d(2024, 3, 1), d(2024, 3, 31)).expand(1);
        assert_eq!(range, DateRange::new(d(2024, 2, 29), d(2024, 4, 1)));
    }
}
