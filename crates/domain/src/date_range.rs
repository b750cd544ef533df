use chrono::{DateTime, Days, NaiveDate};
use evidex_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};

/// Inclusive calendar-date window used to scope evidence archival and purge runs.
///
/// Both ends are inclusive. Storage queries use the half-open interval
/// `[start, end + 1 day)` produced by [`EvidenceDateRange::exclusive_upper_bound`],
/// for backups and deletions alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvidenceDateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl EvidenceDateRange {
    /// Longest window a single request may span.
    pub const MAX_SPAN_DAYS: i64 = 365;

    /// Creates a validated request window.
    ///
    /// `start` must be strictly before `end`, `end` must not be after `today`
    /// and the span must not exceed [`Self::MAX_SPAN_DAYS`].
    pub fn new(start: NaiveDate, end: NaiveDate, today: NaiveDate) -> AppResult<Self> {
        if start >= end {
            return Err(AppError::Validation(
                "start date must be earlier than end date".to_owned(),
            ));
        }

        if end > today {
            return Err(AppError::Validation(
                "end date must not be in the future".to_owned(),
            ));
        }

        if (end - start).num_days() > Self::MAX_SPAN_DAYS {
            return Err(AppError::Validation(format!(
                "date range must not exceed {} days",
                Self::MAX_SPAN_DAYS
            )));
        }

        Ok(Self { start, end })
    }

    /// Parses and validates a window from transport values.
    pub fn parse(start: Option<&str>, end: Option<&str>, today: NaiveDate) -> AppResult<Self> {
        let (Some(start), Some(end)) = (non_blank(start), non_blank(end)) else {
            return Err(AppError::Validation(
                "start date and end date are required".to_owned(),
            ));
        };

        Self::new(parse_date(start)?, parse_date(end)?, today)
    }

    /// Rebuilds a window from persisted values without request validation.
    #[must_use]
    pub fn from_stored(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Returns the inclusive first day.
    #[must_use]
    pub fn start(&self) -> NaiveDate {
        self.start
    }

    /// Returns the inclusive last day.
    #[must_use]
    pub fn end(&self) -> NaiveDate {
        self.end
    }

    /// Returns the first day after the window, for `< bound` queries.
    #[must_use]
    pub fn exclusive_upper_bound(&self) -> NaiveDate {
        self.end.checked_add_days(Days::new(1)).unwrap_or(self.end)
    }

    /// Returns whether `other` lies entirely within this window.
    #[must_use]
    pub fn covers(&self, other: &Self) -> bool {
        self.start <= other.start && other.end <= self.end
    }

    /// Returns whether `date` falls inside the window.
    #[must_use]
    pub fn contains_date(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.end
    }
}

impl std::fmt::Display for EvidenceDateRange {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "{}..={}", self.start, self.end)
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|value| !value.is_empty())
}

fn parse_date(value: &str) -> AppResult<NaiveDate> {
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Ok(date);
    }

    DateTime::parse_from_rfc3339(value)
        .map(|timestamp| timestamp.date_naive())
        .map_err(|_| AppError::Validation(format!("invalid date '{value}', expected YYYY-MM-DD")))
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;
    use proptest::prelude::*;

    use super::EvidenceDateRange;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap_or_default()
    }

    fn today() -> NaiveDate {
        date(2025, 6, 1)
    }

    #[test]
    fn missing_dates_are_rejected() {
        let result = EvidenceDateRange::parse(None, Some("2024-03-01"), today());
        assert!(result.is_err());

        let result = EvidenceDateRange::parse(Some("  "), Some("2024-03-01"), today());
        assert!(result.is_err());
    }

    #[test]
    fn start_must_precede_end() {
        let same_day = EvidenceDateRange::new(date(2024, 3, 1), date(2024, 3, 1), today());
        let inverted = EvidenceDateRange::new(date(2024, 3, 2), date(2024, 3, 1), today());

        for result in [same_day, inverted] {
            let Err(error) = result else {
                panic!("inverted range must be rejected");
            };
            assert!(error.to_string().contains("earlier than end date"));
        }
    }

    #[test]
    fn future_end_date_is_rejected() {
        let result = EvidenceDateRange::new(date(2025, 5, 1), date(2025, 6, 2), today());
        assert!(result.is_err());
    }

    #[test]
    fn span_longer_than_a_year_is_rejected() {
        let result = EvidenceDateRange::new(date(2023, 1, 1), date(2024, 1, 3), today());
        assert!(result.is_err());

        let result = EvidenceDateRange::new(date(2023, 1, 1), date(2024, 1, 1), today());
        assert!(result.is_ok());
    }

    #[test]
    fn parses_rfc3339_timestamps_as_dates() {
        let result = EvidenceDateRange::parse(
            Some("2024-01-01T00:00:00Z"),
            Some("2024-03-01"),
            today(),
        );
        assert_eq!(
            result.map(|range| range.start()).ok(),
            Some(date(2024, 1, 1))
        );
    }

    #[test]
    fn yearly_backup_covers_first_quarter_only_when_it_starts_early_enough() {
        let full_year = EvidenceDateRange::from_stored(date(2024, 1, 1), date(2024, 12, 31));
        let second_half = EvidenceDateRange::from_stored(date(2024, 6, 1), date(2024, 12, 31));
        let request = EvidenceDateRange::from_stored(date(2024, 1, 1), date(2024, 3, 1));

        assert!(full_year.covers(&request));
        assert!(!second_half.covers(&request));
    }

    #[test]
    fn exclusive_upper_bound_is_day_after_end() {
        let range = EvidenceDateRange::from_stored(date(2024, 1, 1), date(2024, 2, 29));
        assert_eq!(range.exclusive_upper_bound(), date(2024, 3, 1));
    }

    proptest! {
        #[test]
        fn every_range_covers_itself_and_its_days(start in 0_i64..3_000, span in 1_i64..365) {
            let base = date(2015, 1, 1);
            let start = base + chrono::Duration::days(start);
            let end = start + chrono::Duration::days(span);
            let range = EvidenceDateRange::from_stored(start, end);

            prop_assert!(range.covers(&range));
            prop_assert!(range.contains_date(start));
            prop_assert!(range.contains_date(end));
            prop_assert!(!range.contains_date(range.exclusive_upper_bound()));
        }

        #[test]
        fn coverage_requires_both_bounds(offset in 1_i64..100) {
            let backup = EvidenceDateRange::from_stored(date(2024, 1, 1), date(2024, 12, 31));
            let earlier_start = EvidenceDateRange::from_stored(
                date(2024, 1, 1) - chrono::Duration::days(offset),
                date(2024, 6, 1),
            );
            let later_end = EvidenceDateRange::from_stored(
                date(2024, 6, 1),
                date(2024, 12, 31) + chrono::Duration::days(offset),
            );

            prop_assert!(!backup.covers(&earlier_start));
            prop_assert!(!backup.covers(&later_end));
        }
    }
}
