//! Departure window validation

use crate::error::{AuditError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Earliest start date accepted for an audit window
pub const EARLIEST_START: (i32, u32, u32) = (2020, 1, 1);

fn earliest_start() -> NaiveDate {
    let (year, month, day) = EARLIEST_START;
    NaiveDate::from_ymd_opt(year, month, day).unwrap_or(NaiveDate::MIN)
}

/// Date range selecting which offboarding records are in scope
///
/// `end` absent means "through `as_of`", the day the window was validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepartureWindow {
    start: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    end: Option<NaiveDate>,
    as_of: NaiveDate,
}

impl DepartureWindow {
    /// Validate a window against `today`
    ///
    /// # Errors
    ///
    /// Returns [`AuditError::Configuration`] if:
    /// - `start` is before 2020-01-01
    /// - `start` is after `today`
    /// - `end` is before `start` or after `today`
    pub fn new(start: NaiveDate, end: Option<NaiveDate>, today: NaiveDate) -> Result<Self> {
        if start < earliest_start() {
            return Err(AuditError::configuration(format!(
                "start date {} is before the earliest possible date {}",
                start,
                earliest_start()
            )));
        }

        if start > today {
            return Err(AuditError::configuration(format!(
                "start date {} is in the future",
                start
            )));
        }

        if let Some(end) = end {
            if start > end {
                return Err(AuditError::configuration(format!(
                    "start date {} is after end date {}",
                    start, end
                )));
            }

            if end > today {
                return Err(AuditError::configuration(format!(
                    "end date {} is in the future",
                    end
                )));
            }
        }

        Ok(Self {
            start,
            end,
            as_of: today,
        })
    }

    /// Parse and validate a window from `YYYYMMDD` or `YYYY-MM-DD` strings
    pub fn parse(start: &str, end: Option<&str>, today: NaiveDate) -> Result<Self> {
        let start = parse_date(start)?;
        let end = end.map(parse_date).transpose()?;
        Self::new(start, end, today)
    }

    /// Validate a window against the current UTC date
    pub fn parse_today(start: &str, end: Option<&str>) -> Result<Self> {
        Self::parse(start, end, Utc::now().date_naive())
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> Option<NaiveDate> {
        self.end
    }

    /// Day the window was validated
    pub fn as_of(&self) -> NaiveDate {
        self.as_of
    }

    /// Inclusive last day of the window
    pub fn effective_end(&self) -> NaiveDate {
        self.end.unwrap_or(self.as_of)
    }

    /// Check whether `date` falls inside the window (both ends inclusive)
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start <= date && date <= self.effective_end()
    }

    /// Start of the window as a UTC timestamp (midnight)
    pub fn since(&self) -> DateTime<Utc> {
        self.start.and_hms_opt(0, 0, 0).unwrap_or_default().and_utc()
    }
}

/// Parse `YYYYMMDD` or `YYYY-MM-DD`
pub fn parse_date(input: &str) -> Result<NaiveDate> {
    let input = input.trim();
    NaiveDate::parse_from_str(input, "%Y%m%d")
        .or_else(|_| NaiveDate::parse_from_str(input, "%Y-%m-%d"))
        .map_err(|_| {
            AuditError::configuration(format!(
                "invalid date '{}', expected YYYYMMDD or YYYY-MM-DD",
                input
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_parse_both_formats() {
        assert_eq!(parse_date("20210315").unwrap(), day(2021, 3, 15));
        assert_eq!(parse_date("2021-03-15").unwrap(), day(2021, 3, 15));
        assert!(parse_date("15/03/2021").is_err());
        assert!(parse_date("").is_err());
    }

    #[test]
    fn test_open_window_runs_through_today() {
        let today = day(2024, 6, 1);
        let window = DepartureWindow::new(day(2024, 1, 1), None, today).unwrap();

        assert_eq!(window.effective_end(), today);
        assert!(window.contains(day(2024, 1, 1)));
        assert!(window.contains(today));
        assert!(!window.contains(day(2023, 12, 31)));
        assert!(!window.contains(day(2024, 6, 2)));
    }

    #[test]
    fn test_closed_window_bounds_are_inclusive() {
        let window =
            DepartureWindow::new(day(2023, 3, 1), Some(day(2023, 3, 31)), day(2024, 1, 1)).unwrap();

        assert!(window.contains(day(2023, 3, 1)));
        assert!(window.contains(day(2023, 3, 31)));
        assert!(!window.contains(day(2023, 4, 1)));
    }

    #[test]
    fn test_since_is_midnight_utc() {
        let window = DepartureWindow::new(day(2022, 2, 2), None, day(2022, 3, 1)).unwrap();
        assert_eq!(window.since().to_rfc3339(), "2022-02-02T00:00:00+00:00");
    }

    #[test]
    fn test_end_in_future_rejected() {
        let today = day(2024, 6, 1);
        let result = DepartureWindow::new(day(2024, 1, 1), Some(day(2024, 6, 2)), today);
        assert!(matches!(result, Err(AuditError::Configuration(_))));
    }
}
