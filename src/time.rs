//! Wikibase time values.
//!
//! Wikibase stores points in time as a signed ISO-8601-like string
//! (`+2001-12-31T00:00:00Z`) plus a precision code. The string is the
//! store-agnostic part and is copied verbatim between stores.

use std::fmt;

use chrono::{Datelike, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Precision code for a day.
pub const PRECISION_DAY: u8 = 11;
/// Precision code for a year.
pub const PRECISION_YEAR: u8 = 9;

/// A point in time with Wikibase precision.
///
/// # Examples
///
/// ```
/// use chrono::NaiveDate;
/// use wikifed::WbTime;
///
/// let date = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
/// let t = WbTime::from_date(date);
/// assert_eq!(t.time, "+2024-03-09T00:00:00Z");
/// assert_eq!(t.to_date(), Some(date));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WbTime {
    /// Signed timestamp string.
    pub time: String,

    /// Precision code (9 = year, 10 = month, 11 = day).
    #[serde(default = "default_precision")]
    pub precision: u8,
}

const fn default_precision() -> u8 {
    PRECISION_DAY
}

impl WbTime {
    /// Creates a time value from a timestamp string and precision.
    #[must_use]
    pub fn new(time: impl Into<String>, precision: u8) -> Self {
        Self {
            time: time.into(),
            precision,
        }
    }

    /// Day-precision value for a calendar date.
    #[must_use]
    pub fn from_date(date: NaiveDate) -> Self {
        Self {
            time: format!(
                "+{:04}-{:02}-{:02}T00:00:00Z",
                date.year(),
                date.month(),
                date.day()
            ),
            precision: PRECISION_DAY,
        }
    }

    /// Day-precision value for today's date in UTC.
    #[must_use]
    pub fn today() -> Self {
        Self::from_date(Utc::now().date_naive())
    }

    /// Calendar date of the timestamp, if it is a positive year with a
    /// concrete month and day.
    #[must_use]
    pub fn to_date(&self) -> Option<NaiveDate> {
        let body = self.time.strip_prefix('+')?;
        let date_part = body.split('T').next()?;
        NaiveDate::parse_from_str(date_part, "%Y-%m-%d").ok()
    }
}

impl fmt::Display for WbTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_date_pads_fields() {
        let t = WbTime::from_date(NaiveDate::from_ymd_opt(987, 1, 2).unwrap());
        assert_eq!(t.time, "+0987-01-02T00:00:00Z");
        assert_eq!(t.precision, PRECISION_DAY);
    }

    #[test]
    fn test_to_date_handles_year_precision() {
        // Year-precision values use 00 for month and day.
        let t = WbTime::new("+1952-00-00T00:00:00Z", PRECISION_YEAR);
        assert_eq!(t.to_date(), None);

        let t = WbTime::new("-0500-01-01T00:00:00Z", PRECISION_DAY);
        assert_eq!(t.to_date(), None);
    }

    #[test]
    fn test_today_round_trips() {
        let t = WbTime::today();
        assert!(t.to_date().is_some());
        assert_eq!(t.precision, PRECISION_DAY);
    }

    #[test]
    fn test_precision_defaults_to_day() {
        let t: WbTime = serde_json::from_str(r#"{"time":"+2001-12-31T00:00:00Z"}"#).unwrap();
        assert_eq!(t.precision, PRECISION_DAY);
        assert_eq!(t.to_string(), "+2001-12-31T00:00:00Z");
    }
}
