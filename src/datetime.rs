//! Date/time utilities for gator.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
use thiserror::Error;

/// Layout of the reassembled `year-month-day` publication date.
const PUB_DATE_LAYOUT: &str = "%Y-%b-%d";

/// Error returned when a feed publication date cannot be normalized.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DateError {
    /// The input does not look like `<weekday>, <day> <month> <year> ...`.
    #[error("malformed publication date: {0:?}")]
    Malformed(String),
}

/// Normalize a feed publication date to a UTC timestamp.
///
/// The input is expected in the usual RSS form, e.g.
/// `Sun, 03 Dec 2023 00:00:00 +0000`. Only the day, month and year tokens
/// are used; the time of day and the offset are dropped and the result is
/// midnight UTC of that calendar date.
pub fn normalize_pub_date(raw: &str) -> Result<DateTime<Utc>, DateError> {
    let tokens: Vec<&str> = raw.split_whitespace().collect();
    if tokens.len() < 4 {
        return Err(DateError::Malformed(raw.to_string()));
    }

    let (day, month, year) = (tokens[1], tokens[2], tokens[3]);
    let reassembled = format!("{year}-{month}-{day}");

    NaiveDate::parse_from_str(&reassembled, PUB_DATE_LAYOUT)
        .map(|date| date.and_time(NaiveTime::MIN).and_utc())
        .map_err(|_| DateError::Malformed(raw.to_string()))
}

/// Format a timestamp for storage.
///
/// Fixed width with microsecond precision, so text ordering in the
/// database matches chronological ordering.
pub fn to_db_timestamp(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp (RFC3339, or the plain SQLite datetime format).
pub fn parse_db_timestamp(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| naive.and_utc())
}

/// Format an optional timestamp for plain-text listings.
pub fn format_listing_date(dt: Option<&DateTime<Utc>>) -> String {
    dt.map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, TimeZone, Timelike};

    #[test]
    fn test_normalize_pub_date_keeps_calendar_date() {
        let dt = normalize_pub_date("Sun, 03 Dec 2023 00:00:00 +0000").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2023, 12, 3, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize_pub_date_discards_time_and_offset() {
        // Lossy on purpose: 23:59 at -08:00 is already the next day in UTC,
        // but only the written calendar date survives.
        let dt = normalize_pub_date("Mon, 01 Jan 2024 23:59:59 -0800").unwrap();
        assert_eq!((dt.year(), dt.month(), dt.day()), (2024, 1, 1));
        assert_eq!((dt.hour(), dt.minute(), dt.second()), (0, 0, 0));
    }

    #[test]
    fn test_normalize_pub_date_without_time() {
        let dt = normalize_pub_date("Fri, 9 Feb 2024").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 2, 9, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize_pub_date_extra_whitespace() {
        let dt = normalize_pub_date("  Tue,  05   Mar 2024 10:00:00 GMT ").unwrap();
        assert_eq!(dt, Utc.with_ymd_and_hms(2024, 3, 5, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_normalize_pub_date_too_few_tokens() {
        assert_eq!(
            normalize_pub_date("03 Dec 2023"),
            Err(DateError::Malformed("03 Dec 2023".to_string()))
        );
        assert!(normalize_pub_date("").is_err());
    }

    #[test]
    fn test_normalize_pub_date_invalid_tokens() {
        assert!(normalize_pub_date("Sun, 31 Feb 2023 00:00:00 +0000").is_err());
        assert!(normalize_pub_date("Sun, 03 Foo 2023 00:00:00 +0000").is_err());
        assert!(normalize_pub_date("2023-12-03T00:00:00Z and more").is_err());
    }

    #[test]
    fn test_db_timestamp_is_fixed_width() {
        let a = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let b = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 1).unwrap();
        assert_eq!(to_db_timestamp(&a), "2024-01-01T00:00:00.000000Z");
        assert_eq!(to_db_timestamp(&a).len(), to_db_timestamp(&b).len());
        assert!(to_db_timestamp(&a) < to_db_timestamp(&b));
    }

    #[test]
    fn test_parse_db_timestamp() {
        let dt = Utc.with_ymd_and_hms(2024, 6, 30, 12, 15, 0).unwrap();
        assert_eq!(parse_db_timestamp(&to_db_timestamp(&dt)), Some(dt));
        assert_eq!(parse_db_timestamp("2024-06-30 12:15:00"), Some(dt));
        assert_eq!(parse_db_timestamp("invalid"), None);
    }

    #[test]
    fn test_format_listing_date() {
        let dt = Utc.with_ymd_and_hms(2023, 12, 3, 8, 0, 0).unwrap();
        assert_eq!(format_listing_date(Some(&dt)), "2023-12-03");
        assert_eq!(format_listing_date(None), "unknown");
    }
}
