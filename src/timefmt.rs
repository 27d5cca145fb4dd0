//! Millisecond timestamp helpers.
//!
//! Segment files and queries work in integer milliseconds since the Unix
//! epoch (UTC). These helpers convert to and from the human-facing forms
//! used by the inspection binary and by `list_files()`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, TimeZone, Utc};

use crate::error::{HistoryError, Result};

/// Accepted datetime layouts, tried in order. `%.f` also matches an absent
/// fractional part.
const DATETIME_FORMATS: [&str; 2] = ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Convert milliseconds since epoch to a UTC datetime.
///
/// Returns `None` if the value is outside chrono's representable range.
pub fn to_datetime(ms: i64) -> Option<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms).single()
}

/// Format milliseconds since epoch as RFC 3339 with millisecond precision,
/// e.g. `2024-02-07T15:00:00.000Z`.
///
/// Values chrono cannot represent are rendered as the raw integer.
pub fn format_millis(ms: i64) -> String {
    match to_datetime(ms) {
        Some(dt) => dt.to_rfc3339_opts(SecondsFormat::Millis, true),
        None => ms.to_string(),
    }
}

/// Parse a query timestamp into milliseconds since epoch (UTC).
///
/// Accepts:
/// - raw integer milliseconds (`1707318000000`)
/// - a date (`2024-02-07`), meaning midnight UTC
/// - a naive datetime (`2024-02-07T15:00:00`, optionally `.123` fractional
///   seconds, `T` or space separated), interpreted as UTC
/// - a full RFC 3339 string with offset (`2024-02-07T16:00:00+01:00`)
pub fn parse_timestamp(input: &str) -> Result<i64> {
    let s = input.trim();

    if let Ok(ms) = s.parse::<i64>() {
        return Ok(ms);
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp_millis());
    }

    for fmt in DATETIME_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(Utc.from_utc_datetime(&naive).timestamp_millis());
        }
    }

    Err(HistoryError::InvalidTimestamp(input.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_millis() {
        assert_eq!(format_millis(0), "1970-01-01T00:00:00.000Z");
        assert_eq!(format_millis(1_707_318_000_123), "2024-02-07T15:00:00.123Z");
    }

    #[test]
    fn test_format_out_of_range_falls_back_to_integer() {
        assert_eq!(format_millis(i64::MAX), i64::MAX.to_string());
    }

    #[test]
    fn test_parse_raw_millis() {
        assert_eq!(parse_timestamp("1707318000000").unwrap(), 1_707_318_000_000);
        assert_eq!(parse_timestamp(" 42 ").unwrap(), 42);
    }

    #[test]
    fn test_parse_date_only() {
        assert_eq!(parse_timestamp("1970-01-02").unwrap(), 86_400_000);
    }

    #[test]
    fn test_parse_naive_datetime() {
        assert_eq!(
            parse_timestamp("2024-02-07T15:00:00").unwrap(),
            1_707_318_000_000
        );
        assert_eq!(
            parse_timestamp("2024-02-07 15:00:00.5").unwrap(),
            1_707_318_000_500
        );
    }

    #[test]
    fn test_parse_rfc3339_with_offset() {
        assert_eq!(
            parse_timestamp("2024-02-07T16:00:00+01:00").unwrap(),
            1_707_318_000_000
        );
    }

    #[test]
    fn test_round_trip_through_format() {
        let ms = 1_707_318_300_250;
        assert_eq!(parse_timestamp(&format_millis(ms)).unwrap(), ms);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        let err = parse_timestamp("yesterday").unwrap_err();
        assert!(matches!(err, HistoryError::InvalidTimestamp(_)));
    }
}
