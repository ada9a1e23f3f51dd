// ⏰ Temporal helpers - one place for every time/date <-> text conversion
//
// Two kinds of time live in the database:
// 1. System time: when a row was created/updated/superseded (UTC timestamp)
// 2. Business time: the calendar date a transaction happened (no time, no zone)
//
// System timestamps are always written with microsecond precision and a literal
// `Z` suffix, so the stored strings are fixed-width and sort chronologically.

use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use rusqlite::types::Type;
use rusqlite::Row;

use crate::error::{Error, Result};

/// Calendar date format used for `transaction_date`.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

// ============================================================================
// SYSTEM TIME (UTC timestamps)
// ============================================================================

/// Current UTC time as an ISO 8601 string, e.g. `2025-12-27T10:00:00.123456Z`.
pub fn now() -> String {
    to_timestamp(Utc::now())
}

pub fn to_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn parse_timestamp(value: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Validation(format!("invalid timestamp '{}': {}", value, e)))
}

// ============================================================================
// BUSINESS TIME (calendar dates)
// ============================================================================

pub fn to_datestring(date: NaiveDate) -> String {
    date.format(DATE_FORMAT).to_string()
}

pub fn parse_date(value: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(value.trim(), DATE_FORMAT)
        .map_err(|e| Error::Validation(format!("invalid date '{}' (expected YYYY-MM-DD): {}", value, e)))
}

// ============================================================================
// ROW DECODING
// ============================================================================

fn conversion_error(row: &Row<'_>, column: &str, err: chrono::ParseError) -> rusqlite::Error {
    let idx = row.as_ref().column_index(column).unwrap_or(0);
    rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(err))
}

pub(crate) fn timestamp_column(row: &Row<'_>, column: &str) -> rusqlite::Result<DateTime<Utc>> {
    let raw: String = row.get(column)?;
    DateTime::parse_from_rfc3339(&raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| conversion_error(row, column, e))
}

pub(crate) fn optional_timestamp_column(
    row: &Row<'_>,
    column: &str,
) -> rusqlite::Result<Option<DateTime<Utc>>> {
    let raw: Option<String> = row.get(column)?;
    match raw {
        Some(raw) => DateTime::parse_from_rfc3339(&raw)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| conversion_error(row, column, e)),
        None => Ok(None),
    }
}

pub(crate) fn date_column(row: &Row<'_>, column: &str) -> rusqlite::Result<NaiveDate> {
    let raw: String = row.get(column)?;
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| conversion_error(row, column, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_timestamp_has_z_suffix_and_micros() {
        let dt = Utc.with_ymd_and_hms(2025, 12, 27, 10, 30, 0).unwrap();
        assert_eq!(to_timestamp(dt), "2025-12-27T10:30:00.000000Z");

        let stamp = now();
        assert!(stamp.ends_with('Z'));
        assert_eq!(stamp.len(), "2025-12-27T10:30:00.000000Z".len());
    }

    #[test]
    fn test_timestamp_round_trip() {
        let dt = Utc.with_ymd_and_hms(2024, 2, 29, 23, 59, 59).unwrap();
        assert_eq!(parse_timestamp(&to_timestamp(dt)).unwrap(), dt);
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_timestamps_sort_chronologically_as_text() {
        let earlier = to_timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
        let later = to_timestamp(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 1).unwrap());
        assert!(earlier < later);
    }

    #[test]
    fn test_date_strings() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 15).unwrap();
        assert_eq!(to_datestring(date), "2025-06-15");
        assert_eq!(parse_date("2025-06-15").unwrap(), date);
        assert!(parse_date("06/15/2025").is_err());
    }
}
