//! Conversions between GTFS text values and typed values.
//!
//! Dates use the fixed `YYYYMMDD` form. Clock times are service-day times:
//! the hour may run past 23 for trips continuing after midnight, and is kept
//! as-is rather than wrapped.

use chrono::NaiveDate;

use crate::error::{FeedError, Result};

pub const GTFS_DATE_FORMAT: &str = "%Y%m%d";

/// Parses an 8-digit `YYYYMMDD` date.
pub fn parse_date(text: &str) -> Result<NaiveDate> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FeedError::malformed("date", text, "expected 8 digits YYYYMMDD"));
    }
    NaiveDate::parse_from_str(text, GTFS_DATE_FORMAT)
        .map_err(|e| FeedError::malformed("date", text, e.to_string()))
}

pub fn format_date(date: NaiveDate) -> String {
    date.format(GTFS_DATE_FORMAT).to_string()
}

/// Parses `H:MM:SS` or `HH:MM:SS` into seconds since the start of the service day.
///
/// `25:30:00` is `91800`, not `5400`.
pub fn parse_clock_seconds(text: &str) -> Result<i64> {
    let fields: Vec<&str> = text.trim().split(':').collect();
    let [hours, minutes, seconds] = fields.as_slice() else {
        return Err(FeedError::malformed(
            "clock time",
            text,
            format!("expected 3 fields, found {}", fields.len()),
        ));
    };

    let hours = clock_field(text, hours, 1..=3)?;
    let minutes = clock_field(text, minutes, 2..=2)?;
    let seconds = clock_field(text, seconds, 2..=2)?;
    if minutes >= 60 || seconds >= 60 {
        return Err(FeedError::malformed("clock time", text, "minutes and seconds must be below 60"));
    }

    Ok(hours * 3600 + minutes * 60 + seconds)
}

fn clock_field(text: &str, field: &str, width: std::ops::RangeInclusive<usize>) -> Result<i64> {
    if !width.contains(&field.len()) || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FeedError::malformed("clock time", text, format!("bad component {field:?}")));
    }
    field
        .parse()
        .map_err(|_| FeedError::malformed("clock time", text, format!("bad component {field:?}")))
}

/// Formats seconds since service-day start as `HH:MM:SS`, keeping hours past 24.
pub fn format_clock_seconds(total: i64) -> String {
    let hours = total / 3600;
    let minutes = (total % 3600) / 60;
    let seconds = total % 60;
    format!("{hours:02}:{minutes:02}:{seconds:02}")
}

/// Applies `transform` unless `text` is empty, in which case the value is absent.
pub fn nullable<T>(text: &str, transform: impl FnOnce(&str) -> Result<T>) -> Result<Option<T>> {
    if text.is_empty() {
        return Ok(None);
    }
    transform(text).map(Some)
}
