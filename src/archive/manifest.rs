//! Parsing of the archived-feeds manifest.
//!
//! The manifest is a CSV file with one row per published feed version:
//!
//! ```text
//! feed_start_date,feed_end_date,feed_version,archive_url,archive_note
//! 20240308,20240601,"Spring 2024, version 1",https://cdn.mbta.com/archive/20240308.zip,
//! ```

use serde::Deserialize;

use super::FeedDescriptor;
use crate::codec::parse_date;
use crate::error::{FeedError, Result};

#[derive(Debug, Deserialize)]
struct ManifestRow {
    feed_start_date: String,
    feed_end_date: String,
    feed_version: String,
    archive_url: String,
}

/// Parses every manifest row into a descriptor. Extra columns are ignored.
pub fn parse_manifest(text: &str) -> Result<Vec<FeedDescriptor>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(text.trim_start_matches('\u{feff}').as_bytes());

    let mut feeds = Vec::new();
    for (line, row) in reader.deserialize::<ManifestRow>().enumerate() {
        let row = row?;
        let start = parse_date(&row.feed_start_date)
            .map_err(|e| e.in_column("manifest", "feed_start_date"))?;
        let end = parse_date(&row.feed_end_date)
            .map_err(|e| e.in_column("manifest", "feed_end_date"))?;
        let feed = FeedDescriptor::new(start, end, row.feed_version, row.archive_url)
            .map_err(|e| match e {
                FeedError::MalformedValue { value, reason, .. } => FeedError::MalformedValue {
                    context: format!("manifest row {}", line + 1),
                    value,
                    reason,
                },
                other => other,
            })?;
        feeds.push(feed);
    }
    Ok(feeds)
}
