use chrono::NaiveDate;
use serde::Serialize;

use crate::codec::format_date;
use crate::error::{FeedError, Result};

/// One dated version of a published feed, as listed in the archive manifest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedDescriptor {
    key: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    version: String,
    url: String,
}

impl FeedDescriptor {
    pub fn new(
        start_date: NaiveDate,
        end_date: NaiveDate,
        version: impl Into<String>,
        url: impl Into<String>,
    ) -> Result<Self> {
        if start_date > end_date {
            return Err(FeedError::malformed(
                "feed date range",
                format!("{}..{}", format_date(start_date), format_date(end_date)),
                "start date is after end date",
            ));
        }
        Ok(Self {
            key: format_date(start_date),
            start_date,
            end_date,
            version: version.into(),
            url: url.into(),
        })
    }

    /// `YYYYMMDD` of the start date. Names the feed's local directory and remote prefix.
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn start_date(&self) -> NaiveDate {
        self.start_date
    }

    pub fn end_date(&self) -> NaiveDate {
        self.end_date
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn covers(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}

impl std::fmt::Display for FeedDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ({} to {}) {}",
            self.key,
            self.start_date,
            self.end_date,
            self.version
        )
    }
}
