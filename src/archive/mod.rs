//! Index of the feed versions listed in the archive manifest.

mod descriptor;
mod manifest;

pub use descriptor::FeedDescriptor;
pub use manifest::parse_manifest;

use chrono::NaiveDate;
use std::collections::BTreeMap;
use tracing::{info, warn};

use crate::error::Result;
use crate::services::manifest_source::ManifestSource;

/// Feed descriptors keyed by start date. Read-only once built.
///
/// Keys are `YYYYMMDD`, so iteration order is chronological.
#[derive(Debug, Clone, Default)]
pub struct ArchiveIndex {
    feeds: BTreeMap<String, FeedDescriptor>,
}

impl ArchiveIndex {
    /// A later descriptor with the same key replaces an earlier one.
    pub fn new(feeds: impl IntoIterator<Item = FeedDescriptor>) -> Self {
        let mut index = BTreeMap::new();
        for feed in feeds {
            if let Some(previous) = index.insert(feed.key().to_string(), feed) {
                warn!(feed_key = %previous.key(), "Duplicate manifest entry, keeping the last one");
            }
        }
        Self { feeds: index }
    }

    /// Fetches the manifest once, dropping feeds that start before `since`.
    #[tracing::instrument(skip(source))]
    pub async fn load(source: &dyn ManifestSource, since: Option<NaiveDate>) -> Result<Self> {
        let feeds = source.fetch_manifest().await?;
        let total = feeds.len();
        let index = Self::new(
            feeds
                .into_iter()
                .filter(|f| since.is_none_or(|since| f.start_date() >= since)),
        );
        info!(total, kept = index.len(), "Loaded archive index");
        Ok(index)
    }

    pub fn len(&self) -> usize {
        self.feeds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.feeds.is_empty()
    }

    /// Feeds overlapping `[start, end]`, ascending by start date. Open bounds match everything.
    pub fn feeds_in_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> Vec<&FeedDescriptor> {
        self.feeds
            .values()
            .filter(|f| start.is_none_or(|start| f.end_date() >= start))
            .filter(|f| end.is_none_or(|end| f.start_date() <= end))
            .collect()
    }

    pub fn all_feeds(&self) -> Vec<&FeedDescriptor> {
        self.feeds_in_range(None, None)
    }

    pub fn latest_feed(&self) -> Option<&FeedDescriptor> {
        self.feeds.values().next_back()
    }

    /// The earliest-starting feed whose range contains `date`.
    pub fn feed_covering_date(&self, date: NaiveDate) -> Option<&FeedDescriptor> {
        self.feeds.values().find(|f| f.covers(date))
    }

    pub fn feed_by_key(&self, key: &str) -> Option<&FeedDescriptor> {
        self.feeds.get(key)
    }
}
