//! Environment-driven settings shared by the CLI subcommands.

use std::path::PathBuf;

use crate::error::{FeedError, Result};
use crate::infra::manifest::MBTA_MANIFEST_URL;
use crate::ingest::aggregate::{AggregationConfig, StartTimeSource};
use crate::ingest::{DEFAULT_BATCH_SIZE, IngestOptions};
use crate::lifecycle::ControllerOptions;

#[derive(Debug, Clone)]
pub struct ArchiveConfig {
    /// Directory holding one subdirectory per feed key.
    pub feeds_root: PathBuf,
    /// URL or local path of the archived-feeds manifest.
    pub manifest_url: String,
    /// Enables the S3 mirror when set.
    pub s3_bucket: Option<String>,
    pub compact_only: bool,
    pub batch_size: usize,
    pub start_time: StartTimeSource,
}

impl Default for ArchiveConfig {
    fn default() -> Self {
        Self {
            feeds_root: PathBuf::from("feeds"),
            manifest_url: MBTA_MANIFEST_URL.to_string(),
            s3_bucket: None,
            compact_only: false,
            batch_size: DEFAULT_BATCH_SIZE,
            start_time: StartTimeSource::default(),
        }
    }
}

impl ArchiveConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the config from `lookup`, which maps a variable name to its value.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = Self::default();
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(root) = var("GTFS_FEEDS_ROOT") {
            config.feeds_root = PathBuf::from(root);
        }
        if let Some(url) = var("GTFS_MANIFEST_URL") {
            config.manifest_url = url;
        }
        config.s3_bucket = var("GTFS_S3_BUCKET");
        if let Some(flag) = var("GTFS_COMPACT_ONLY") {
            config.compact_only = parse_flag("GTFS_COMPACT_ONLY", &flag)?;
        }
        if let Some(size) = var("GTFS_INSERT_BATCH_SIZE") {
            config.batch_size = match size.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("GTFS_INSERT_BATCH_SIZE", &size, "a positive integer")),
            };
        }
        if let Some(source) = var("GTFS_TRIP_START_TIME") {
            config.start_time = match source.trim().to_ascii_lowercase().as_str() {
                "arrival" => StartTimeSource::Arrival,
                "departure" => StartTimeSource::Departure,
                _ => return Err(invalid("GTFS_TRIP_START_TIME", &source, "arrival or departure")),
            };
        }
        Ok(config)
    }

    pub fn controller_options(&self) -> ControllerOptions {
        ControllerOptions {
            compact_only: self.compact_only,
            ingest: IngestOptions {
                batch_size: self.batch_size,
                aggregation: AggregationConfig {
                    start_time: self.start_time,
                },
            },
        }
    }
}

fn parse_flag(name: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Ok(true),
        "0" | "false" | "no" => Ok(false),
        _ => Err(invalid(name, value, "1/true or 0/false")),
    }
}

fn invalid(name: &str, value: &str, expected: &str) -> FeedError {
    FeedError::PreconditionFailed(format!("{name}={value:?}: expected {expected}"))
}
