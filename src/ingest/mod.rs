//! Loads the tables of one extracted feed into a [`FeedStore`].

pub mod aggregate;

use std::collections::HashMap;
use tracing::{debug, info, warn};

use crate::error::{FeedError, Result};
use crate::models::{
    END_TIME, GtfsTable, RETRIEVED_FROM_URL, START_TIME, STOP_COUNT, TypedRow, ZIP_MD5_CHECKSUM,
};
use crate::reader::GtfsReader;
use crate::store::FeedStore;
use crate::transform::transform_row;
use aggregate::{AggregationConfig, TripAggregate, aggregate_stored_trips};

pub const DEFAULT_BATCH_SIZE: usize = 10_000;

/// Where a feed came from. Stored on its feed_info row.
#[derive(Debug, Clone)]
pub struct FeedProvenance {
    pub url: String,
    pub zip_md5_checksum: String,
}

#[derive(Debug, Clone, Copy)]
pub struct IngestOptions {
    pub batch_size: usize,
    pub aggregation: AggregationConfig,
}

impl Default for IngestOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            aggregation: AggregationConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestSummary {
    pub feed_info_id: i64,
    pub rows: Vec<(GtfsTable, usize)>,
}

impl IngestSummary {
    pub fn rows_in(&self, table: GtfsTable) -> usize {
        self.rows
            .iter()
            .find(|(t, _)| *t == table)
            .map_or(0, |(_, n)| *n)
    }
}

/// Ingests every table of `reader` as one new feed.
///
/// Each table commits on its own. The first failure stops ingestion, so the
/// caller must discard the store file on error.
#[tracing::instrument(skip_all, fields(root = %reader.root().display(), url = %provenance.url))]
pub fn ingest_feed(
    store: &mut FeedStore,
    reader: &GtfsReader,
    provenance: &FeedProvenance,
    options: IngestOptions,
) -> Result<IngestSummary> {
    let feed_info_id = store.next_feed_info_id()?;
    insert_feed_info(store, reader, provenance, feed_info_id)?;
    let mut rows = vec![(GtfsTable::FeedInfo, 1)];

    for table in GtfsTable::INGEST_ORDER {
        let inserted = match table {
            GtfsTable::FeedInfo => continue,
            GtfsTable::Trips => {
                let aggregates =
                    aggregate_stored_trips(store, feed_info_id, options.aggregation)?;
                debug!(trips = aggregates.len(), "Aggregated stop times");
                let trips = reader
                    .read(table)?
                    .map(|raw| raw.and_then(|raw| transform_row(&raw, table.schema())))
                    .map(|row| row.and_then(|row| with_aggregate(row, &aggregates)));
                store.insert_rows(table, feed_info_id, trips, options.batch_size)?
            }
            _ => {
                let typed = reader
                    .read(table)?
                    .map(|raw| raw.and_then(|raw| transform_row(&raw, table.schema())));
                store.insert_rows(table, feed_info_id, typed, options.batch_size)?
            }
        };
        debug!(table = %table, rows = inserted, "Ingested table");
        rows.push((table, inserted));
    }

    info!(feed_info_id, "Ingested feed");
    Ok(IngestSummary { feed_info_id, rows })
}

fn insert_feed_info(
    store: &mut FeedStore,
    reader: &GtfsReader,
    provenance: &FeedProvenance,
    feed_info_id: i64,
) -> Result<()> {
    let schema = GtfsTable::FeedInfo.schema();
    let mut rows = reader.read(GtfsTable::FeedInfo)?;
    let mut info = match rows.next() {
        Some(raw) => transform_row(&raw?, schema)?,
        None => {
            warn!("feed_info.txt missing or empty, recording provenance only");
            TypedRow::new()
        }
    };
    if rows.next().is_some() {
        warn!("feed_info.txt has more than one row, keeping the first");
    }

    info.set(RETRIEVED_FROM_URL, provenance.url.as_str());
    info.set(ZIP_MD5_CHECKSUM, provenance.zip_md5_checksum.as_str());
    store.insert_feed_info(feed_info_id, &info)
}

fn with_aggregate(mut row: TypedRow, aggregates: &HashMap<String, TripAggregate>) -> Result<TypedRow> {
    let trip_id = row.text("trip_id").unwrap_or_default();
    let Some(aggregate) = aggregates.get(trip_id) else {
        return Err(FeedError::MissingDependency(format!(
            "trip {trip_id:?} has no stop times"
        )));
    };
    let (start, end, count) = (aggregate.start_time, aggregate.end_time, aggregate.stop_count);
    row.set(START_TIME, start);
    row.set(END_TIME, end);
    row.set(STOP_COUNT, count);
    Ok(row)
}
