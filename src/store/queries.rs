use chrono::NaiveDate;
use rusqlite::{OptionalExtension, params};
use serde::Serialize;

use super::FeedStore;
use crate::error::Result;
use crate::ingest::aggregate::TripAggregate;
use crate::models::enums::RoutePatternTypicality;

/// Provenance of one ingested feed.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FeedInfoRecord {
    pub id: i64,
    pub feed_publisher_name: Option<String>,
    pub feed_version: Option<String>,
    pub feed_start_date: Option<NaiveDate>,
    pub feed_end_date: Option<NaiveDate>,
    pub retrieved_from_url: Option<String>,
    pub zip_md5_checksum: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShapePoint {
    pub shape_id: String,
    pub lat: f64,
    pub lon: f64,
    pub sequence: i64,
    pub dist_traveled: Option<f64>,
}

impl FeedStore {
    pub fn feed_infos(&self) -> Result<Vec<FeedInfoRecord>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, feed_publisher_name, feed_version, feed_start_date, feed_end_date,
                    retrieved_from_url, zip_md5_checksum
             FROM feed_info ORDER BY id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(FeedInfoRecord {
                id: r.get(0)?,
                feed_publisher_name: r.get(1)?,
                feed_version: r.get(2)?,
                feed_start_date: r.get(3)?,
                feed_end_date: r.get(4)?,
                retrieved_from_url: r.get(5)?,
                zip_md5_checksum: r.get(6)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Derived trip timings, read from the trips table so they survive compaction.
    pub fn trip_aggregates(&self) -> Result<Vec<TripAggregate>> {
        let mut stmt = self.conn.prepare(
            "SELECT trip_id, start_time, end_time, stop_count FROM trips ORDER BY start_time, trip_id",
        )?;
        let rows = stmt.query_map([], |r| {
            Ok(TripAggregate {
                trip_id: r.get(0)?,
                start_time: r.get(1)?,
                end_time: r.get(2)?,
                stop_count: r.get(3)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }

    /// Shape of a route's typical pattern, via its representative trip.
    ///
    /// Empty when the route has no typical pattern or the store was compacted.
    pub fn shape_for_route(&self, route_id: &str) -> Result<Vec<ShapePoint>> {
        let shape_id: Option<String> = self
            .conn
            .query_row(
                "SELECT t.shape_id
                 FROM route_patterns rp
                 JOIN trips t ON t.trip_id = rp.representative_trip_id
                                 AND t.feed_info_id = rp.feed_info_id
                 WHERE rp.route_id = ?1 AND rp.route_pattern_typicality = ?2
                 ORDER BY rp.route_pattern_sort_order, rp.id
                 LIMIT 1",
                params![route_id, RoutePatternTypicality::Typical.code()],
                |r| r.get(0),
            )
            .optional()?
            .flatten();

        let Some(shape_id) = shape_id else {
            return Ok(Vec::new());
        };

        let mut stmt = self.conn.prepare(
            "SELECT shape_id, shape_pt_lat, shape_pt_lon, shape_pt_sequence, shape_dist_traveled
             FROM shapes WHERE shape_id = ?1 ORDER BY shape_pt_sequence",
        )?;
        let rows = stmt.query_map(params![shape_id], |r| {
            Ok(ShapePoint {
                shape_id: r.get(0)?,
                lat: r.get(1)?,
                lon: r.get(2)?,
                sequence: r.get(3)?,
                dist_traveled: r.get(4)?,
            })
        })?;
        Ok(rows.collect::<rusqlite::Result<_>>()?)
    }
}
