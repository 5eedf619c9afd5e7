//! Per-trip start/end times and stop counts, derived from stop times.

use rusqlite::params;
use serde::Serialize;
use std::collections::HashMap;

use crate::error::{FeedError, Result};
use crate::store::FeedStore;

/// Which time of a trip's first stop counts as the trip's start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum StartTimeSource {
    #[default]
    Arrival,
    Departure,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct AggregationConfig {
    pub start_time: StartTimeSource,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TripAggregate {
    pub trip_id: String,
    pub start_time: i64,
    pub end_time: i64,
    pub stop_count: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StopTimeTiming {
    pub stop_sequence: i64,
    pub arrival_time: Option<i64>,
    pub departure_time: Option<i64>,
}

/// Aggregates one trip's stop times, ordered by numeric stop sequence.
///
/// End time is the last stop's arrival. A trip without stop times is an
/// integrity violation in the source feed and fails with `MissingDependency`.
pub fn aggregate_trip(
    trip_id: &str,
    stop_times: &mut [StopTimeTiming],
    config: AggregationConfig,
) -> Result<TripAggregate> {
    stop_times.sort_by_key(|st| st.stop_sequence);
    let (Some(first), Some(last)) = (stop_times.first(), stop_times.last()) else {
        return Err(FeedError::MissingDependency(format!(
            "trip {trip_id} has no stop times"
        )));
    };

    let start_time = match config.start_time {
        StartTimeSource::Arrival => first.arrival_time.or(first.departure_time),
        StartTimeSource::Departure => first.departure_time.or(first.arrival_time),
    };
    let end_time = last.arrival_time.or(last.departure_time);

    match (start_time, end_time) {
        (Some(start_time), Some(end_time)) => Ok(TripAggregate {
            trip_id: trip_id.to_string(),
            start_time,
            end_time,
            stop_count: stop_times.len() as i64,
        }),
        _ => Err(FeedError::MissingDependency(format!(
            "trip {trip_id} has no time at its first or last stop"
        ))),
    }
}

/// Reads back the stop times already inserted for a feed and aggregates every trip.
pub fn aggregate_stored_trips(
    store: &FeedStore,
    feed_info_id: i64,
    config: AggregationConfig,
) -> Result<HashMap<String, TripAggregate>> {
    let mut stmt = store.conn().prepare(
        "SELECT trip_id, stop_sequence, arrival_time, departure_time
         FROM stop_times WHERE feed_info_id = ?1
         ORDER BY trip_id",
    )?;
    let mut rows = stmt.query(params![feed_info_id])?;

    let mut aggregates = HashMap::new();
    let mut current: Option<(String, Vec<StopTimeTiming>)> = None;
    while let Some(row) = rows.next()? {
        let (Some(trip_id), Some(stop_sequence)) =
            (row.get::<_, Option<String>>(0)?, row.get::<_, Option<i64>>(1)?)
        else {
            return Err(FeedError::MissingDependency(
                "stop time without a trip_id or stop_sequence".to_string(),
            ));
        };
        let timing = StopTimeTiming {
            stop_sequence,
            arrival_time: row.get(2)?,
            departure_time: row.get(3)?,
        };
        match current.as_mut() {
            Some((id, timings)) if *id == trip_id => timings.push(timing),
            _ => {
                if let Some((id, mut timings)) = current.replace((trip_id, vec![timing])) {
                    let aggregate = aggregate_trip(&id, &mut timings, config)?;
                    aggregates.insert(id, aggregate);
                }
            }
        }
    }
    if let Some((id, mut timings)) = current {
        let aggregate = aggregate_trip(&id, &mut timings, config)?;
        aggregates.insert(id, aggregate);
    }

    Ok(aggregates)
}
