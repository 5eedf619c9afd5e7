//! Static schema for every GTFS table the store materializes.
//!
//! Each [`GtfsTable`] resolves to a [`TableSchema`] listing its store columns
//! and the [`Transform`] applied to the raw text of each one. Columns without
//! a transform are stored as text unchanged.

pub mod enums;
pub mod value;

use enums::{
    BikesAllowed, CodeSet, ExceptionType, LocationType, RoutePatternTypicality, RouteType,
    ServiceDayAvailability, ServiceScheduleTypicality, TransferType, WheelchairAccessibility,
    WheelchairBoarding,
};

pub use value::{RawRow, TypedRow, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum GtfsTable {
    FeedInfo,
    Calendar,
    CalendarDates,
    CalendarAttributes,
    Lines,
    Routes,
    RoutePatterns,
    Shapes,
    Stops,
    Transfers,
    StopTimes,
    Trips,
}

impl GtfsTable {
    /// Ingestion order. Stop times precede trips so trip aggregates can be read back.
    pub const INGEST_ORDER: [GtfsTable; 12] = [
        GtfsTable::FeedInfo,
        GtfsTable::Calendar,
        GtfsTable::CalendarDates,
        GtfsTable::CalendarAttributes,
        GtfsTable::Lines,
        GtfsTable::Routes,
        GtfsTable::RoutePatterns,
        GtfsTable::Shapes,
        GtfsTable::Stops,
        GtfsTable::Transfers,
        GtfsTable::StopTimes,
        GtfsTable::Trips,
    ];

    /// Name of the source file without `.txt`, also used as the store table name.
    pub fn name(&self) -> &'static str {
        self.schema().name
    }

    pub fn schema(&self) -> &'static TableSchema {
        match self {
            GtfsTable::FeedInfo => &FEED_INFO,
            GtfsTable::Calendar => &CALENDAR,
            GtfsTable::CalendarDates => &CALENDAR_DATES,
            GtfsTable::CalendarAttributes => &CALENDAR_ATTRIBUTES,
            GtfsTable::Lines => &LINES,
            GtfsTable::Routes => &ROUTES,
            GtfsTable::RoutePatterns => &ROUTE_PATTERNS,
            GtfsTable::Shapes => &SHAPES,
            GtfsTable::Stops => &STOPS,
            GtfsTable::Transfers => &TRANSFERS,
            GtfsTable::StopTimes => &STOP_TIMES,
            GtfsTable::Trips => &TRIPS,
        }
    }
}

impl std::fmt::Display for GtfsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// How a column's raw text becomes a typed [`Value`].
#[derive(Debug, Clone, Copy)]
pub enum Transform {
    Date,
    OptionalDate,
    Integer,
    OptionalInteger,
    Real,
    OptionalReal,
    ClockSeconds,
    OptionalClockSeconds,
    Code(&'static CodeSet),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    Text,
    Integer,
    Real,
    Date,
}

impl SqlType {
    pub fn ddl(&self) -> &'static str {
        match self {
            SqlType::Text => "TEXT",
            SqlType::Integer => "INTEGER",
            SqlType::Real => "REAL",
            SqlType::Date => "DATE",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Read from the feed file.
    Source,
    /// Filled in by the pipeline, never taken from the feed file.
    Derived(SqlType),
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub transform: Option<Transform>,
    pub origin: Origin,
    pub indexed: bool,
}

impl Column {
    const fn text(name: &'static str) -> Self {
        Column {
            name,
            transform: None,
            origin: Origin::Source,
            indexed: false,
        }
    }

    const fn typed(name: &'static str, transform: Transform) -> Self {
        Column {
            name,
            transform: Some(transform),
            origin: Origin::Source,
            indexed: false,
        }
    }

    const fn code(name: &'static str, codes: &'static CodeSet) -> Self {
        Column::typed(name, Transform::Code(codes))
    }

    const fn derived(name: &'static str, sql_type: SqlType) -> Self {
        Column {
            name,
            transform: None,
            origin: Origin::Derived(sql_type),
            indexed: false,
        }
    }

    const fn indexed(self) -> Self {
        Column {
            indexed: true,
            ..self
        }
    }

    pub fn sql_type(&self) -> SqlType {
        if let Origin::Derived(sql_type) = self.origin {
            return sql_type;
        }
        match self.transform {
            None | Some(Transform::Code(_)) => SqlType::Text,
            Some(Transform::Date | Transform::OptionalDate) => SqlType::Date,
            Some(
                Transform::Integer
                | Transform::OptionalInteger
                | Transform::ClockSeconds
                | Transform::OptionalClockSeconds,
            ) => SqlType::Integer,
            Some(Transform::Real | Transform::OptionalReal) => SqlType::Real,
        }
    }

    pub fn is_source(&self) -> bool {
        self.origin == Origin::Source
    }
}

#[derive(Debug)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl TableSchema {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }
}

pub const RETRIEVED_FROM_URL: &str = "retrieved_from_url";
pub const ZIP_MD5_CHECKSUM: &str = "zip_md5_checksum";
pub const START_TIME: &str = "start_time";
pub const END_TIME: &str = "end_time";
pub const STOP_COUNT: &str = "stop_count";

static FEED_INFO: TableSchema = TableSchema {
    name: "feed_info",
    columns: &[
        Column::text("feed_publisher_name"),
        Column::text("feed_publisher_url"),
        Column::text("feed_lang"),
        Column::typed("feed_start_date", Transform::OptionalDate),
        Column::typed("feed_end_date", Transform::OptionalDate),
        Column::text("feed_version"),
        Column::text("feed_contact_email"),
        Column::text("feed_contact_url"),
        Column::derived(RETRIEVED_FROM_URL, SqlType::Text),
        Column::derived(ZIP_MD5_CHECKSUM, SqlType::Text),
    ],
};

static CALENDAR: TableSchema = TableSchema {
    name: "calendar",
    columns: &[
        Column::text("service_id").indexed(),
        Column::code("monday", &ServiceDayAvailability::CODE_SET),
        Column::code("tuesday", &ServiceDayAvailability::CODE_SET),
        Column::code("wednesday", &ServiceDayAvailability::CODE_SET),
        Column::code("thursday", &ServiceDayAvailability::CODE_SET),
        Column::code("friday", &ServiceDayAvailability::CODE_SET),
        Column::code("saturday", &ServiceDayAvailability::CODE_SET),
        Column::code("sunday", &ServiceDayAvailability::CODE_SET),
        Column::typed("start_date", Transform::Date),
        Column::typed("end_date", Transform::Date),
    ],
};

static CALENDAR_DATES: TableSchema = TableSchema {
    name: "calendar_dates",
    columns: &[
        Column::text("service_id").indexed(),
        Column::typed("date", Transform::Date),
        Column::code("exception_type", &ExceptionType::CODE_SET),
        Column::text("holiday_name"),
    ],
};

static CALENDAR_ATTRIBUTES: TableSchema = TableSchema {
    name: "calendar_attributes",
    columns: &[
        Column::text("service_id").indexed(),
        Column::text("service_description"),
        Column::text("service_schedule_name"),
        Column::text("service_schedule_type"),
        Column::code(
            "service_schedule_typicality",
            &ServiceScheduleTypicality::CODE_SET,
        ),
        Column::typed("rating_start_date", Transform::OptionalDate),
        Column::typed("rating_end_date", Transform::OptionalDate),
        Column::text("rating_description"),
    ],
};

static LINES: TableSchema = TableSchema {
    name: "lines",
    columns: &[
        Column::text("line_id"),
        Column::text("line_short_name"),
        Column::text("line_long_name"),
        Column::text("line_desc"),
        Column::text("line_url"),
        Column::text("line_color"),
        Column::text("line_text_color"),
        Column::text("line_sort_order"),
    ],
};

static ROUTES: TableSchema = TableSchema {
    name: "routes",
    columns: &[
        Column::text("route_id"),
        Column::text("agency_id"),
        Column::text("route_short_name"),
        Column::text("route_long_name"),
        Column::text("route_desc"),
        Column::code("route_type", &RouteType::CODE_SET),
        Column::text("route_url"),
        Column::text("route_color"),
        Column::text("route_text_color"),
        Column::typed("route_sort_order", Transform::OptionalInteger),
        Column::text("route_fare_class"),
        Column::text("line_id").indexed(),
        Column::text("listed_route"),
    ],
};

static ROUTE_PATTERNS: TableSchema = TableSchema {
    name: "route_patterns",
    columns: &[
        Column::text("route_pattern_id"),
        Column::text("route_id").indexed(),
        Column::text("direction_id"),
        Column::text("route_pattern_name"),
        Column::text("route_pattern_time_desc"),
        Column::code(
            "route_pattern_typicality",
            &RoutePatternTypicality::CODE_SET,
        ),
        Column::typed("route_pattern_sort_order", Transform::OptionalInteger),
        Column::text("representative_trip_id"),
    ],
};

static SHAPES: TableSchema = TableSchema {
    name: "shapes",
    columns: &[
        Column::text("shape_id").indexed(),
        Column::typed("shape_pt_lat", Transform::Real),
        Column::typed("shape_pt_lon", Transform::Real),
        Column::typed("shape_pt_sequence", Transform::Integer),
        Column::typed("shape_dist_traveled", Transform::OptionalReal),
    ],
};

static STOPS: TableSchema = TableSchema {
    name: "stops",
    columns: &[
        Column::text("stop_id"),
        Column::text("stop_code"),
        Column::text("stop_name"),
        Column::text("stop_desc"),
        Column::text("platform_code"),
        Column::text("platform_name"),
        Column::typed("stop_lat", Transform::OptionalReal),
        Column::typed("stop_lon", Transform::OptionalReal),
        Column::text("zone_id"),
        Column::text("stop_address"),
        Column::text("stop_url"),
        Column::text("level_id"),
        Column::code("location_type", &LocationType::CODE_SET),
        Column::text("parent_station").indexed(),
        Column::code("wheelchair_boarding", &WheelchairBoarding::CODE_SET),
        Column::text("municipality"),
        Column::text("on_street"),
        Column::text("at_street"),
        Column::code("vehicle_type", &RouteType::CODE_SET),
    ],
};

static TRANSFERS: TableSchema = TableSchema {
    name: "transfers",
    columns: &[
        Column::text("from_stop_id"),
        Column::text("to_stop_id"),
        Column::code("transfer_type", &TransferType::CODE_SET),
        Column::typed("min_transfer_time", Transform::OptionalInteger),
        Column::typed("min_walk_time", Transform::OptionalInteger),
        Column::typed("min_wheelchair_time", Transform::OptionalInteger),
        Column::typed("suggested_buffer_time", Transform::OptionalInteger),
        Column::code("wheelchair_transfer", &WheelchairAccessibility::CODE_SET),
        Column::text("from_trip_id"),
        Column::text("to_trip_id"),
    ],
};

static STOP_TIMES: TableSchema = TableSchema {
    name: "stop_times",
    columns: &[
        Column::text("trip_id").indexed(),
        Column::text("stop_id").indexed(),
        Column::typed("arrival_time", Transform::OptionalClockSeconds),
        Column::typed("departure_time", Transform::OptionalClockSeconds),
        Column::typed("stop_sequence", Transform::Integer),
        Column::text("stop_headsign"),
        Column::text("pickup_type"),
        Column::text("drop_off_type"),
        Column::text("timepoint"),
        Column::text("checkpoint_id"),
        Column::text("continuous_pickup"),
        Column::text("continuous_drop_off"),
    ],
};

static TRIPS: TableSchema = TableSchema {
    name: "trips",
    columns: &[
        Column::text("route_id").indexed(),
        Column::text("service_id").indexed(),
        Column::text("trip_id"),
        Column::text("trip_headsign"),
        Column::text("trip_short_name"),
        Column::text("direction_id"),
        Column::text("block_id"),
        Column::text("shape_id"),
        Column::code("wheelchair_accessible", &WheelchairAccessibility::CODE_SET),
        Column::code("trip_route_type", &RouteType::CODE_SET),
        Column::text("route_pattern_id"),
        Column::code("bikes_allowed", &BikesAllowed::CODE_SET),
        Column::derived(START_TIME, SqlType::Integer),
        Column::derived(END_TIME, SqlType::Integer),
        Column::derived(STOP_COUNT, SqlType::Integer),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stop_times_precede_trips() {
        let position = |table| GtfsTable::INGEST_ORDER.iter().position(|t| *t == table);
        assert!(position(GtfsTable::StopTimes) < position(GtfsTable::Trips));
        assert_eq!(GtfsTable::INGEST_ORDER[0], GtfsTable::FeedInfo);
    }

    #[test]
    fn test_derived_columns_are_not_source_columns() {
        let trips = GtfsTable::Trips.schema();
        let start = trips.column(START_TIME).unwrap();
        assert!(!start.is_source());
        assert_eq!(start.sql_type(), SqlType::Integer);
        assert!(trips.column("trip_id").unwrap().is_source());
    }

    #[test]
    fn test_sql_types_follow_transforms() {
        let stop_times = GtfsTable::StopTimes.schema();
        assert_eq!(stop_times.column("arrival_time").unwrap().sql_type(), SqlType::Integer);
        assert_eq!(stop_times.column("trip_id").unwrap().sql_type(), SqlType::Text);
        let shapes = GtfsTable::Shapes.schema();
        assert_eq!(shapes.column("shape_pt_lat").unwrap().sql_type(), SqlType::Real);
        assert_eq!(GtfsTable::Calendar.schema().column("start_date").unwrap().sql_type(), SqlType::Date);
    }
}
