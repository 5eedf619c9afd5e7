//! Maps raw feed rows onto a table's typed store columns.

use crate::codec::{nullable, parse_clock_seconds, parse_date};
use crate::error::{FeedError, Result};
use crate::models::{RawRow, TableSchema, Transform, TypedRow, Value};

impl Transform {
    pub fn apply(&self, text: &str) -> Result<Value> {
        let value: Value = match self {
            Transform::Date => parse_date(text)?.into(),
            Transform::OptionalDate => nullable(text, parse_date)?.into(),
            Transform::Integer => parse_integer(text)?.into(),
            Transform::OptionalInteger => nullable(text, parse_integer)?.into(),
            Transform::Real => parse_real(text)?.into(),
            Transform::OptionalReal => nullable(text, parse_real)?.into(),
            Transform::ClockSeconds => parse_clock_seconds(text)?.into(),
            Transform::OptionalClockSeconds => nullable(text, parse_clock_seconds)?.into(),
            Transform::Code(codes) => codes.validate(text)?.into(),
        };
        Ok(value)
    }
}

fn parse_integer(text: &str) -> Result<i64> {
    text.trim()
        .parse()
        .map_err(|e: std::num::ParseIntError| FeedError::malformed("integer", text, e.to_string()))
}

fn parse_real(text: &str) -> Result<f64> {
    text.trim()
        .parse()
        .map_err(|e: std::num::ParseFloatError| FeedError::malformed("real", text, e.to_string()))
}

/// Keeps the keys of `raw` that are source columns of `schema`, transformed.
///
/// Extra columns in the feed file are dropped. Columns without a transform
/// pass through as text. The first failing transform aborts the row.
pub fn transform_row(raw: &RawRow, schema: &TableSchema) -> Result<TypedRow> {
    let mut row = TypedRow::new();
    for column in schema.columns.iter().filter(|c| c.is_source()) {
        let Some(text) = raw.get(column.name) else {
            continue;
        };
        let value = match &column.transform {
            Some(transform) => transform
                .apply(text)
                .map_err(|e| e.in_column(schema.name, column.name))?,
            None => Value::Text(text.clone()),
        };
        row.set(column.name, value);
    }
    Ok(row)
}
