// Copyright 2025
// Licensed under the Elastic License v2.0

//! Source-to-destination type coercion
//!
//! Maps one source cell to one destination [`Value`]:
//!
//! | Source type | Destination value |
//! |-------------|-------------------|
//! | INT | `Int64` |
//! | VARCHAR, LONG VARCHAR, CHAR | `String`, verbatim |
//! | FLOAT, NUMERIC | `Float64` |
//! | TIMESTAMP | `String` rendered as `yyyy-MM-dd HH:mm:ss.fraction` |
//! | DATE | `Timestamp` (micros) from epoch millis, unless the source flags the date null |
//! | BOOLEAN | `Int64`, 1 or 0 |
//! | anything else | `Unsupported`, logged and sent as null |
//!
//! Timestamp and date columns detect null through different source calls:
//! a timestamp is null when the accessor yields nothing, a date is null when
//! the source's date null check says so.

use chrono::{NaiveDateTime, Timelike};
use tracing::warn;

use crate::core::{RowCursor, SourceType, Value};

/// One source row after coercion.
#[derive(Debug, Clone, PartialEq)]
pub struct CoercedRow {
    pub values: Vec<Value>,
    /// Comma-joined rendering of the values, for failure diagnostics
    pub raw_line: String,
}

/// Coerces every cell of the cursor's current row.
pub fn coerce_row<C: RowCursor + ?Sized>(cursor: &C) -> CoercedRow {
    let num_cols = cursor.column_count();
    let mut values = Vec::with_capacity(num_cols);
    for col in 0..num_cols {
        values.push(coerce_cell(cursor, col));
    }
    let raw_line = render_raw_line(&values);
    CoercedRow { values, raw_line }
}

/// Coerces a single cell. Never fails.
pub fn coerce_cell<C: RowCursor + ?Sized>(cursor: &C, col: usize) -> Value {
    match cursor.column_type(col) {
        SourceType::Int => cursor.get_long(col).map(Value::Int64).unwrap_or(Value::Null),
        SourceType::Varchar | SourceType::LongVarchar | SourceType::Char => {
            cursor.get_string(col).map(Value::String).unwrap_or(Value::Null)
        }
        SourceType::Float | SourceType::Numeric => {
            cursor.get_double(col).map(Value::Float64).unwrap_or(Value::Null)
        }
        SourceType::Timestamp => match cursor.get_timestamp(col) {
            Some(ts) => Value::String(render_timestamp(&ts)),
            None => Value::Null,
        },
        SourceType::Date => {
            if cursor.is_date_null(col) {
                Value::Null
            } else {
                cursor
                    .get_timestamp(col)
                    .map(|dt| Value::Timestamp(dt.and_utc().timestamp_millis() * 1000))
                    .unwrap_or(Value::Null)
            }
        }
        SourceType::Bool => match cursor.get_bool(col) {
            Some(true) => Value::Int64(1),
            Some(false) => Value::Int64(0),
            None => Value::Null,
        },
        SourceType::Other(type_name) => {
            warn!(
                "Unknown data type please convert for loading or unsupported data type for voltdb loader: Index={} Type={}",
                col, type_name
            );
            Value::Unsupported
        }
    }
}

/// Canonical timestamp text: seconds precision plus the fractional part with
/// trailing zeros trimmed, keeping at least one digit.
pub fn render_timestamp(ts: &NaiveDateTime) -> String {
    let mut frac = format!("{:09}", ts.nanosecond() % 1_000_000_000);
    while frac.len() > 1 && frac.ends_with('0') {
        frac.pop();
    }
    format!("{}.{}", ts.format("%Y-%m-%d %H:%M:%S"), frac)
}

/// Every value followed by a comma; unsupported cells contribute nothing.
pub fn render_raw_line(values: &[Value]) -> String {
    let mut line = String::new();
    for value in values.iter().filter(|v| !v.is_unsupported()) {
        line.push_str(&value.to_string());
        line.push(',');
    }
    line
}
