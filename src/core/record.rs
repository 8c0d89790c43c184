// Copyright 2025
// Licensed under the Elastic License v2.0

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Column type as declared by the row source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceType {
    Int,
    Varchar,
    LongVarchar,
    Char,
    Float,
    Numeric,
    Timestamp,
    Date,
    Bool,
    /// Anything the bridge has no mapping for; carries the source's type name
    Other(String),
}

impl fmt::Display for SourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceType::Int => write!(f, "int"),
            SourceType::Varchar => write!(f, "varchar"),
            SourceType::LongVarchar => write!(f, "long varchar"),
            SourceType::Char => write!(f, "char"),
            SourceType::Float => write!(f, "float"),
            SourceType::Numeric => write!(f, "numeric"),
            SourceType::Timestamp => write!(f, "timestamp"),
            SourceType::Date => write!(f, "date"),
            SourceType::Bool => write!(f, "boolean"),
            SourceType::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Destination-typed cell value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Int64(i64),
    Float64(f64),
    String(String),
    /// Microseconds since the Unix epoch
    Timestamp(i64),
    /// Column type with no destination mapping; sent as null
    Unsupported,
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_unsupported(&self) -> bool {
        matches!(self, Value::Unsupported)
    }

    /// JSON parameter encoding used by the destination's procedure interface.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null | Value::Unsupported => serde_json::Value::Null,
            Value::Int64(i) => serde_json::json!(i),
            Value::Float64(f) => serde_json::json!(f),
            Value::String(s) => serde_json::json!(s),
            Value::Timestamp(micros) => serde_json::json!(micros),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null | Value::Unsupported => write!(f, "null"),
            Value::Int64(i) => write!(f, "{}", i),
            Value::Float64(v) => write!(f, "{:?}", v),
            Value::String(s) => write!(f, "{}", s),
            Value::Timestamp(micros) => {
                let secs = micros.div_euclid(1_000_000);
                let nanos = (micros.rem_euclid(1_000_000) * 1000) as u32;
                match DateTime::from_timestamp(secs, nanos) {
                    Some(dt) => write!(f, "{}", dt.format("%Y-%m-%d %H:%M:%S%.6f")),
                    None => write!(f, "{}", micros),
                }
            }
        }
    }
}

/// Diagnostic pairing carried with every row through delivery.
///
/// Used only to report failures; never consulted for business logic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowMetaData {
    pub raw_line: String,
    pub seq: u64,
}

impl RowMetaData {
    pub fn new(raw_line: String, seq: u64) -> Self {
        Self { raw_line, seq }
    }
}

/// Status byte returned by the destination for each invocation.
#[repr(i8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Success = 1,
    UserAbort = -1,
    GracefulFailure = -2,
    UnexpectedFailure = -3,
    ConnectionLost = -4,
    ServerUnavailable = -5,
    ConnectionTimeout = -6,
    ResponseUnknown = -7,
    TxnRestart = -8,
    OperationalFailure = -9,
}

impl ResponseStatus {
    pub fn from_code(code: i64) -> Self {
        match code {
            1 => ResponseStatus::Success,
            -1 => ResponseStatus::UserAbort,
            -2 => ResponseStatus::GracefulFailure,
            -3 => ResponseStatus::UnexpectedFailure,
            -4 => ResponseStatus::ConnectionLost,
            -5 => ResponseStatus::ServerUnavailable,
            -6 => ResponseStatus::ConnectionTimeout,
            -8 => ResponseStatus::TxnRestart,
            -9 => ResponseStatus::OperationalFailure,
            _ => ResponseStatus::ResponseUnknown,
        }
    }

    pub fn code(self) -> i8 {
        self as i8
    }

    pub fn is_success(self) -> bool {
        self == ResponseStatus::Success
    }

    /// Failures the procedure itself reported; anything else is a harder failure.
    pub fn is_soft_failure(self) -> bool {
        matches!(self, ResponseStatus::UserAbort | ResponseStatus::GracefulFailure)
    }
}

impl fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Outcome of one procedure invocation or one row of a bulk insert.
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    pub status: ResponseStatus,
    pub status_string: Option<String>,
}

impl ClientResponse {
    pub fn success() -> Self {
        Self {
            status: ResponseStatus::Success,
            status_string: None,
        }
    }

    pub fn failure(status: ResponseStatus, status_string: impl Into<String>) -> Self {
        Self {
            status,
            status_string: Some(status_string.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}

/// Per-row status written back to the host: 0 success, 1 failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowStatus {
    Success,
    Failure,
}

impl RowStatus {
    pub fn code(self) -> i64 {
        match self {
            RowStatus::Success => 0,
            RowStatus::Failure => 1,
        }
    }
}
