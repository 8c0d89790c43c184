// Copyright 2025
// Licensed under the Elastic License v2.0

use async_trait::async_trait;
use chrono::NaiveDateTime;

use crate::cluster::Endpoint;
use crate::core::error::CoreResult;
use crate::core::record::{ClientResponse, RowMetaData, RowStatus, SourceType, Value};

/// Forward-only cursor over the rows supplied by the host data source.
///
/// The cursor starts positioned before the first row; [`RowCursor::advance`]
/// must return `true` before any accessor is called. Accessors return `None`
/// for a null cell.
#[async_trait]
pub trait RowCursor: Send {
    /// Number of columns negotiated at setup
    fn column_count(&self) -> usize;

    /// Declared source type of a column
    fn column_type(&self, col: usize) -> SourceType;

    fn get_long(&self, col: usize) -> Option<i64>;

    fn get_string(&self, col: usize) -> Option<String>;

    fn get_double(&self, col: usize) -> Option<f64>;

    fn get_timestamp(&self, col: usize) -> Option<NaiveDateTime>;

    fn get_bool(&self, col: usize) -> Option<bool>;

    /// Null check used for date columns, separate from the timestamp accessor
    fn is_date_null(&self, col: usize) -> bool;

    /// Moves to the next row. Returns `false` once the source is exhausted.
    async fn advance(&mut self) -> CoreResult<bool>;
}

/// Client for the destination database cluster.
///
/// One client holds the connections to every node; invocations are routed
/// by the client across whatever connections it has.
#[async_trait]
pub trait Destination: Send + Sync + 'static {
    /// Returns the name of the destination implementation
    fn name(&self) -> &'static str;

    /// Opens one connection to an endpoint. Fails fast per attempt.
    async fn connect(&self, endpoint: &Endpoint) -> CoreResult<()>;

    /// Invokes a procedure with positional arguments and waits for its response.
    async fn call_procedure(&self, procedure: &str, params: &[Value]) -> CoreResult<ClientResponse>;

    /// Inserts a batch of rows into a table; returns one response per row, in order.
    async fn insert_rows(&self, table: &str, rows: &[Vec<Value>]) -> CoreResult<Vec<ClientResponse>>;

    /// Blocks until every outstanding invocation on the client has completed.
    async fn drain(&self) -> CoreResult<()>;
}

/// Delivery half of the row loop: either per-row synchronous calls or the
/// batched loader.
#[async_trait]
pub trait RowSink: Send {
    fn name(&self) -> &'static str;

    /// True once the sink wants no further rows (error limit latched)
    fn should_stop(&self) -> bool {
        false
    }

    /// Hands one coerced row to the destination.
    async fn deliver(&mut self, meta: RowMetaData, values: Vec<Value>) -> CoreResult<RowStatus>;

    /// Waits for all delivered rows to be acknowledged and flushes the client.
    async fn drain(&mut self) -> CoreResult<()>;

    /// Rows the destination has rejected so far
    fn failed_rows(&self) -> u64;
}

/// Per-row output channel back to the host.
pub trait StatusWriter: Send {
    fn write_status(&mut self, status: RowStatus);
}

impl StatusWriter for Vec<i64> {
    fn write_status(&mut self, status: RowStatus) {
        self.push(status.code());
    }
}
