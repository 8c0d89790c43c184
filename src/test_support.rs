// Copyright 2025
// Licensed under the Elastic License v2.0

//! In-memory collaborators shared by the unit tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDateTime;
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::cluster::Endpoint;
use crate::core::{
    ClientResponse, CoreError, CoreResult, Destination, RowCursor, SourceType, Value,
};

type Responder = Box<dyn Fn(&[Value]) -> CoreResult<ClientResponse> + Send + Sync>;
type Delay = Box<dyn Fn(&[Value]) -> Duration + Send + Sync>;

/// Scripted destination that records everything it is asked to do.
pub struct MockDestination {
    connect_failures: Mutex<HashMap<String, u32>>,
    rejected: Mutex<Vec<String>>,
    connect_log: Mutex<Vec<(String, Instant)>>,
    calls: Mutex<Vec<(String, Vec<Value>)>>,
    inserts: Mutex<Vec<(String, usize)>>,
    responder: Mutex<Responder>,
    delay: Mutex<Option<Delay>>,
    drains: AtomicUsize,
}

impl MockDestination {
    pub fn new() -> Self {
        Self {
            connect_failures: Mutex::new(HashMap::new()),
            rejected: Mutex::new(Vec::new()),
            connect_log: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            inserts: Mutex::new(Vec::new()),
            responder: Mutex::new(Box::new(|_| Ok(ClientResponse::success()))),
            delay: Mutex::new(None),
            drains: AtomicUsize::new(0),
        }
    }

    /// The next `times` connection attempts to `host` fail.
    pub fn fail_connects(&self, host: &str, times: u32) {
        self.connect_failures.lock().insert(host.to_string(), times);
    }

    /// Every connection attempt to `host` fails with a configuration error.
    pub fn reject_endpoint(&self, host: &str) {
        self.rejected.lock().push(host.to_string());
    }

    pub fn set_responder(
        &self,
        responder: impl Fn(&[Value]) -> CoreResult<ClientResponse> + Send + Sync + 'static,
    ) {
        *self.responder.lock() = Box::new(responder);
    }

    pub fn set_delay(&self, delay: impl Fn(&[Value]) -> Duration + Send + Sync + 'static) {
        *self.delay.lock() = Some(Box::new(delay));
    }

    pub fn connect_attempts(&self, host: &str) -> Vec<Instant> {
        self.connect_log
            .lock()
            .iter()
            .filter(|(h, _)| h == host)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn calls(&self, procedure: &str) -> Vec<Vec<Value>> {
        self.calls
            .lock()
            .iter()
            .filter(|(p, _)| p == procedure)
            .map(|(_, params)| params.clone())
            .collect()
    }

    pub fn insert_batch_sizes(&self, table: &str) -> Vec<usize> {
        self.inserts
            .lock()
            .iter()
            .filter(|(t, _)| t == table)
            .map(|(_, n)| *n)
            .collect()
    }

    pub fn drain_count(&self) -> usize {
        self.drains.load(Ordering::SeqCst)
    }

    fn delay_for(&self, values: &[Value]) -> Duration {
        self.delay
            .lock()
            .as_ref()
            .map(|d| d(values))
            .unwrap_or(Duration::ZERO)
    }

    fn respond(&self, values: &[Value]) -> CoreResult<ClientResponse> {
        (*self.responder.lock())(values)
    }
}

#[async_trait]
impl Destination for MockDestination {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn connect(&self, endpoint: &Endpoint) -> CoreResult<()> {
        self.connect_log
            .lock()
            .push((endpoint.host.clone(), Instant::now()));

        if self.rejected.lock().contains(&endpoint.host) {
            return Err(CoreError::config_error(format!("{} is not a usable address", endpoint)));
        }

        let mut failures = self.connect_failures.lock();
        match failures.get_mut(&endpoint.host) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                Err(CoreError::connection_error(format!("{} refused", endpoint)))
            }
            _ => Ok(()),
        }
    }

    async fn call_procedure(&self, procedure: &str, params: &[Value]) -> CoreResult<ClientResponse> {
        self.calls
            .lock()
            .push((procedure.to_string(), params.to_vec()));

        let delay = self.delay_for(params);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.respond(params)
    }

    async fn insert_rows(&self, table: &str, rows: &[Vec<Value>]) -> CoreResult<Vec<ClientResponse>> {
        self.inserts.lock().push((table.to_string(), rows.len()));

        let delay = rows
            .iter()
            .map(|r| self.delay_for(r))
            .max()
            .unwrap_or(Duration::ZERO);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        rows.iter().map(|r| self.respond(r)).collect()
    }

    async fn drain(&self) -> CoreResult<()> {
        self.drains.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Cell contents for [`VecCursor`].
#[derive(Debug, Clone)]
pub enum TestCell {
    Null,
    Int(i64),
    Str(String),
    Float(f64),
    Ts(NaiveDateTime),
    Bool(bool),
    /// Timestamp accessor yields a value, but the date null check reports null
    FlaggedNullDate(NaiveDateTime),
}

/// Row cursor over an in-memory table.
pub struct VecCursor {
    types: Vec<SourceType>,
    rows: Vec<Vec<TestCell>>,
    pos: Option<usize>,
    advance_delay: Duration,
}

impl VecCursor {
    pub fn new(types: Vec<SourceType>, rows: Vec<Vec<TestCell>>) -> Self {
        Self {
            types,
            rows,
            pos: None,
            advance_delay: Duration::ZERO,
        }
    }

    pub fn with_advance_delay(mut self, delay: Duration) -> Self {
        self.advance_delay = delay;
        self
    }

    fn cell(&self, col: usize) -> &TestCell {
        let row = self.pos.expect("cursor not positioned on a row");
        &self.rows[row][col]
    }
}

#[async_trait]
impl RowCursor for VecCursor {
    fn column_count(&self) -> usize {
        self.types.len()
    }

    fn column_type(&self, col: usize) -> SourceType {
        self.types[col].clone()
    }

    fn get_long(&self, col: usize) -> Option<i64> {
        match self.cell(col) {
            TestCell::Int(v) => Some(*v),
            _ => None,
        }
    }

    fn get_string(&self, col: usize) -> Option<String> {
        match self.cell(col) {
            TestCell::Str(s) => Some(s.clone()),
            _ => None,
        }
    }

    fn get_double(&self, col: usize) -> Option<f64> {
        match self.cell(col) {
            TestCell::Float(v) => Some(*v),
            _ => None,
        }
    }

    fn get_timestamp(&self, col: usize) -> Option<NaiveDateTime> {
        match self.cell(col) {
            TestCell::Ts(ts) | TestCell::FlaggedNullDate(ts) => Some(*ts),
            _ => None,
        }
    }

    fn get_bool(&self, col: usize) -> Option<bool> {
        match self.cell(col) {
            TestCell::Bool(b) => Some(*b),
            _ => None,
        }
    }

    fn is_date_null(&self, col: usize) -> bool {
        matches!(self.cell(col), TestCell::Null | TestCell::FlaggedNullDate(_))
    }

    async fn advance(&mut self) -> CoreResult<bool> {
        if !self.advance_delay.is_zero() {
            tokio::time::sleep(self.advance_delay).await;
        }
        let next = self.pos.map_or(0, |p| p + 1);
        if next < self.rows.len() {
            self.pos = Some(next);
            Ok(true)
        } else {
            self.pos = Some(self.rows.len());
            Ok(false)
        }
    }
}
