// Copyright 2025
// Licensed under the Elastic License v2.0

//! Synchronous per-row procedure calls.
//!
//! Every row is attempted regardless of earlier failures; there is no error
//! limit in this mode.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::error;

use crate::core::{CoreResult, Destination, RowMetaData, RowSink, RowStatus, Value};

pub struct ProcedureCaller<D: Destination> {
    client: Arc<D>,
    procedure: String,
    failed: AtomicU64,
}

impl<D: Destination> ProcedureCaller<D> {
    pub fn new(client: Arc<D>, procedure: impl Into<String>) -> Self {
        Self {
            client,
            procedure: procedure.into(),
            failed: AtomicU64::new(0),
        }
    }

    pub fn procedure(&self) -> &str {
        &self.procedure
    }

    /// Calls the procedure once and waits for the response.
    pub async fn dispatch_one(&self, meta: &RowMetaData, values: &[Value]) -> RowStatus {
        match self.client.call_procedure(&self.procedure, values).await {
            Ok(response) if response.is_success() => RowStatus::Success,
            Ok(response) => {
                error!(
                    "Failed to call procedure {}, Row: {}, Status: {}, Error: {}",
                    self.procedure,
                    meta.raw_line,
                    response.status,
                    response.status_string.as_deref().unwrap_or("")
                );
                self.failed.fetch_add(1, Ordering::Relaxed);
                RowStatus::Failure
            }
            Err(e) => {
                error!(
                    "Failed to call procedure {}, Row: {}, Error: {}",
                    self.procedure, meta.raw_line, e
                );
                self.failed.fetch_add(1, Ordering::Relaxed);
                RowStatus::Failure
            }
        }
    }
}

#[async_trait]
impl<D: Destination> RowSink for ProcedureCaller<D> {
    fn name(&self) -> &'static str {
        "procedure-caller"
    }

    async fn deliver(&mut self, meta: RowMetaData, values: Vec<Value>) -> CoreResult<RowStatus> {
        Ok(self.dispatch_one(&meta, &values).await)
    }

    async fn drain(&mut self) -> CoreResult<()> {
        self.client.drain().await
    }

    fn failed_rows(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }
}
