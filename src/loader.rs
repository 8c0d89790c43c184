// Copyright 2025
// Licensed under the Elastic License v2.0

//! # Batched Loader
//!
//! Rows handed to [`BatchLoader::submit`] go through a bounded queue into a
//! background worker. The worker groups rows into batches (one row per
//! delivery for procedure targets, up to `batch_size` rows for table
//! targets) and spawns each delivery as its own task, so acknowledgments can
//! complete out of submission order. Each row travels with its
//! [`RowMetaData`], and every acknowledgment is fed to the run's
//! [`ErrorTracker`] against the row it belongs to.
//!
//! ```text
//! submit() --mpsc--> worker --spawn--> delivery task --> Destination
//!                      |                    |
//!                      v                    v
//!                 Flush(oneshot)     ErrorTracker::record_outcome
//! ```
//!
//! [`BatchLoader::drain`] flushes the partial batch, waits for every
//! in-flight delivery and then drains the client. No acknowledgment is
//! processed after it returns unless new rows are submitted.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::core::{
    ClientResponse, CoreError, CoreResult, Destination, ResponseStatus, RowMetaData, RowSink,
    RowStatus, Value,
};
use crate::errors::ErrorTracker;

/// Default rows per table-insert delivery
pub const DEFAULT_BATCH_SIZE: usize = 200;

/// Default capacity of the submission queue
pub const DEFAULT_QUEUE_CAPACITY: usize = 1024;

/// Default number of deliveries allowed in flight at once
pub const DEFAULT_MAX_IN_FLIGHT: usize = 64;

/// Where batched rows are delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadTarget {
    /// Each row becomes the positional arguments of one procedure call
    Procedure(String),
    /// Rows are inserted column-mapped into a table, `batch_size` at a time
    Table { name: String, batch_size: usize },
}

impl LoadTarget {
    pub fn batch_size(&self) -> usize {
        match self {
            LoadTarget::Procedure(_) => 1,
            LoadTarget::Table { batch_size, .. } => (*batch_size).max(1),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            LoadTarget::Procedure(name) => name,
            LoadTarget::Table { name, .. } => name,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LoaderOptions {
    pub queue_capacity: usize,
    pub max_in_flight: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            max_in_flight: DEFAULT_MAX_IN_FLIGHT,
        }
    }
}

struct PendingRow {
    meta: RowMetaData,
    values: Vec<Value>,
}

enum Command {
    Row(PendingRow),
    Flush(oneshot::Sender<()>),
}

/// Acknowledgment notice: the row's sequence id and the status it received.
pub type AckNotice = (u64, ResponseStatus);

pub struct BatchLoader<D: Destination> {
    client: Arc<D>,
    target: LoadTarget,
    tracker: Arc<ErrorTracker>,
    tx: mpsc::Sender<Command>,
    worker: JoinHandle<()>,
    cancel: CancellationToken,
}

impl<D: Destination> BatchLoader<D> {
    pub fn new(
        client: Arc<D>,
        target: LoadTarget,
        tracker: Arc<ErrorTracker>,
        cancel: CancellationToken,
    ) -> Self {
        Self::with_options(client, target, tracker, cancel, LoaderOptions::default(), None)
    }

    /// Builds a loader; when `ack_tx` is set every acknowledgment is also
    /// reported on it after the tracker has seen it.
    pub fn with_options(
        client: Arc<D>,
        target: LoadTarget,
        tracker: Arc<ErrorTracker>,
        cancel: CancellationToken,
        options: LoaderOptions,
        ack_tx: Option<mpsc::UnboundedSender<AckNotice>>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(options.queue_capacity.max(1));
        let worker = tokio::spawn(run_worker(
            Arc::clone(&client),
            target.clone(),
            Arc::clone(&tracker),
            rx,
            options.max_in_flight.max(1),
            ack_tx,
        ));

        info!(
            "Batched loader started: target={} batch_size={}",
            target.name(),
            target.batch_size()
        );

        Self {
            client,
            target,
            tracker,
            tx,
            worker,
            cancel,
        }
    }

    pub fn target(&self) -> &LoadTarget {
        &self.target
    }

    pub fn tracker(&self) -> &Arc<ErrorTracker> {
        &self.tracker
    }

    /// Enqueues one row. Waits for queue space; fails with
    /// [`CoreError::Interrupted`] if cancelled or if the pipeline is gone.
    pub async fn submit(&self, meta: RowMetaData, values: Vec<Value>) -> CoreResult<()> {
        let command = Command::Row(PendingRow { meta, values });
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => {
                Err(CoreError::interrupted("bulk loader submission interrupted"))
            }
            sent = self.tx.send(command) => {
                sent.map_err(|_| CoreError::interrupted("bulk loader pipeline closed"))
            }
        }
    }

    /// Blocks until every submitted row has been acknowledged, then drains the client.
    pub async fn drain(&self) -> CoreResult<()> {
        let (done_tx, done_rx) = oneshot::channel();
        self.tx
            .send(Command::Flush(done_tx))
            .await
            .map_err(|_| CoreError::internal_error("bulk loader worker has stopped"))?;
        done_rx
            .await
            .map_err(|_| CoreError::internal_error("bulk loader worker dropped flush"))?;
        self.client.drain().await
    }

    /// Closes the queue and waits for the worker to finish outstanding rows.
    pub async fn close(self) {
        drop(self.tx);
        if let Err(e) = self.worker.await {
            error!("Bulk loader worker failed: {}", e);
        }
    }
}

#[async_trait]
impl<D: Destination> RowSink for BatchLoader<D> {
    fn name(&self) -> &'static str {
        "bulk-loader"
    }

    fn should_stop(&self) -> bool {
        self.tracker.has_reached_limit()
    }

    async fn deliver(&mut self, meta: RowMetaData, values: Vec<Value>) -> CoreResult<RowStatus> {
        self.submit(meta, values).await?;
        Ok(RowStatus::Success)
    }

    async fn drain(&mut self) -> CoreResult<()> {
        BatchLoader::drain(self).await
    }

    fn failed_rows(&self) -> u64 {
        self.tracker.failed_count()
    }
}

/// Shared handles every delivery task needs.
struct Dispatcher<D: Destination> {
    client: Arc<D>,
    target: Arc<LoadTarget>,
    tracker: Arc<ErrorTracker>,
    semaphore: Arc<Semaphore>,
    ack_tx: Option<mpsc::UnboundedSender<AckNotice>>,
}

impl<D: Destination> Dispatcher<D> {
    /// Waits for a delivery slot, then spawns the delivery. While every slot
    /// is taken the worker stops reading the queue, so `submit` blocks once
    /// the queue is full.
    async fn dispatch(&self, rows: Vec<PendingRow>, in_flight: &mut JoinSet<()>) {
        let Ok(permit) = Arc::clone(&self.semaphore).acquire_owned().await else {
            error!("Bulk loader delivery slots closed, dropping {} row(s)", rows.len());
            return;
        };
        let client = Arc::clone(&self.client);
        let target = Arc::clone(&self.target);
        let tracker = Arc::clone(&self.tracker);
        let ack_tx = self.ack_tx.clone();
        in_flight.spawn(async move {
            let _permit = permit;
            deliver_batch(client.as_ref(), &target, rows, &tracker, ack_tx.as_ref()).await;
        });
    }
}

async fn run_worker<D: Destination>(
    client: Arc<D>,
    target: LoadTarget,
    tracker: Arc<ErrorTracker>,
    mut rx: mpsc::Receiver<Command>,
    max_in_flight: usize,
    ack_tx: Option<mpsc::UnboundedSender<AckNotice>>,
) {
    let batch_size = target.batch_size();
    let dispatcher = Dispatcher {
        client,
        target: Arc::new(target),
        tracker,
        semaphore: Arc::new(Semaphore::new(max_in_flight)),
        ack_tx,
    };
    let mut in_flight = JoinSet::new();
    let mut batch: Vec<PendingRow> = Vec::with_capacity(batch_size);

    while let Some(command) = rx.recv().await {
        match command {
            Command::Row(row) => {
                batch.push(row);
                if batch.len() >= batch_size {
                    let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
                    dispatcher.dispatch(full, &mut in_flight).await;
                }
            }
            Command::Flush(done) => {
                if !batch.is_empty() {
                    dispatcher.dispatch(std::mem::take(&mut batch), &mut in_flight).await;
                }
                wait_all(&mut in_flight).await;
                let _ = done.send(());
            }
        }

        while let Some(joined) = in_flight.try_join_next() {
            if let Err(e) = joined {
                error!("Bulk loader delivery task failed: {}", e);
            }
        }
    }

    // Queue closed: finish whatever is left
    if !batch.is_empty() {
        dispatcher.dispatch(std::mem::take(&mut batch), &mut in_flight).await;
    }
    wait_all(&mut in_flight).await;
    debug!("Bulk loader worker stopped");
}

async fn wait_all(in_flight: &mut JoinSet<()>) {
    while let Some(joined) = in_flight.join_next().await {
        if let Err(e) = joined {
            error!("Bulk loader delivery task failed: {}", e);
        }
    }
}

/// Delivers one batch and acknowledges every row in it exactly once.
async fn deliver_batch<D: Destination + ?Sized>(
    client: &D,
    target: &LoadTarget,
    rows: Vec<PendingRow>,
    tracker: &ErrorTracker,
    ack_tx: Option<&mpsc::UnboundedSender<AckNotice>>,
) {
    let responses = match target {
        LoadTarget::Procedure(procedure) => {
            let mut responses = Vec::with_capacity(rows.len());
            for row in &rows {
                let response = match client.call_procedure(procedure, &row.values).await {
                    Ok(response) => response,
                    Err(e) => ClientResponse::failure(ResponseStatus::ConnectionLost, e.to_string()),
                };
                responses.push(response);
            }
            responses
        }
        LoadTarget::Table { name, .. } => {
            let values: Vec<Vec<Value>> = rows.iter().map(|r| r.values.clone()).collect();
            match client.insert_rows(name, &values).await {
                Ok(responses) if responses.len() == rows.len() => responses,
                Ok(responses) => {
                    error!(
                        "Insert into {} returned {} responses for {} rows",
                        name,
                        responses.len(),
                        rows.len()
                    );
                    vec![
                        ClientResponse::failure(ResponseStatus::ResponseUnknown, "response count mismatch");
                        rows.len()
                    ]
                }
                Err(e) => {
                    vec![ClientResponse::failure(ResponseStatus::ConnectionLost, e.to_string()); rows.len()]
                }
            }
        }
    };

    for (row, response) in rows.iter().zip(responses.iter()) {
        tracker.record_outcome(&row.meta, response);
        if let Some(tx) = ack_tx {
            let _ = tx.send((row.meta.seq, response.status));
        }
    }
}
