// Copyright 2025
// Licensed under the Elastic License v2.0

//! Row Stream Driver
//!
//! Single-threaded outer loop of a run:
//!
//! ```text
//! Reading --row--> Dispatching --delivered--> Reading
//!    |                  |
//!    | exhausted        | limit latched / interrupted
//!    v                  v
//! Draining <------------+
//!    |
//!    v
//!  Done
//! ```
//!
//! The sink is drained exactly once per run, whatever ended the loop.

use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::coerce::coerce_row;
use crate::core::{CoreError, CoreResult, RowCursor, RowMetaData, RowSink, RowStatus, StatusWriter};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DriverState {
    Reading,
    Dispatching,
    Draining,
    Done,
}

/// Summary of one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// Rows read from the source and handed to the sink
    pub rows_read: u64,
    /// Rows the destination rejected
    pub failed_rows: u64,
    /// The loop stopped early because the error limit latched
    pub stopped_on_limit: bool,
}

pub struct RowStreamDriver {
    cancel: CancellationToken,
}

impl RowStreamDriver {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Streams every row from `cursor` into `sink`, writing one status per
    /// delivered row to `out`.
    ///
    /// An interruption or source failure still drains the sink before the
    /// error is returned.
    pub async fn run<C, S, W>(&self, cursor: &mut C, sink: &mut S, out: &mut W) -> CoreResult<RunReport>
    where
        C: RowCursor + ?Sized,
        S: RowSink + ?Sized,
        W: StatusWriter + ?Sized,
    {
        let mut report = RunReport::default();
        let mut failure: Option<CoreError> = None;
        let mut next_seq: u64 = 0;
        let mut state = DriverState::Reading;

        loop {
            state = match state {
                DriverState::Reading => {
                    if self.cancel.is_cancelled() {
                        failure = Some(CoreError::interrupted("row stream cancelled"));
                        DriverState::Draining
                    } else {
                        match cursor.advance().await {
                            Ok(true) => DriverState::Dispatching,
                            Ok(false) => DriverState::Draining,
                            Err(e) => {
                                error!("Failed to read next row: {}", e);
                                failure = Some(e);
                                DriverState::Draining
                            }
                        }
                    }
                }
                DriverState::Dispatching => {
                    if sink.should_stop() {
                        warn!(
                            "Reached max error limit for {}: {} failed row(s)",
                            sink.name(),
                            sink.failed_rows()
                        );
                        report.stopped_on_limit = true;
                        DriverState::Draining
                    } else {
                        let row = coerce_row(&*cursor);
                        let meta = RowMetaData::new(row.raw_line, next_seq);
                        next_seq += 1;
                        report.rows_read += 1;

                        match sink.deliver(meta, row.values).await {
                            Ok(status) => {
                                out.write_status(status);
                                DriverState::Reading
                            }
                            Err(e) => {
                                error!("Bulkloader interrupted: {}", e);
                                out.write_status(RowStatus::Failure);
                                failure = Some(e);
                                DriverState::Draining
                            }
                        }
                    }
                }
                DriverState::Draining => {
                    debug!("Draining {} after {} row(s)", sink.name(), report.rows_read);
                    if let Err(e) = sink.drain().await {
                        error!("Failed to flush {}: {}", sink.name(), e);
                    }
                    report.failed_rows = sink.failed_rows();
                    info!(
                        "voltload failed to load {} rows, see logs for row details.",
                        report.failed_rows
                    );
                    DriverState::Done
                }
                DriverState::Done => break,
            };
        }

        match failure {
            Some(e) => Err(e),
            None => Ok(report),
        }
    }
}
