// Copyright 2025
// Licensed under the Elastic License v2.0

//! Bridge setup and run orchestration.
//!
//! A run validates its parameters, connects to every cluster node, builds
//! the row sink for its mode and then hands the source cursor to the
//! [`RowStreamDriver`]. Configuration and connection failures abort before
//! any row is read.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::caller::ProcedureCaller;
use crate::cluster::{self, BackoffPolicy};
use crate::config::{BridgeMode, BridgeParams, BridgeSettings};
use crate::core::{CoreError, CoreResult, Destination, RowCursor, StatusWriter};
use crate::driver::{RowStreamDriver, RunReport};
use crate::errors::ErrorTracker;
use crate::loader::{BatchLoader, LoadTarget, LoaderOptions};

/// A configured bridge, ready to run against a source cursor.
pub struct Bridge<D: Destination> {
    settings: BridgeSettings,
    client: Arc<D>,
    backoff: BackoffPolicy,
    options: LoaderOptions,
    cancel: CancellationToken,
}

impl<D: Destination> Bridge<D> {
    /// Validates `params` for `mode`. Fails with a configuration error
    /// before any connection is attempted.
    pub fn setup(
        mode: BridgeMode,
        params: &BridgeParams,
        client: Arc<D>,
        cancel: CancellationToken,
    ) -> CoreResult<Self> {
        let settings = BridgeSettings::from_params(mode, params)?;
        Ok(Self {
            settings,
            client,
            backoff: BackoffPolicy::default(),
            options: LoaderOptions::default(),
            cancel,
        })
    }

    /// Synchronous procedure calls with one status per row.
    pub fn call(params: &BridgeParams, client: Arc<D>, cancel: CancellationToken) -> CoreResult<Self> {
        Self::setup(BridgeMode::Call, params, client, cancel)
    }

    /// Batched loading with an error limit.
    pub fn load(params: &BridgeParams, client: Arc<D>, cancel: CancellationToken) -> CoreResult<Self> {
        Self::setup(BridgeMode::Load, params, client, cancel)
    }

    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn with_loader_options(mut self, options: LoaderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn settings(&self) -> &BridgeSettings {
        &self.settings
    }

    /// Connects, streams every row of `cursor` and drains.
    ///
    /// In call mode one status is written to `out` per row. In load mode the
    /// statuses only reflect whether a row was accepted for delivery; the
    /// outcome of each delivery shows up in the report and the logs.
    pub async fn run<C, W>(&self, cursor: &mut C, out: &mut W) -> CoreResult<RunReport>
    where
        C: RowCursor + ?Sized,
        W: StatusWriter + ?Sized,
    {
        let connections = cluster::connect(
            Arc::clone(&self.client),
            self.settings.endpoints.clone(),
            self.backoff,
            &self.cancel,
        )
        .await?;
        info!(
            "Connected to {} VoltDB node(s) via {}",
            connections.endpoints().len(),
            self.client.name()
        );

        let driver = RowStreamDriver::new(self.cancel.clone());

        match self.settings.mode {
            BridgeMode::Call => {
                let LoadTarget::Procedure(procedure) = &self.settings.target else {
                    return Err(CoreError::config_error(
                        "call mode requires a procedure target",
                    ));
                };
                let mut caller = ProcedureCaller::new(connections.client(), procedure.as_str());
                driver.run(cursor, &mut caller, out).await
            }
            BridgeMode::Load => {
                let tracker = Arc::new(ErrorTracker::new(self.settings.error_limit));
                let mut loader = BatchLoader::with_options(
                    connections.client(),
                    self.settings.target.clone(),
                    tracker,
                    self.cancel.clone(),
                    self.options,
                    None,
                );
                let result = driver.run(cursor, &mut loader, out).await;
                loader.close().await;
                result
            }
        }
    }
}
