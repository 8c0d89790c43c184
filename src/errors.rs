// Copyright 2025
// Licensed under the Elastic License v2.0

//! Failed-row accounting for the batched loader.
//!
//! One [`ErrorTracker`] is owned by a single run and shared (via `Arc`) with
//! the loader's delivery tasks. The stop latch is only ever set, never cleared.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use tracing::error;

use crate::core::{ClientResponse, RowMetaData};

/// Default number of failed rows tolerated before a run stops
pub const DEFAULT_MAX_ERRORS: u64 = 100;

/// Maximum number of failed rows before the run is stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorLimit {
    Unlimited,
    /// Stop once more than this many rows have failed
    MaxCount(u64),
}

impl ErrorLimit {
    /// Non-positive values disable the limit.
    pub fn from_param(maxerrors: i64) -> Self {
        if maxerrors > 0 {
            ErrorLimit::MaxCount(maxerrors as u64)
        } else {
            ErrorLimit::Unlimited
        }
    }

    pub fn is_exceeded_by(&self, failed: u64) -> bool {
        match self {
            ErrorLimit::Unlimited => false,
            ErrorLimit::MaxCount(max) => failed > *max,
        }
    }
}

impl Default for ErrorLimit {
    fn default() -> Self {
        ErrorLimit::MaxCount(DEFAULT_MAX_ERRORS)
    }
}

impl fmt::Display for ErrorLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorLimit::Unlimited => write!(f, "unlimited"),
            ErrorLimit::MaxCount(max) => write!(f, "{}", max),
        }
    }
}

pub struct ErrorTracker {
    limit: ErrorLimit,
    failed: AtomicU64,
    stop: AtomicBool,
}

impl ErrorTracker {
    pub fn new(limit: ErrorLimit) -> Self {
        Self {
            limit,
            failed: AtomicU64::new(0),
            stop: AtomicBool::new(false),
        }
    }

    /// Records the acknowledgment of one row. Returns `true` when the run
    /// should stop: either the failure count went past the limit, or the
    /// status is a harder failure than a user abort / graceful failure.
    pub fn record_outcome(&self, meta: &RowMetaData, response: &ClientResponse) -> bool {
        if response.is_success() {
            return false;
        }

        error!(
            "Failed to Insert Row: {}, Response: {}, Error: {}",
            meta.raw_line,
            response.status,
            response.status_string.as_deref().unwrap_or("")
        );
        let failed = self.failed.fetch_add(1, Ordering::AcqRel) + 1;

        if self.limit.is_exceeded_by(failed) || !response.status.is_soft_failure() {
            self.stop.store(true, Ordering::Release);
            return true;
        }
        false
    }

    /// Re-evaluates the count against the limit, latching stop if exceeded.
    pub fn has_reached_limit(&self) -> bool {
        if self.limit.is_exceeded_by(self.failed_count()) {
            self.stop.store(true, Ordering::Release);
        }
        self.is_stopped()
    }

    pub fn is_stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    pub fn failed_count(&self) -> u64 {
        self.failed.load(Ordering::Acquire)
    }

    pub fn limit(&self) -> ErrorLimit {
        self.limit
    }
}

impl Default for ErrorTracker {
    fn default() -> Self {
        Self::new(ErrorLimit::default())
    }
}
