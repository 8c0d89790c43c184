// Copyright 2025
// Licensed under the Elastic License v2.0

//! Destination connectors
//!
//! Each destination implements the `Destination` trait from `crate::core::traits`.

pub mod http;

pub use http::{
    HttpDestination, HttpDestinationConfig, DEFAULT_HTTP_PORT, DEFAULT_MAX_CONCURRENT_INSERTS,
};
