// Copyright 2025
// Licensed under the Elastic License v2.0

//! voltload streams typed rows from a source cursor into a VoltDB cluster,
//! either as one synchronous procedure call per row or through a batched
//! loader with an error limit.

pub mod bridge;
pub mod caller;
pub mod cluster;
pub mod coerce;
pub mod config;
pub mod connectors;
pub mod core;
pub mod driver;
pub mod errors;
pub mod loader;

#[cfg(test)]
mod test_support;

pub use bridge::Bridge;
pub use config::{BridgeMode, BridgeParams, BridgeSettings, Config};
pub use driver::RunReport;
