// Copyright 2025
// Licensed under the Elastic License v2.0

//! Connectors module for voltload
//!
//! # Sources
//! - `postgres` - rows of a PostgreSQL query
//!
//! # Destinations
//! - `http` - VoltDB through its JSON HTTP interface

pub mod destinations;
pub mod sources;
