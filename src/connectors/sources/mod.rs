// Copyright 2025
// Licensed under the Elastic License v2.0

//! Source connectors
//!
//! Each source implements the `RowCursor` trait from `crate::core::traits`.

pub mod postgres;

pub use postgres::PostgresRowSource;
