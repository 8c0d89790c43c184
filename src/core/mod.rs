// Copyright 2025
// Licensed under the Elastic License v2.0

//! Core types shared by every part of the bridge

pub mod error;
pub mod record;
pub mod traits;

pub use error::{CoreError, CoreResult};
pub use record::{ClientResponse, ResponseStatus, RowMetaData, RowStatus, SourceType, Value};
pub use traits::{Destination, RowCursor, RowSink, StatusWriter};
