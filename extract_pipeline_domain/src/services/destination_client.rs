// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Destination Job Client Service
//!
//! The surface a destination presents to an extraction run. The pipe engine
//! never calls this trait; a load step downstream of the driving iterator
//! feeds the yielded items into it.

use async_trait::async_trait;

use crate::value_objects::{DataItem, SchemaVersionInfo};
use crate::ExtractError;

/// A client able to receive extracted items and keep the destination schema
/// in step with the source schema.
#[async_trait]
pub trait DestinationJobClient {
    /// Creates the destination storage if it does not exist yet.
    async fn initialize_storage(&mut self) -> Result<(), ExtractError>;

    /// Whether the destination storage exists.
    async fn is_storage_initialized(&mut self) -> Result<bool, ExtractError>;

    /// Brings the stored schema up to date with the client's schema, emitting
    /// DDL for new tables and columns and recording a new version row when
    /// anything changed.
    async fn update_storage_schema(&mut self) -> Result<(), ExtractError>;

    /// Writes a batch of extracted items into `table`, returning the number
    /// of rows written.
    async fn write_items(&mut self, table: &str, items: &[DataItem]) -> Result<u64, ExtractError>;

    /// Newest stored schema version row for this client's schema, if any.
    async fn newest_stored_schema(&mut self) -> Result<Option<SchemaVersionInfo>, ExtractError>;

    /// Records the completion of a load package.
    async fn complete_load(&mut self, load_id: &str) -> Result<(), ExtractError>;
}
