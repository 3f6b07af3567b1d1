// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Value Objects
//!
//! Immutable objects defined by their attributes rather than an identity:
//!
//! - [`PipeId`]: stable opaque identity of a pipe, surviving clones
//! - in-flight item shapes ([`PipeItem`], [`ResolvableItem`], [`StepPayload`],
//!   [`SourceEntry`], [`OffloadOutput`]) and the item/meta aliases
//! - schema boundary objects ([`ColumnSchema`], [`TableSchema`],
//!   [`SchemaVersionInfo`], [`WarehouseType`])

pub mod pipe_id;
pub mod pipe_item;
pub mod schema_types;

pub use pipe_id::PipeId;
pub use pipe_item::{
    meta_from, DataItem, DeferredFn, ItemFuture, ItemMeta, OffloadOutput, PipeItem,
    ResolvableItem, SourceEntry, SourceIter, StepPayload,
};
pub use schema_types::{ColumnSchema, SchemaVersionInfo, TableSchema, WarehouseType};
