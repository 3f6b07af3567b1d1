// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extract Pipeline Domain
//!
//! The domain model of the extract pipeline engine, independent of any
//! runtime, database, or configuration concern.
//!
//! ## Module Structure
//!
//! ### Entities
//! Objects with identity that change state while keeping that identity:
//!
//! - [`entities::Pipe`]: an ordered sequence of steps with an optional parent
//!   pipe feeding its head
//! - [`entities::PipeStep`]: one producer, transform, or fork step
//! - [`entities::Schema`]: the versioned table catalog of a destination
//!
//! ### Value Objects
//! Immutable objects defined by their attributes:
//!
//! - [`value_objects::PipeId`]: pipe identity that survives cloning
//! - the in-flight item shapes ([`value_objects::PipeItem`],
//!   [`value_objects::ResolvableItem`], [`value_objects::StepPayload`], ...)
//! - schema boundary objects ([`value_objects::TableSchema`],
//!   [`value_objects::SchemaVersionInfo`], ...)
//!
//! ### Services
//! Traits implemented by the infrastructure layer, such as
//! [`services::DestinationJobClient`].
//!
//! ## Business Rules
//!
//! The pipe model enforces the admission rules at build time: the head of a
//! parentless pipe must be able to generate data, every other step must be a
//! transform of the canonical `(item, meta)` shape, the data-generating step
//! cannot be removed, and a step can never be prepended before the head of a
//! parentless pipe.

pub mod entities;
pub mod error;
pub mod services;
pub mod value_objects;

pub use entities::{clone_pipes, Pipe, PipeStep, Schema};
pub use error::ExtractError;
pub use value_objects::{
    meta_from, DataItem, ItemMeta, OffloadOutput, PipeId, PipeItem, ResolvableItem, SourceEntry,
    SourceIter, StepPayload,
};
