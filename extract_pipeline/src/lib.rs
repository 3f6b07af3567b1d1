// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extract Pipeline
//!
//! A data extraction pipe engine: a dynamically assembled directed graph of
//! data-producing and data-transforming steps, executed by a single driving
//! iterator with bounded parallelism, cancellation, and graceful teardown.
//!
//! ## Core Concepts
//!
//! ### Pipes
//! A pipe is an ordered sequence of steps with an optional parent pipe. A
//! parentless pipe generates its own items; a pipe with a parent transforms
//! the parent's items. Forks route items from one pipe into many.
//!
//! ### The dispatcher
//! [`PipeIterator`] pulls one item at a time through the remaining steps of
//! its pipe. Transforms run on the driver thread; returned awaitables run on
//! a background async loop; returned callables run on a bounded thread pool.
//! At most `max_parallel_items` offloaded computations are in flight, and the
//! stream is ordered within a branch but unordered across concurrency
//! boundaries.
//!
//! ## Quick Start
//!
//! ```
//! use extract_pipeline::infrastructure::config::ExtractConfig;
//! use extract_pipeline::infrastructure::runtime::PipeIterator;
//! use extract_pipeline_domain::entities::{Pipe, PipeStep};
//! use serde_json::json;
//!
//! let pipe = Pipe::from_data("numbers", PipeStep::items(vec![json!(1), json!(2)])).unwrap();
//! pipe.append_step(PipeStep::map(|v| json!(v.as_i64().unwrap() * 10))).unwrap();
//!
//! let config = ExtractConfig::default();
//! let values: Vec<_> = PipeIterator::from_pipe(&pipe, &config)
//!     .unwrap()
//!     .map(|r| r.unwrap().item)
//!     .collect();
//! assert_eq!(values, vec![json!(10), json!(20)]);
//! ```
//!
//! ## Error Handling
//!
//! Every failure surfaces as an [`ExtractError`] from the driving iterator's
//! `next()` call; the managed variant releases its scoped resource before
//! re-yielding the error. Cancellations are the only silently skipped
//! outcome.

pub mod infrastructure;

pub use infrastructure::config::ExtractConfig;
pub use infrastructure::runtime::{
    ExtractionScope, LoadScope, ManagedPipeIterator, PipeIterator,
};

pub use extract_pipeline_domain::{
    clone_pipes, DataItem, ExtractError, ItemMeta, Pipe, PipeItem, PipeStep,
};
