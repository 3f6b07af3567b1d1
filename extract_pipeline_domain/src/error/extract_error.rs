// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Domain Error System
//!
//! This module provides the error system for the extract pipeline domain. It
//! categorizes failures, provides actionable error messages, and keeps the
//! boundary error names stable for callers that match on them.
//!
//! ## Error Architecture
//!
//! The error system organizes failures into logical categories:
//!
//! #### Pipe construction errors
//! - **CreatePipe**: Invalid step types or positions at pipe build time
//! - **InvalidStepFunctionArguments**: A step was invoked with arguments it
//!   cannot process
//! - **InvalidTransformerGeneratorFunction**: A transformer pipe head is not
//!   a transform
//!
//! #### Binding errors
//! - **ParametrizedResourceUnbound**: A pipe head still requires arguments
//! - **PipeNotBoundToData**: Iteration was requested on a pipe with no data
//!
//! #### Processing errors
//! - **PipeItemProcessing**: An in-flight item violated a dispatch invariant
//! - **ProcessingFailed**: A user transform or offloaded task failed
//! - **Cancelled**: Work was cancelled before completion
//!
//! #### Infrastructure errors
//! - **InvalidConfiguration**: Malformed or out-of-range configuration
//! - **DatabaseError**: Destination or storage operation failures
//! - **SerializationError**: JSON encoding/decoding failures
//! - **IoError**: File system and stream I/O failures
//! - **InternalError**: Unexpected engine failures
//!
//! ## Propagation Policy
//!
//! No error is silently swallowed except cancellations: every failure bubbles
//! out of the driving iterator's `next()` call and terminates iteration.

use thiserror::Error;

/// Domain-specific errors for the extract pipeline engine.
///
/// Each variant carries a descriptive message; variants that concern a
/// specific pipe carry the pipe name first so failures can be attributed to a
/// node of the fan-out graph.
#[derive(Error, Debug, Clone)]
pub enum ExtractError {
    /// A pipe could not be created or modified.
    #[error("cannot create pipe '{0}': {1}")]
    CreatePipe(String, String),

    /// A step was invoked with arguments it cannot process.
    #[error("invalid step function arguments in pipe '{0}' at step {1}: {2}")]
    InvalidStepFunctionArguments(String, usize, String),

    /// The head of a transformer pipe is not a transform step.
    #[error("invalid transformer generator in pipe '{0}': {1}")]
    InvalidTransformerGeneratorFunction(String, String),

    /// A pipe head is parametrized and its arguments were never bound.
    #[error("resource '{0}' is parametrized and cannot be evaluated: {1}")]
    ParametrizedResourceUnbound(String, String),

    /// An in-flight item violated a dispatch invariant.
    #[error("error processing item in pipe '{0}' at step {1}: {2}. This is an internal error or the pipe graph routes items outside of its steps")]
    PipeItemProcessing(String, usize, String),

    /// Iteration was requested on a pipe that has no data to produce.
    #[error("pipe '{0}' is not bound to data (has parent: {1})")]
    PipeNotBoundToData(String, bool),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("processing failed: {0}")]
    ProcessingFailed(String),

    #[error("database error: {0}")]
    DatabaseError(String),

    #[error("serialization error: {0}")]
    SerializationError(String),

    #[error("IO error: {0}")]
    IoError(String),

    #[error("cancelled: {0}")]
    Cancelled(String),

    #[error("internal error: {0}")]
    InternalError(String),
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        ExtractError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for ExtractError {
    fn from(err: serde_json::Error) -> Self {
        ExtractError::SerializationError(err.to_string())
    }
}
