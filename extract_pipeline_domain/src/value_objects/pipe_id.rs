// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Identifier Value Object
//!
//! This module provides the identity of a pipe within a fan-out graph.
//!
//! ## Overview
//!
//! Fork edges compare pipes by identity, and that identity must survive the
//! clone step performed before every iteration so that edges created against
//! a user's pipe still match the working clone. `PipeId` therefore lives
//! apart from the pipe's memory address:
//!
//! - **Type-Safe Identification**: A `PipeId` cannot be confused with other
//!   identifiers in the system
//! - **Temporal Ordering**: ULID-based time-ordered creation sequence
//! - **Clone Stability**: Cloning a pipe preserves the id by default and only
//!   mints a new one on request
//! - **Serialization**: Stored and logged as the canonical 26-character ULID
//!   string

use serde::{Deserialize, Serialize};
use std::fmt::{self, Display};
use std::str::FromStr;
use ulid::Ulid;

use crate::ExtractError;

/// Stable opaque identity of a pipe.
///
/// The id is minted when the pipe is created and shared by every clone made
/// with identity preservation, so fork membership checks keep matching after
/// the pre-iteration clone pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PipeId(Ulid);

impl PipeId {
    /// Mints a new unique pipe id.
    pub fn new() -> Self {
        PipeId(Ulid::new())
    }

    /// Returns the nil id, used only as a placeholder in tests.
    pub fn nil() -> Self {
        PipeId(Ulid::nil())
    }

    /// Parses an id from its canonical ULID string form.
    pub fn from_string(s: &str) -> Result<Self, ExtractError> {
        Ulid::from_string(s)
            .map(PipeId)
            .map_err(|e| ExtractError::InvalidConfiguration(format!("invalid pipe id '{}': {}", s, e)))
    }

    /// Returns the underlying ULID.
    pub fn as_ulid(&self) -> Ulid {
        self.0
    }

    /// Milliseconds since epoch encoded in the id, for creation ordering.
    pub fn timestamp_ms(&self) -> u64 {
        self.0.timestamp_ms()
    }
}

impl Default for PipeId {
    fn default() -> Self {
        Self::new()
    }
}

impl Display for PipeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for PipeId {
    type Err = ExtractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_string(s)
    }
}
