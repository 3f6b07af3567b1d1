// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Infrastructure Layer
//!
//! Concrete implementations around the domain model: the dispatcher runtime,
//! configuration loading, logging setup, persistence, and boundary services.

pub mod config;
pub mod logging;
pub mod repositories;
pub mod runtime;
pub mod services;
