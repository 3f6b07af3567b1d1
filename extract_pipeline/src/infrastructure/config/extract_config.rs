// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Extract Stage Configuration
//!
//! Settings of the driving iterator, read from the `extract` section.
//!
//! ## Overview
//!
//! - **max_parallel_items**: hard cap on in-flight offloaded work
//! - **workers**: size of the blocking thread pool
//! - **futures_poll_interval**: driver sleep between polls, in seconds
//! - **copy_on_fork**: whether fork edges beyond the first receive copies
//!
//! ## Sources and precedence
//!
//! Configuration is layered: built-in defaults, then an optional TOML file,
//! then `EXTRACT__`-prefixed environment variables. All values are validated
//! after loading.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use extract_pipeline_domain::ExtractError;

use super::sections;

pub const DEFAULT_MAX_PARALLEL_ITEMS: usize = 20;
pub const DEFAULT_WORKERS: usize = 5;
pub const DEFAULT_FUTURES_POLL_INTERVAL: f64 = 0.01;

fn default_max_parallel_items() -> usize {
    DEFAULT_MAX_PARALLEL_ITEMS
}

fn default_workers() -> usize {
    DEFAULT_WORKERS
}

fn default_futures_poll_interval() -> f64 {
    DEFAULT_FUTURES_POLL_INTERVAL
}

/// Configuration record of the extract stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Maximum number of offloaded computations in flight at any moment.
    #[serde(default = "default_max_parallel_items")]
    pub max_parallel_items: usize,

    /// Number of threads in the blocking pool.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Driver sleep between future polls, in seconds.
    #[serde(default = "default_futures_poll_interval")]
    pub futures_poll_interval: f64,

    /// Whether fork edges beyond the first receive copies of each item.
    #[serde(default)]
    pub copy_on_fork: bool,
}

impl Default for ExtractConfig {
    fn default() -> Self {
        ExtractConfig {
            max_parallel_items: DEFAULT_MAX_PARALLEL_ITEMS,
            workers: DEFAULT_WORKERS,
            futures_poll_interval: DEFAULT_FUTURES_POLL_INTERVAL,
            copy_on_fork: false,
        }
    }
}

impl ExtractConfig {
    /// The poll interval as a [`Duration`].
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs_f64(self.futures_poll_interval)
    }

    /// Validates ranges; called after every load and before iteration starts.
    pub fn validate(&self) -> Result<(), ExtractError> {
        if self.max_parallel_items == 0 {
            return Err(ExtractError::InvalidConfiguration(
                "max_parallel_items must be at least 1".to_string(),
            ));
        }
        if self.workers == 0 {
            return Err(ExtractError::InvalidConfiguration(
                "workers must be at least 1".to_string(),
            ));
        }
        if !self.futures_poll_interval.is_finite() || self.futures_poll_interval < 0.0 {
            return Err(ExtractError::InvalidConfiguration(
                "futures_poll_interval must be a non-negative number of seconds".to_string(),
            ));
        }
        Ok(())
    }

    /// Loads the `extract` section from an optional TOML file and the
    /// environment, falling back to defaults for everything unset.
    ///
    /// Environment variables use the `EXTRACT__` prefix with `__` as the
    /// section separator, e.g. `EXTRACT__EXTRACT__WORKERS=8`.
    pub fn load(path: Option<&Path>) -> Result<Self, ExtractError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path).required(false));
        }
        builder = builder.add_source(
            config::Environment::with_prefix("EXTRACT")
                .separator("__")
                .try_parsing(true),
        );
        let loaded = builder
            .build()
            .map_err(|e| ExtractError::InvalidConfiguration(e.to_string()))?;

        let section: ExtractConfig = match loaded.get(sections::EXTRACT) {
            Ok(section) => section,
            Err(config::ConfigError::NotFound(_)) => ExtractConfig::default(),
            Err(e) => return Err(ExtractError::InvalidConfiguration(e.to_string())),
        };
        section.validate()?;
        debug!(?section, "loaded extract configuration");
        Ok(section)
    }
}
