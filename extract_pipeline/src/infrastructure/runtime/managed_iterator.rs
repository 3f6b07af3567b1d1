// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Managed Pipe Iterator
//!
//! Wraps the dispatcher with one optional scoped collaborator resource (for
//! example a transactional load context supplied by the caller). Exhaustion
//! releases the resource normally; any failure releases it with the failure
//! information, closes the dispatcher, and re-yields the error.

use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use extract_pipeline_domain::value_objects::PipeItem;
use extract_pipeline_domain::ExtractError;

use crate::infrastructure::runtime::pipe_iterator::PipeIterator;

/// A scoped resource tied to one extraction run.
pub trait ExtractionScope {
    /// Called once when the scope is attached to an iteration.
    fn enter(&mut self);

    /// Called exactly once when the iteration ends: with `None` on normal
    /// exhaustion, with the failure otherwise.
    fn exit(&mut self, failure: Option<&ExtractError>);
}

#[derive(Debug, Default)]
struct ScopeState {
    entered: bool,
    released: bool,
    failure: Option<String>,
}

/// A shareable extraction scope that records the outcome of one run.
///
/// The handle can be cloned before it is attached, so the caller keeps a view
/// of the outcome after the iterator consumed its copy.
#[derive(Clone)]
pub struct LoadScope {
    load_id: String,
    state: Arc<Mutex<ScopeState>>,
}

impl LoadScope {
    pub fn new(load_id: impl Into<String>) -> Self {
        LoadScope { load_id: load_id.into(), state: Arc::new(Mutex::new(ScopeState::default())) }
    }

    pub fn load_id(&self) -> &str {
        &self.load_id
    }

    pub fn is_entered(&self) -> bool {
        self.state.lock().map(|s| s.entered).unwrap_or(false)
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().map(|s| s.released).unwrap_or(false)
    }

    /// The failure message captured on release, if the run failed.
    pub fn failure(&self) -> Option<String> {
        self.state.lock().ok().and_then(|s| s.failure.clone())
    }
}

impl ExtractionScope for LoadScope {
    fn enter(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.entered = true;
        }
        debug!(load_id = %self.load_id, "extraction scope entered");
    }

    fn exit(&mut self, failure: Option<&ExtractError>) {
        if let Ok(mut state) = self.state.lock() {
            state.released = true;
            state.failure = failure.map(|e| e.to_string());
        }
        match failure {
            Some(err) => warn!(load_id = %self.load_id, error = %err, "extraction scope released after failure"),
            None => debug!(load_id = %self.load_id, "extraction scope released"),
        }
    }
}

/// A dispatcher that releases its scoped resource when iteration ends.
pub struct ManagedPipeIterator {
    inner: PipeIterator,
    scope: Option<Box<dyn ExtractionScope>>,
}

impl ManagedPipeIterator {
    pub fn new(inner: PipeIterator) -> Self {
        ManagedPipeIterator { inner, scope: None }
    }

    /// Attaches and enters the scoped resource that will be released when the
    /// iteration ends.
    pub fn set_scope(&mut self, mut scope: Box<dyn ExtractionScope>) {
        scope.enter();
        self.scope = Some(scope);
    }

    /// Closes the underlying dispatcher, releasing the scope first if it is
    /// still attached.
    pub fn close(&mut self) {
        if let Some(mut scope) = self.scope.take() {
            scope.exit(None);
        }
        self.inner.close();
    }

    /// Gauge into the underlying dispatcher, for observability.
    pub fn in_flight_futures(&self) -> usize {
        self.inner.in_flight_futures()
    }
}

impl Iterator for ManagedPipeIterator {
    type Item = Result<PipeItem, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.inner.next() {
            Some(Ok(item)) => Some(Ok(item)),
            Some(Err(err)) => {
                if let Some(mut scope) = self.scope.take() {
                    scope.exit(Some(&err));
                }
                self.inner.close();
                Some(Err(err))
            }
            None => {
                if let Some(mut scope) = self.scope.take() {
                    scope.exit(None);
                }
                None
            }
        }
    }
}
