// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Offload Task Pool
//!
//! The dispatcher's two offload lanes behind one lazily created runtime:
//!
//! - **Async loop**: a single background worker thread runs every awaitable a
//!   transform returns.
//! - **Thread pool**: a bounded blocking pool of `workers` threads runs every
//!   deferred callable.
//!
//! The driver never blocks on offloaded work. Each task reports through a
//! oneshot channel; the driver polls handles between its other duties and
//! pops results as they appear. Cancelling a handle before the task starts
//! prevents it from running at all; a task that already started runs to
//! completion and its result is discarded.
//!
//! Shutdown drops the runtime, which stops the async loop, joins its thread,
//! and waits for blocking tasks that are still executing.

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};

use futures::FutureExt;
use tokio::runtime::Runtime;
use tokio::sync::oneshot::{self, error::TryRecvError};
use tokio::task::JoinHandle;
use tracing::debug;

use extract_pipeline_domain::value_objects::{DeferredFn, ItemFuture, OffloadOutput};
use extract_pipeline_domain::ExtractError;

/// Result of polling an offload handle.
pub enum OffloadPoll {
    /// The task has not finished yet.
    Pending,
    /// The task was cancelled before it could deliver a result.
    Cancelled,
    /// The task finished; the result is taken out of the handle.
    Ready(Result<OffloadOutput, ExtractError>),
}

/// An outstanding offloaded computation.
pub struct OffloadHandle {
    join: JoinHandle<()>,
    rx: oneshot::Receiver<Result<OffloadOutput, ExtractError>>,
    cancelled: bool,
}

impl OffloadHandle {
    /// Whether the task has run to completion (successfully or not).
    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Requests cancellation. A task that has not started will never run; a
    /// task that is already executing continues, and its result is dropped.
    pub fn cancel(&mut self) {
        self.cancelled = true;
        self.join.abort();
    }

    /// Takes the task result if it is available.
    pub fn poll_result(&mut self) -> OffloadPoll {
        match self.rx.try_recv() {
            Ok(result) => OffloadPoll::Ready(result),
            Err(TryRecvError::Empty) => OffloadPoll::Pending,
            Err(TryRecvError::Closed) => {
                if self.cancelled {
                    OffloadPoll::Cancelled
                } else {
                    OffloadPoll::Ready(Err(ExtractError::ProcessingFailed(
                        "offloaded task dropped its result channel".to_string(),
                    )))
                }
            }
        }
    }
}

/// Lazily created offload runtime: one async worker plus a bounded blocking
/// pool.
pub struct TaskPool {
    workers: usize,
    runtime: Option<Runtime>,
}

impl TaskPool {
    pub fn new(workers: usize) -> Self {
        TaskPool { workers, runtime: None }
    }

    /// Whether the runtime has been started.
    pub fn is_running(&self) -> bool {
        self.runtime.is_some()
    }

    fn ensure_runtime(&mut self) -> Result<&Runtime, ExtractError> {
        if self.runtime.is_none() {
            debug!(workers = self.workers, "starting offload runtime");
            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(1)
                .max_blocking_threads(self.workers.max(1))
                .thread_name("extract-pipe-worker")
                .enable_all()
                .build()
                .map_err(|e| {
                    ExtractError::InternalError(format!("cannot start offload runtime: {}", e))
                })?;
            self.runtime = Some(runtime);
        }
        Ok(self.runtime.as_ref().expect("offload runtime initialized above"))
    }

    /// Submits an awaitable to the background async loop.
    pub fn spawn_future(&mut self, future: ItemFuture) -> Result<OffloadHandle, ExtractError> {
        let (tx, rx) = oneshot::channel();
        let join = self.ensure_runtime()?.spawn(async move {
            let result = AssertUnwindSafe(future)
                .catch_unwind()
                .await
                .unwrap_or_else(|payload| {
                    Err(ExtractError::ProcessingFailed(panic_message(payload)))
                });
            let _ = tx.send(result);
        });
        Ok(OffloadHandle { join, rx, cancelled: false })
    }

    /// Submits a deferred callable to the blocking pool.
    pub fn spawn_blocking(&mut self, task: DeferredFn) -> Result<OffloadHandle, ExtractError> {
        let (tx, rx) = oneshot::channel();
        let join = self.ensure_runtime()?.spawn_blocking(move || {
            let result = catch_unwind(AssertUnwindSafe(task)).unwrap_or_else(|payload| {
                Err(ExtractError::ProcessingFailed(panic_message(payload)))
            });
            let _ = tx.send(result);
        });
        Ok(OffloadHandle { join, rx, cancelled: false })
    }

    /// Stops the async loop, joins its thread, and waits for blocking tasks
    /// that already started.
    pub fn shutdown(&mut self) {
        if let Some(runtime) = self.runtime.take() {
            debug!("shutting down offload runtime");
            drop(runtime);
        }
    }
}

impl Drop for TaskPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        format!("offloaded task panicked: {}", msg)
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        format!("offloaded task panicked: {}", msg)
    } else {
        "offloaded task panicked".to_string()
    }
}
