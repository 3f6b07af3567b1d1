// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Iterator
//!
//! The dispatcher driving a fan-out graph of pipes: an external pull iterator
//! that owns the live source iterators and the in-flight offloaded work, and
//! resolves one item at a time through the remaining steps of its pipe.
//!
//! ## Scheduling model
//!
//! A single driver thread plus two offload lanes (see
//! [`TaskPool`](super::task_pool::TaskPool)). The driver never blocks on user
//! code: transforms run to completion on the driver thread, returned
//! awaitables go to the background async loop, returned callables go to the
//! thread pool, and the driver sleeps for `futures_poll_interval` when it has
//! nothing else to do.
//!
//! ## Ordering guarantees
//!
//! - Items within one source iterator keep the source's native order.
//! - Sources are selected LIFO: a just-spawned nested iterator drains before
//!   its parent source continues, which keeps each branch effectively FIFO.
//! - Futures rejoin the stream in completion order, scanned in submission
//!   order.
//! - No global total order exists across branches or offloaded work.
//!
//! ## Parallelism cap
//!
//! At most `max_parallel_items` offloaded computations are in flight. When
//! the cap is hit, the driver retries the same item after a poll-interval
//! sleep; items are never discarded.

use std::thread;
use std::time::Duration;

use tracing::{debug, trace};

use extract_pipeline_domain::entities::{clone_pipes, Pipe, PipeStep};
use extract_pipeline_domain::value_objects::{
    DataItem, ItemMeta, OffloadOutput, PipeItem, ResolvableItem, SourceEntry, SourceIter,
    StepPayload,
};
use extract_pipeline_domain::ExtractError;

use crate::infrastructure::config::ExtractConfig;
use crate::infrastructure::runtime::task_pool::{OffloadHandle, OffloadPoll, TaskPool};

/// A live source iterator currently feeding the dispatcher.
struct SourcePipeItem {
    iter: SourceIter,
    next_step: usize,
    pipe: Pipe,
    meta: Option<ItemMeta>,
}

/// An outstanding offloaded computation with its routing.
struct FuturePipeItem {
    task: OffloadHandle,
    next_step: usize,
    pipe: Pipe,
    meta: Option<ItemMeta>,
}

/// Outcome of driving a resolved value one step further.
enum Advanced {
    /// The value cleared every step of its pipe and is yielded externally.
    Yield(PipeItem),
    /// The value moved into the next step (or was dropped by it).
    Next(Option<ResolvableItem>),
}

/// The dispatcher. Yields `Result<PipeItem, ExtractError>` records; any error
/// terminates the iteration from the caller's point of view.
pub struct PipeIterator {
    max_parallel_items: usize,
    poll_interval: Duration,
    sources: Vec<SourcePipeItem>,
    futures: Vec<FuturePipeItem>,
    pool: TaskPool,
    /// Every pipe of the running graph; severed on close to break fork-edge
    /// reference cycles.
    graph: Vec<Pipe>,
    closed: bool,
}

impl std::fmt::Debug for PipeIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PipeIterator")
            .field("max_parallel_items", &self.max_parallel_items)
            .field("poll_interval", &self.poll_interval)
            .field("sources", &self.sources.len())
            .field("futures", &self.futures.len())
            .field("graph", &self.graph.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl PipeIterator {
    fn with_config(config: &ExtractConfig) -> Self {
        PipeIterator {
            max_parallel_items: config.max_parallel_items,
            poll_interval: config.poll_interval(),
            sources: Vec::new(),
            futures: Vec::new(),
            pool: TaskPool::new(config.workers),
            graph: Vec::new(),
            closed: false,
        }
    }

    /// Builds a dispatcher over a single pipe. A transformer pipe is
    /// flattened with its ancestry first; the pipe is cloned so the caller's
    /// pipe can be iterated again later.
    pub fn from_pipe(pipe: &Pipe, config: &ExtractConfig) -> Result<Self, ExtractError> {
        config.validate()?;
        let flat = if pipe.has_parent() { pipe.full_pipe()? } else { pipe.clone() };
        let work = flat.clone_pipe(true);

        let mut iterator = Self::with_config(config);
        iterator.register_source(&work)?;
        debug!(pipe = %work.name(), "pipe iterator created from single pipe");
        Ok(iterator)
    }

    /// Builds a dispatcher over a set of pipes, assembling the fan-out graph.
    ///
    /// All pipes are cloned first. Walking each input pipe's parent chain in
    /// reverse input order, every parent is forked into its child; when
    /// `yield_parents` is set and the parent is itself one of the inputs, the
    /// parent additionally forks to itself at its tail so its own items are
    /// yielded too. Each parentless root is evaluated and registered as a
    /// source exactly once.
    pub fn from_pipes(
        pipes: &[Pipe],
        yield_parents: bool,
        config: &ExtractConfig,
    ) -> Result<Self, ExtractError> {
        config.validate()?;
        let clones = clone_pipes(pipes);
        let mut iterator = Self::with_config(config);
        for pipe in clones.iter().rev() {
            iterator.fork_pipeline(pipe.clone(), &clones, yield_parents, config.copy_on_fork)?;
        }
        debug!(
            pipes = pipes.len(),
            sources = iterator.sources.len(),
            yield_parents,
            "pipe iterator created from pipe set"
        );
        Ok(iterator)
    }

    fn fork_pipeline(
        &mut self,
        pipe: Pipe,
        inputs: &[Pipe],
        yield_parents: bool,
        copy_on_fork: bool,
    ) -> Result<(), ExtractError> {
        match pipe.parent() {
            Some(parent) => {
                // validate the transformer head before wiring it up
                pipe.evaluate_gen()?;
                // routed items always enter at the child's first step so
                // steps inserted before the head still run
                parent.fork(&pipe, 0, copy_on_fork)?;
                // make the parent yield its own items at the tail
                if yield_parents && inputs.iter().any(|p| p.ptr_eq(&parent)) {
                    let tail_entry = parent.len();
                    parent.fork(&parent, tail_entry, copy_on_fork)?;
                }
                self.track_graph(&pipe);
                self.fork_pipeline(parent, inputs, yield_parents, copy_on_fork)
            }
            None => self.register_source(&pipe),
        }
    }

    /// Evaluates a parentless pipe and installs its head iterator as a
    /// source. A pipe already registered is skipped.
    fn register_source(&mut self, pipe: &Pipe) -> Result<(), ExtractError> {
        if self.sources.iter().any(|s| s.pipe.ptr_eq(pipe)) {
            return Ok(());
        }
        pipe.evaluate_gen()?;
        let iter = pipe.take_source_iter()?;
        let next_step = pipe.gen_index() + 1;
        self.sources.push(SourcePipeItem { iter, next_step, pipe: pipe.clone(), meta: None });
        self.track_graph(pipe);
        Ok(())
    }

    fn track_graph(&mut self, pipe: &Pipe) {
        if !self.graph.iter().any(|p| p.ptr_eq(pipe)) {
            self.graph.push(pipe.clone());
        }
    }

    /// Number of offloaded computations submitted and not yet drained.
    pub fn outstanding_futures(&self) -> usize {
        self.futures.len()
    }

    /// Number of offloaded computations still executing.
    pub fn in_flight_futures(&self) -> usize {
        self.futures.iter().filter(|f| !f.task.is_finished()).count()
    }

    /// Number of live source iterators.
    pub fn live_sources(&self) -> usize {
        self.sources.len()
    }

    /// Whether a new offload can be submitted: either the cap is not reached
    /// or at least one submitted task has already finished.
    fn has_free_slot(&self) -> bool {
        self.futures.len() < self.max_parallel_items
            || self.futures.iter().any(|f| f.task.is_finished())
    }

    /// Pops the earliest finished future, skipping cancelled ones. A failed
    /// future surfaces its error on the driver.
    fn resolve_futures(&mut self) -> Result<Option<ResolvableItem>, ExtractError> {
        loop {
            let Some(idx) = self.futures.iter().position(|f| f.task.is_finished()) else {
                return Ok(None);
            };
            let mut done = self.futures.remove(idx);
            match done.task.poll_result() {
                OffloadPoll::Cancelled => {
                    trace!(pipe = %done.pipe.name(), "skipping cancelled future");
                    continue;
                }
                OffloadPoll::Pending => {
                    // completion raced with the finished scan; try again later
                    self.futures.insert(idx, done);
                    return Ok(None);
                }
                OffloadPoll::Ready(Err(err)) => return Err(err),
                OffloadPoll::Ready(Ok(output)) => {
                    let (payload, meta) = match output {
                        OffloadOutput::Data(value) => (StepPayload::Data(value), done.meta),
                        OffloadOutput::WithMeta(value, meta) => (StepPayload::Data(value), meta),
                        OffloadOutput::Many(values) => (StepPayload::items(values), done.meta),
                    };
                    return Ok(Some(ResolvableItem {
                        item: payload,
                        next_step: done.next_step,
                        pipe: done.pipe,
                        meta,
                    }));
                }
            }
        }
    }

    /// Pulls the next entry from the newest source, dropping exhausted
    /// sources along the way.
    fn next_source_item(&mut self) -> Option<ResolvableItem> {
        loop {
            let source = self.sources.last_mut()?;
            match source.iter.next() {
                Some(SourceEntry::Routed(item)) => return Some(item),
                Some(SourceEntry::Payload(payload)) => {
                    return Some(ResolvableItem {
                        item: payload,
                        next_step: source.next_step,
                        pipe: source.pipe.clone(),
                        meta: source.meta.clone(),
                    })
                }
                None => {
                    self.sources.pop();
                }
            }
        }
    }

    /// The main loop: obtains one in-flight item (futures first, then the
    /// newest source), then resolves it by kind until something can be
    /// yielded or the graph runs dry.
    fn next_item(&mut self) -> Result<Option<PipeItem>, ExtractError> {
        let mut pipe_item: Option<ResolvableItem> = None;
        loop {
            if pipe_item.is_none() {
                if !self.futures.is_empty() {
                    pipe_item = self.resolve_futures()?;
                }
                if pipe_item.is_none() {
                    pipe_item = self.next_source_item();
                }
                if pipe_item.is_none() {
                    if self.futures.is_empty() && self.sources.is_empty() {
                        return Ok(None);
                    }
                    thread::sleep(self.poll_interval);
                    continue;
                }
            }

            let Some(current) = pipe_item.take() else {
                continue;
            };

            match current.item {
                // a nested iterator becomes the newest source and drains
                // before anything older
                StepPayload::Items(iter) => {
                    self.sources.push(SourcePipeItem {
                        iter,
                        next_step: current.next_step,
                        pipe: current.pipe,
                        meta: current.meta,
                    });
                }

                StepPayload::Future(future) => {
                    if self.has_free_slot() {
                        let task = self.pool.spawn_future(future)?;
                        self.futures.push(FuturePipeItem {
                            task,
                            next_step: current.next_step,
                            pipe: current.pipe,
                            meta: current.meta,
                        });
                    } else {
                        thread::sleep(self.poll_interval);
                        pipe_item = Some(ResolvableItem {
                            item: StepPayload::Future(future),
                            next_step: current.next_step,
                            pipe: current.pipe,
                            meta: current.meta,
                        });
                    }
                }

                StepPayload::Deferred(task) => {
                    if self.has_free_slot() {
                        let task = self.pool.spawn_blocking(task)?;
                        self.futures.push(FuturePipeItem {
                            task,
                            next_step: current.next_step,
                            pipe: current.pipe,
                            meta: current.meta,
                        });
                    } else {
                        thread::sleep(self.poll_interval);
                        pipe_item = Some(ResolvableItem {
                            item: StepPayload::Deferred(task),
                            next_step: current.next_step,
                            pipe: current.pipe,
                            meta: current.meta,
                        });
                    }
                }

                StepPayload::Data(value) => {
                    match self.advance(value, current.meta, current.next_step, current.pipe)? {
                        Advanced::Yield(item) => return Ok(Some(item)),
                        Advanced::Next(next) => pipe_item = next,
                    }
                }

                StepPayload::WithMeta(value, meta) => {
                    match self.advance(value, meta, current.next_step, current.pipe)? {
                        Advanced::Yield(item) => return Ok(Some(item)),
                        Advanced::Next(next) => pipe_item = next,
                    }
                }
            }
        }
    }

    /// Resolves a plain value at `next_step` of `pipe`: yields it unchanged
    /// when it already cleared every step, otherwise invokes the next step
    /// and returns the produced in-flight item (or `None` when the item was
    /// dropped).
    fn advance(
        &mut self,
        value: DataItem,
        meta: Option<ItemMeta>,
        next_step: usize,
        pipe: Pipe,
    ) -> Result<Advanced, ExtractError> {
        let len = pipe.len();
        if next_step > len {
            return Err(ExtractError::PipeItemProcessing(
                pipe.name(),
                next_step,
                format!("item routed past the end of a pipe with {} steps", len),
            ));
        }
        if next_step == len {
            // cleared every step: a fully resolved item is yielded externally
            let step = len.saturating_sub(1);
            return Ok(Advanced::Yield(PipeItem { item: value, step, pipe, meta }));
        }

        let Some(step_cell) = pipe.step(next_step) else {
            return Err(ExtractError::PipeItemProcessing(
                pipe.name(),
                next_step,
                "step index disappeared while the item was in flight".to_string(),
            ));
        };

        let produced = {
            let mut step = step_cell.borrow_mut();
            match &mut *step {
                PipeStep::Transform(transform) => transform.call(value, meta.clone())?,
                PipeStep::Fork(fork) => {
                    let routed = fork.fork_item(value, meta.clone());
                    trace!(pipe = %pipe.name(), edges = routed.len(), "fork emitted routed items");
                    Some(StepPayload::Items(Box::new(
                        routed.into_iter().map(SourceEntry::Routed),
                    )))
                }
                PipeStep::Source(source) => {
                    return Err(ExtractError::InvalidStepFunctionArguments(
                        pipe.name(),
                        next_step,
                        format!(
                            "a {} step cannot be invoked with an item",
                            source.kind()
                        ),
                    ))
                }
            }
        };

        // `None` means the transform consumed or filtered out the item
        Ok(Advanced::Next(produced.map(|payload| ResolvableItem {
            item: payload,
            next_step: next_step + 1,
            pipe,
            meta,
        })))
    }

    /// Cancels pending work, releases every live source, stops the offload
    /// runtime, and severs the cloned graph.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        for future in &mut self.futures {
            future.task.cancel();
        }
        self.futures.clear();
        // dropping the iterators releases any suspended producer state
        self.sources.clear();
        self.pool.shutdown();
        for pipe in self.graph.drain(..) {
            pipe.sever();
        }
        debug!("pipe iterator closed");
    }
}

impl Iterator for PipeIterator {
    type Item = Result<PipeItem, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.closed {
            return None;
        }
        match self.next_item() {
            Ok(Some(item)) => Some(Ok(item)),
            Ok(None) => None,
            Err(err) => Some(Err(err)),
        }
    }
}

impl Drop for PipeIterator {
    fn drop(&mut self) {
        self.close();
    }
}
