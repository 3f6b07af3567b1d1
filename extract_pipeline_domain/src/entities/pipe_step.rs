// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Steps
//!
//! A pipe is an ordered list of steps. This module defines the step tagged
//! union and the adapter constructors that turn user callables into the
//! canonical internal shapes.
//!
//! ## Step variants
//!
//! - [`SourceStep`]: produces items; valid only as the head of a parentless
//!   pipe. Sequences are re-iterable, raw iterators are single-use, producer
//!   factories are invoked lazily at evaluation time, and unbound producers
//!   refuse evaluation until their parameters are supplied.
//! - [`TransformStep`]: consumes one `(item, meta)` pair and returns the
//!   next payload, `None` to drop the item, or an error.
//! - [`ForkStep`]: routes each incoming item to one or more child pipes at a
//!   chosen entry step.
//!
//! ## Signature adaptation
//!
//! Every transform is stored internally as a two-parameter closure
//! `(item, meta)`. The constructors below ([`PipeStep::map`],
//! [`PipeStep::filter_map`], [`PipeStep::flat_map`], [`PipeStep::async_map`],
//! [`PipeStep::blocking_map`]) wrap simpler user callables into that form at
//! admission time, so no signature inspection happens while items flow.

use std::sync::Arc;

use futures::FutureExt;

use crate::entities::pipe::Pipe;
use crate::value_objects::{
    DataItem, ItemMeta, OffloadOutput, PipeId, ResolvableItem, SourceEntry, SourceIter,
    StepPayload,
};
use crate::ExtractError;

/// Result of invoking a transform step. `Ok(None)` drops the item.
pub type TransformResult = Result<Option<StepPayload>, ExtractError>;

/// The canonical two-parameter transform closure.
pub type TransformFn = Box<dyn FnMut(DataItem, Option<ItemMeta>) -> TransformResult>;

/// A zero-argument producer factory, invoked at evaluation time to obtain a
/// fresh single-use iterator.
pub type ProducerFn = Box<dyn FnMut() -> Result<SourceIter, ExtractError>>;

/// The data-generating head of a parentless pipe.
pub enum SourceStep {
    /// A re-iterable seed sequence; evaluation takes a fresh iterator over a
    /// copy so the pipe can be iterated multiple times.
    Items(Vec<DataItem>),
    /// A raw single-use iterator. Consumed by the first evaluation.
    Iter(Option<SourceIter>),
    /// A producer callable resolved to an iterator at evaluation time.
    Factory(ProducerFn),
    /// A parametrized producer whose arguments were never bound; evaluation
    /// fails with `ParametrizedResourceUnbound`.
    Unbound { params: Vec<String> },
    /// Installed by `evaluate_gen`; drained once by the dispatcher.
    Evaluated(Option<SourceIter>),
}

impl SourceStep {
    /// Short description of the source kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            SourceStep::Items(_) => "items",
            SourceStep::Iter(_) => "iterator",
            SourceStep::Factory(_) => "producer",
            SourceStep::Unbound { .. } => "unbound producer",
            SourceStep::Evaluated(_) => "evaluated",
        }
    }
}

/// A transform step holding the canonical two-parameter closure.
pub struct TransformStep {
    func: TransformFn,
}

impl TransformStep {
    pub fn new(func: TransformFn) -> Self {
        TransformStep { func }
    }

    /// Invokes the transform with the current item and meta.
    pub fn call(&mut self, item: DataItem, meta: Option<ItemMeta>) -> TransformResult {
        (self.func)(item, meta)
    }
}

/// One fork edge: a child pipe and the entry step items are routed to.
///
/// The child's id is captured when the edge is added so membership checks
/// never have to borrow the child pipe (which may be the forking pipe
/// itself).
pub struct ForkEdge {
    pipe: Pipe,
    pipe_id: PipeId,
    entry_step: usize,
}

/// A transform that routes each incoming item to one or more child pipes.
///
/// The first edge receives the incoming value itself; later edges receive
/// copies. Edges are deduplicated by child pipe identity, which survives the
/// pre-iteration clone pass.
pub struct ForkStep {
    edges: Vec<ForkEdge>,
    copy_on_fork: bool,
}

impl ForkStep {
    pub(crate) fn new(pipe: Pipe, pipe_id: PipeId, entry_step: usize, copy_on_fork: bool) -> Self {
        ForkStep { edges: vec![ForkEdge { pipe, pipe_id, entry_step }], copy_on_fork }
    }

    pub(crate) fn add_edge(&mut self, pipe: Pipe, pipe_id: PipeId, entry_step: usize) {
        if !self.has_edge(pipe_id) {
            self.edges.push(ForkEdge { pipe, pipe_id, entry_step });
        }
    }

    /// Whether an edge to the pipe with the given id already exists.
    pub fn has_edge(&self, pipe_id: PipeId) -> bool {
        self.edges.iter().any(|e| e.pipe_id == pipe_id)
    }

    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    pub fn copy_on_fork(&self) -> bool {
        self.copy_on_fork
    }

    /// Emits one routed item per edge.
    ///
    /// The first edge receives the original value; every other edge receives
    /// a copy (ownership demands a copy whether or not `copy_on_fork` asks
    /// for one). Each routed item targets `(edge.pipe, edge.entry_step)` and
    /// carries the incoming meta unchanged.
    pub fn fork_item(&self, item: DataItem, meta: Option<ItemMeta>) -> Vec<ResolvableItem> {
        let mut values = Vec::with_capacity(self.edges.len());
        for _ in 1..self.edges.len() {
            values.push(item.clone());
        }
        values.insert(0, item);

        self.edges
            .iter()
            .zip(values)
            .map(|(edge, value)| ResolvableItem {
                item: StepPayload::Data(value),
                next_step: edge.entry_step,
                pipe: edge.pipe.clone(),
                meta: meta.clone(),
            })
            .collect()
    }
}

/// One step of a pipe.
pub enum PipeStep {
    /// A data-generating step; valid only as the head of a parentless pipe.
    Source(SourceStep),
    /// A transform of the canonical `(item, meta)` shape.
    Transform(TransformStep),
    /// A fork routing items into child pipes.
    Fork(ForkStep),
}

impl PipeStep {
    /// A re-iterable seed sequence.
    pub fn items<I>(values: I) -> Self
    where
        I: IntoIterator<Item = DataItem>,
    {
        PipeStep::Source(SourceStep::Items(values.into_iter().collect()))
    }

    /// A raw single-use iterator of items.
    pub fn iter<I>(iter: I) -> Self
    where
        I: Iterator<Item = DataItem> + 'static,
    {
        PipeStep::Source(SourceStep::Iter(Some(Box::new(
            iter.map(|v| SourceEntry::Payload(StepPayload::Data(v))),
        ))))
    }

    /// A zero-argument producer returning a fresh iterator per evaluation.
    pub fn producer<F, I>(mut factory: F) -> Self
    where
        F: FnMut() -> I + 'static,
        I: Iterator<Item = DataItem> + 'static,
    {
        PipeStep::Source(SourceStep::Factory(Box::new(move || {
            let iter = factory();
            Ok(Box::new(iter.map(|v| SourceEntry::Payload(StepPayload::Data(v)))) as SourceIter)
        })))
    }

    /// A producer that may fail when invoked.
    pub fn try_producer<F>(factory: F) -> Self
    where
        F: FnMut() -> Result<SourceIter, ExtractError> + 'static,
    {
        PipeStep::Source(SourceStep::Factory(Box::new(factory)))
    }

    /// A parametrized producer whose arguments have not been bound.
    pub fn unbound<I, S>(params: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        PipeStep::Source(SourceStep::Unbound {
            params: params.into_iter().map(Into::into).collect(),
        })
    }

    /// The canonical transform: full access to the item and its meta.
    pub fn transform<F>(func: F) -> Self
    where
        F: FnMut(DataItem, Option<ItemMeta>) -> TransformResult + 'static,
    {
        PipeStep::Transform(TransformStep::new(Box::new(func)))
    }

    /// Adapts a one-argument mapping into the canonical form; the meta
    /// parameter is accepted and discarded.
    pub fn map<F>(mut func: F) -> Self
    where
        F: FnMut(DataItem) -> DataItem + 'static,
    {
        Self::transform(move |item, _meta| Ok(Some(StepPayload::Data(func(item)))))
    }

    /// Adapts a one-argument filtering map; returning `None` drops the item.
    pub fn filter_map<F>(mut func: F) -> Self
    where
        F: FnMut(DataItem) -> Option<DataItem> + 'static,
    {
        Self::transform(move |item, _meta| Ok(func(item).map(StepPayload::Data)))
    }

    /// Adapts a one-argument expansion; the returned items are drained as a
    /// nested source before older sources continue.
    pub fn flat_map<F, I>(mut func: F) -> Self
    where
        F: FnMut(DataItem) -> I + 'static,
        I: IntoIterator<Item = DataItem>,
        I::IntoIter: 'static,
    {
        Self::transform(move |item, _meta| Ok(Some(StepPayload::items(func(item)))))
    }

    /// Adapts an async mapping; each returned future is offloaded to the
    /// background async loop and rejoins the stream on completion.
    pub fn async_map<F, Fut>(mut func: F) -> Self
    where
        F: FnMut(DataItem) -> Fut + 'static,
        Fut: std::future::Future<Output = Result<DataItem, ExtractError>> + Send + 'static,
    {
        Self::transform(move |item, _meta| {
            let fut = func(item);
            Ok(Some(StepPayload::Future(
                fut.map(|r| r.map(OffloadOutput::Data)).boxed(),
            )))
        })
    }

    /// Adapts a blocking mapping; each item becomes a deferred callable run
    /// on the thread pool.
    pub fn blocking_map<F>(func: F) -> Self
    where
        F: Fn(DataItem) -> Result<DataItem, ExtractError> + Send + Sync + 'static,
    {
        let func = Arc::new(func);
        Self::transform(move |item, _meta| {
            let func = Arc::clone(&func);
            Ok(Some(StepPayload::Deferred(Box::new(move || {
                func(item).map(OffloadOutput::Data)
            }))))
        })
    }

    /// Whether this step can generate data at the head of a parentless pipe.
    pub fn is_source(&self) -> bool {
        matches!(self, PipeStep::Source(_))
    }

    pub fn is_fork(&self) -> bool {
        matches!(self, PipeStep::Fork(_))
    }

    /// Short description of the step kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            PipeStep::Source(s) => s.kind(),
            PipeStep::Transform(_) => "transform",
            PipeStep::Fork(_) => "fork",
        }
    }
}
