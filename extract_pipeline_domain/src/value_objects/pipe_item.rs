// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # In-Flight Item Types
//!
//! This module defines every shape a data item can take between the moment a
//! source produces it and the moment the driving iterator yields it.
//!
//! ## Overview
//!
//! Items travel through the graph as tagged values rather than runtime type
//! checks:
//!
//! - [`StepPayload`]: the value itself, possibly not yet materialized: plain
//!   data, data with replacement meta, a nested iterator, an awaitable, or a
//!   deferred callable
//! - [`SourceEntry`]: what a live source iterator hands to the dispatcher:
//!   a payload routed at the source's own position, or a fully routed item
//!   emitted by a fork
//! - [`ResolvableItem`]: a payload plus explicit routing `(next_step, pipe,
//!   meta)`
//! - [`OffloadOutput`]: the resolved result of offloaded work
//! - [`PipeItem`]: the final, fully resolved record yielded externally
//!
//! ## Step addressing
//!
//! In-flight items carry the index of the **next** step they must pass.
//! `pipe.len()` therefore means "deliver at the tail": the item has cleared
//! every step and is yielded as soon as the dispatcher picks it up.
//!
//! ## Meta
//!
//! Meta is an opaque sidecar carried unchanged next to each item. A step that
//! returns [`StepPayload::WithMeta`] (or offloaded work resolving to
//! [`OffloadOutput::WithMeta`]) replaces the meta seen by every downstream
//! step of that item.

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::entities::pipe::Pipe;
use crate::ExtractError;

/// A single data item flowing through the graph.
pub type DataItem = serde_json::Value;

/// Opaque per-item sidecar, cheap to clone along fan-out paths.
pub type ItemMeta = Arc<serde_json::Value>;

/// A live source iterator feeding the dispatcher.
pub type SourceIter = Box<dyn Iterator<Item = SourceEntry>>;

/// An awaitable producing a resolved item, run on the background async loop.
pub type ItemFuture = BoxFuture<'static, Result<OffloadOutput, ExtractError>>;

/// A deferred callable producing a resolved item, run on the thread pool.
pub type DeferredFn = Box<dyn FnOnce() -> Result<OffloadOutput, ExtractError> + Send>;

/// Builds a meta sidecar from any JSON-serializable value.
pub fn meta_from(value: serde_json::Value) -> ItemMeta {
    Arc::new(value)
}

/// The value of an item in transit, possibly not yet materialized.
pub enum StepPayload {
    /// A plain, fully resolved data item.
    Data(DataItem),
    /// A resolved data item together with replacement meta for downstream
    /// steps.
    WithMeta(DataItem, Option<ItemMeta>),
    /// A nested iterator; the dispatcher installs it as a new source at the
    /// item's position and drains it before returning to older sources.
    Items(SourceIter),
    /// An awaitable; offloaded to the background async loop.
    Future(ItemFuture),
    /// A deferred callable; offloaded to the thread pool.
    Deferred(DeferredFn),
}

impl StepPayload {
    /// Wraps a plain value.
    pub fn data(value: DataItem) -> Self {
        StepPayload::Data(value)
    }

    /// Wraps a sequence of values as a nested iterator payload.
    pub fn items<I>(values: I) -> Self
    where
        I: IntoIterator<Item = DataItem>,
        I::IntoIter: 'static,
    {
        StepPayload::Items(Box::new(
            values.into_iter().map(|v| SourceEntry::Payload(StepPayload::Data(v))),
        ))
    }

    /// Short description of the payload kind, for diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            StepPayload::Data(_) => "data",
            StepPayload::WithMeta(..) => "data+meta",
            StepPayload::Items(_) => "iterator",
            StepPayload::Future(_) => "future",
            StepPayload::Deferred(_) => "deferred",
        }
    }
}

impl fmt::Debug for StepPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepPayload::Data(v) => f.debug_tuple("Data").field(v).finish(),
            StepPayload::WithMeta(v, m) => f.debug_tuple("WithMeta").field(v).field(m).finish(),
            other => write!(f, "{}", other.kind()),
        }
    }
}

/// What a live source iterator yields.
pub enum SourceEntry {
    /// A payload processed at the source's own `(next_step, pipe, meta)`.
    Payload(StepPayload),
    /// A fully routed item; forks emit these to redirect execution into
    /// another pipe at a chosen entry step.
    Routed(ResolvableItem),
}

/// An item in transit together with its routing.
pub struct ResolvableItem {
    /// The value, possibly still unresolved.
    pub item: StepPayload,
    /// Index of the next step to run; `pipe.len()` delivers at the tail.
    pub next_step: usize,
    /// The pipe the item currently belongs to.
    pub pipe: Pipe,
    /// Opaque sidecar carried next to the item.
    pub meta: Option<ItemMeta>,
}

impl ResolvableItem {
    /// Creates a routed item carrying a plain value.
    pub fn new(value: DataItem, next_step: usize, pipe: Pipe, meta: Option<ItemMeta>) -> Self {
        ResolvableItem { item: StepPayload::Data(value), next_step, pipe, meta }
    }
}

impl fmt::Debug for ResolvableItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvableItem")
            .field("item", &self.item.kind())
            .field("next_step", &self.next_step)
            .field("pipe", &self.pipe)
            .finish()
    }
}

/// The resolved result of offloaded work.
///
/// Awaitables and deferred callables run away from the driver thread, so
/// their results must be self-contained: data, data with replacement meta, or
/// an expansion into several items. They cannot resolve to further callables
/// or awaitables.
#[derive(Debug, Clone)]
pub enum OffloadOutput {
    /// A single resolved item.
    Data(DataItem),
    /// A resolved item with replacement meta for downstream steps.
    WithMeta(DataItem, Option<ItemMeta>),
    /// An expansion into several items; an empty vector drops the item.
    Many(Vec<DataItem>),
}

/// A fully resolved item yielded by the driving iterator.
#[derive(Clone)]
pub struct PipeItem {
    /// The resolved value.
    pub item: DataItem,
    /// Index of the final step of the owning pipe.
    pub step: usize,
    /// The pipe that produced the value.
    pub pipe: Pipe,
    /// Opaque sidecar carried next to the item.
    pub meta: Option<ItemMeta>,
}

impl PipeItem {
    /// Name of the pipe that produced this item.
    pub fn pipe_name(&self) -> String {
        self.pipe.name()
    }
}

impl fmt::Debug for PipeItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipeItem")
            .field("item", &self.item)
            .field("step", &self.step)
            .field("pipe", &self.pipe)
            .field("meta", &self.meta)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_items_payload_wraps_each_value() {
        let payload = StepPayload::items(vec![json!(1), json!(2)]);
        let StepPayload::Items(iter) = payload else {
            panic!("expected iterator payload");
        };
        let values: Vec<DataItem> = iter
            .map(|entry| match entry {
                SourceEntry::Payload(StepPayload::Data(v)) => v,
                other => panic!("unexpected entry: {:?}", kind_of(&other)),
            })
            .collect();
        assert_eq!(values, vec![json!(1), json!(2)]);
    }

    #[test]
    fn test_payload_kinds() {
        assert_eq!(StepPayload::data(json!(1)).kind(), "data");
        assert_eq!(StepPayload::items(Vec::new()).kind(), "iterator");
    }

    fn kind_of(entry: &SourceEntry) -> &'static str {
        match entry {
            SourceEntry::Payload(p) => p.kind(),
            SourceEntry::Routed(_) => "routed",
        }
    }
}
