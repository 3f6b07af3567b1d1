// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Entity
//!
//! A pipe is an ordered, mutable sequence of steps with an optional parent
//! pipe whose output feeds this pipe's head. Pipes are the nodes of the
//! fan-out graph driven by the dispatcher.
//!
//! ## Overview
//!
//! - A pipe without a parent (a *resource pipe*) generates its own data: its
//!   head step must be a sequence, an iterator, or a producer callable.
//! - A pipe with a parent (a *transformer pipe*) consumes the parent's items:
//!   every step, including the head, must be a transform of the canonical
//!   `(item, meta)` shape.
//! - Admission rules are enforced when steps are appended or inserted, so no
//!   signature checking is needed while items flow.
//!
//! ## Sharing and cloning
//!
//! `Pipe` is a cheap handle (`Rc<RefCell<_>>`): cloning the handle aliases
//! the same pipe, exactly like passing the pipe around by reference.
//! [`Pipe::clone_pipe`] creates a new pipe whose step list is a shallow copy
//! sharing the same step cells, which is what makes pre-iteration cloning
//! cheap while fork-edge accumulation on a shared tail step remains visible
//! to every clone. The pipe's [`PipeId`] survives `clone_pipe` by default so
//! fork edges comparing pipes by identity keep matching.
//!
//! ## Lifecycle
//!
//! A pipe is created empty or from a seed, steps are appended or inserted,
//! and at iteration time the dispatcher clones it and calls
//! [`Pipe::evaluate_gen`]: a producer head is invoked to obtain its iterator,
//! a sequence head is turned into a fresh iterator. The dispatcher then takes
//! ownership of the live iterator and drives it to completion.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use crate::entities::pipe_step::{ForkStep, PipeStep, SourceStep};
use crate::value_objects::{PipeId, SourceEntry, SourceIter, StepPayload};
use crate::ExtractError;

/// A shared step slot. Clones of a pipe share these cells; replacing a slot
/// is clone-local while mutating through the cell is visible to all clones.
pub type StepCell = Rc<RefCell<PipeStep>>;

fn cell(step: PipeStep) -> StepCell {
    Rc::new(RefCell::new(step))
}

struct PipeInner {
    name: String,
    id: PipeId,
    steps: Vec<StepCell>,
    parent: Option<Pipe>,
    gen_idx: usize,
}

/// Handle to a pipe in the fan-out graph.
#[derive(Clone)]
pub struct Pipe {
    inner: Rc<RefCell<PipeInner>>,
}

impl Pipe {
    /// Creates an empty resource pipe.
    pub fn new(name: impl Into<String>) -> Self {
        Pipe::from_inner(PipeInner {
            name: name.into(),
            id: PipeId::new(),
            steps: Vec::new(),
            parent: None,
            gen_idx: 0,
        })
    }

    /// Creates an empty transformer pipe fed by `parent`.
    pub fn with_parent(name: impl Into<String>, parent: &Pipe) -> Self {
        Pipe::from_inner(PipeInner {
            name: name.into(),
            id: PipeId::new(),
            steps: Vec::new(),
            parent: Some(parent.clone()),
            gen_idx: 0,
        })
    }

    /// Creates a resource pipe seeded with a head step.
    pub fn from_data(name: impl Into<String>, head: PipeStep) -> Result<Self, ExtractError> {
        let pipe = Pipe::new(name);
        pipe.append_step(head)?;
        Ok(pipe)
    }

    fn from_inner(inner: PipeInner) -> Self {
        Pipe { inner: Rc::new(RefCell::new(inner)) }
    }

    pub fn name(&self) -> String {
        self.inner.borrow().name.clone()
    }

    pub fn id(&self) -> PipeId {
        self.inner.borrow().id
    }

    pub fn len(&self) -> usize {
        self.inner.borrow().steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.borrow().steps.is_empty()
    }

    pub fn has_parent(&self) -> bool {
        self.inner.borrow().parent.is_some()
    }

    pub fn parent(&self) -> Option<Pipe> {
        self.inner.borrow().parent.clone()
    }

    /// Index of the data-generating step.
    pub fn gen_index(&self) -> usize {
        self.inner.borrow().gen_idx
    }

    /// The step at `index`, if any.
    pub fn step(&self, index: usize) -> Option<StepCell> {
        self.inner.borrow().steps.get(index).cloned()
    }

    /// The data-generating step.
    pub fn gen_step(&self) -> Option<StepCell> {
        let idx = self.gen_index();
        self.step(idx)
    }

    /// The last step.
    pub fn tail(&self) -> Option<StepCell> {
        let len = self.len();
        if len == 0 {
            None
        } else {
            self.step(len - 1)
        }
    }

    /// Whether the two handles alias the same pipe.
    pub fn ptr_eq(&self, other: &Pipe) -> bool {
        Rc::ptr_eq(&self.inner, &other.inner)
    }

    /// Address of the underlying pipe, used as an identity key when cloning
    /// pipe sets.
    pub(crate) fn addr(&self) -> usize {
        Rc::as_ptr(&self.inner) as usize
    }

    /// A pipe is data-bound iff its root ancestor can generate items.
    pub fn is_data_bound(&self) -> bool {
        let inner = self.inner.borrow();
        match &inner.parent {
            Some(parent) => parent.is_data_bound(),
            None => !inner.steps.is_empty(),
        }
    }

    /// Appends a step.
    ///
    /// The first step of a resource pipe may be any data generator or
    /// callable; boundness is checked at evaluation time. Every other
    /// position (and every position of a transformer pipe) only admits
    /// transforms and forks.
    pub fn append_step(&self, step: PipeStep) -> Result<(), ExtractError> {
        let step = if self.is_empty() && !self.has_parent() {
            step
        } else {
            self.check_transform_step(step)?
        };
        self.inner.borrow_mut().steps.push(cell(step));
        Ok(())
    }

    /// Inserts a step at `index`. Prepending before the head is allowed only
    /// for transformer pipes. Inserting at or before the data-generating step
    /// shifts `gen_index` by one.
    pub fn insert_step(&self, step: PipeStep, index: usize) -> Result<(), ExtractError> {
        let step_no = self.len();
        if step_no == 0 {
            return self.append_step(step);
        }
        if index == 0 && !self.has_parent() {
            return Err(ExtractError::CreatePipe(
                self.name(),
                "cannot insert a step before the head of a resource pipe that is not a transformer"
                    .to_string(),
            ));
        }
        if index > step_no {
            return Err(ExtractError::CreatePipe(
                self.name(),
                format!("step index {} is out of range for {} steps", index, step_no),
            ));
        }
        let step = self.check_transform_step(step)?;
        let mut inner = self.inner.borrow_mut();
        inner.steps.insert(index, cell(step));
        if index <= inner.gen_idx {
            inner.gen_idx += 1;
        }
        Ok(())
    }

    /// Removes the step at `index`. The data-generating step cannot be
    /// removed.
    pub fn remove_step(&self, index: usize) -> Result<(), ExtractError> {
        let mut inner = self.inner.borrow_mut();
        if index >= inner.steps.len() {
            return Err(ExtractError::CreatePipe(
                inner.name.clone(),
                format!("step index {} is out of range for {} steps", index, inner.steps.len()),
            ));
        }
        if index == inner.gen_idx {
            return Err(ExtractError::CreatePipe(
                inner.name.clone(),
                format!(
                    "step at index {} holds the data generator for this pipe and cannot be removed",
                    index
                ),
            ));
        }
        inner.steps.remove(index);
        if index < inner.gen_idx {
            inner.gen_idx -= 1;
        }
        Ok(())
    }

    /// Overwrites the data-generating step in place with no validation. The
    /// caller asserts correctness.
    pub fn replace_gen(&self, step: PipeStep) {
        let mut inner = self.inner.borrow_mut();
        assert!(!inner.steps.is_empty(), "cannot replace the generator of an empty pipe");
        let idx = inner.gen_idx;
        inner.steps[idx] = cell(step);
    }

    /// Routes items from this pipe into `child` at `entry_step`.
    ///
    /// `entry_step` is the index of the first child step the routed item
    /// still has to pass: `0` enters at the child's head, `child.len()`
    /// delivers at the child's tail. If the tail of this pipe is not already
    /// a fork, one is appended; otherwise the edge is added unless that child
    /// is already present (deduplicated by pipe identity).
    pub fn fork(&self, child: &Pipe, entry_step: usize, copy_on_fork: bool) -> Result<(), ExtractError> {
        if self.is_empty() {
            return Err(ExtractError::CreatePipe(
                self.name(),
                format!("cannot fork empty pipe into '{}'", child.name()),
            ));
        }
        let child_id = child.id();
        let tail = self
            .tail()
            .ok_or_else(|| ExtractError::InternalError("tail of non-empty pipe".to_string()))?;
        {
            let mut tail_step = tail.borrow_mut();
            if let PipeStep::Fork(fork) = &mut *tail_step {
                fork.add_edge(child.clone(), child_id, entry_step);
                return Ok(());
            }
        }
        let fork = ForkStep::new(child.clone(), child_id, entry_step, copy_on_fork);
        self.inner.borrow_mut().steps.push(cell(PipeStep::Fork(fork)));
        Ok(())
    }

    /// Flattens this pipe's ancestry into a new parentless pipe whose step
    /// list is `parent.full_pipe().steps ++ self.steps`.
    pub fn full_pipe(&self) -> Result<Pipe, ExtractError> {
        if self.has_parent() {
            self.ensure_transform_head()?;
        } else {
            self.ensure_gen_bound()?;
        }

        let mut steps: Vec<StepCell> = match self.parent() {
            Some(parent) => {
                let flat = parent.full_pipe()?;
                let steps = flat.inner.borrow().steps.clone();
                steps
            }
            None => Vec::new(),
        };
        steps.extend(self.inner.borrow().steps.iter().cloned());

        Ok(Pipe::from_inner(PipeInner {
            name: self.name(),
            id: PipeId::new(),
            steps,
            parent: None,
            gen_idx: 0,
        }))
    }

    /// Verifies that the head of this pipe can generate data without
    /// arguments.
    pub fn ensure_gen_bound(&self) -> Result<(), ExtractError> {
        let inner = self.inner.borrow();
        let Some(head) = inner.steps.get(inner.gen_idx) else {
            return Err(ExtractError::PipeNotBoundToData(inner.name.clone(), inner.parent.is_some()));
        };
        let result = match &*head.borrow() {
            PipeStep::Source(SourceStep::Unbound { params }) => {
                Err(ExtractError::ParametrizedResourceUnbound(
                    inner.name.clone(),
                    format!("producer requires arguments: {}", params.join(", ")),
                ))
            }
            PipeStep::Source(_) => Ok(()),
            PipeStep::Transform(_) | PipeStep::Fork(_) => {
                Err(ExtractError::ParametrizedResourceUnbound(
                    inner.name.clone(),
                    "head callable requires an input item; bind the pipe to a parent or replace the head with a producer"
                        .to_string(),
                ))
            }
        };
        result
    }

    fn ensure_transform_head(&self) -> Result<(), ExtractError> {
        let inner = self.inner.borrow();
        let Some(head) = inner.steps.get(inner.gen_idx) else {
            return Err(ExtractError::PipeNotBoundToData(inner.name.clone(), inner.parent.is_some()));
        };
        let result = match &*head.borrow() {
            PipeStep::Transform(_) | PipeStep::Fork(_) => Ok(()),
            PipeStep::Source(_) => Err(ExtractError::InvalidTransformerGeneratorFunction(
                inner.name.clone(),
                "the head of a transformer pipe must be a transform taking (item, meta)".to_string(),
            )),
        };
        result
    }

    /// Lazily evaluates the head before iteration.
    ///
    /// For resource pipes a producer head is invoked (failing with
    /// `ParametrizedResourceUnbound` if it still requires arguments) and a
    /// sequence head is converted to a fresh iterator; the live iterator is
    /// installed in a clone-local slot. For transformer pipes only the head
    /// transform is validated.
    pub fn evaluate_gen(&self) -> Result<(), ExtractError> {
        if !self.is_data_bound() {
            return Err(ExtractError::PipeNotBoundToData(self.name(), self.has_parent()));
        }
        if self.has_parent() {
            return self.ensure_transform_head();
        }

        let gen_idx = self.gen_index();
        let Some(head) = self.step(gen_idx) else {
            return Err(ExtractError::PipeNotBoundToData(self.name(), false));
        };

        let evaluated: SourceIter = {
            let mut step = head.borrow_mut();
            match &mut *step {
                PipeStep::Source(SourceStep::Evaluated(_)) => return Ok(()),
                PipeStep::Source(SourceStep::Items(values)) => {
                    let values = values.clone();
                    Box::new(values.into_iter().map(|v| SourceEntry::Payload(StepPayload::Data(v))))
                }
                PipeStep::Source(SourceStep::Iter(iter)) => match iter.take() {
                    Some(it) => it,
                    None => {
                        return Err(ExtractError::CreatePipe(
                            self.name(),
                            "the head iterator was already consumed by a previous iteration"
                                .to_string(),
                        ))
                    }
                },
                PipeStep::Source(SourceStep::Factory(factory)) => factory()?,
                PipeStep::Source(SourceStep::Unbound { params }) => {
                    return Err(ExtractError::ParametrizedResourceUnbound(
                        self.name(),
                        format!("producer requires arguments: {}", params.join(", ")),
                    ))
                }
                PipeStep::Transform(_) | PipeStep::Fork(_) => {
                    return Err(ExtractError::ParametrizedResourceUnbound(
                        self.name(),
                        "head callable requires an input item and cannot be evaluated without arguments"
                            .to_string(),
                    ))
                }
            }
        };

        self.inner.borrow_mut().steps[gen_idx] =
            cell(PipeStep::Source(SourceStep::Evaluated(Some(evaluated))));
        Ok(())
    }

    /// Moves the evaluated head iterator out of the pipe. Called once by the
    /// dispatcher when the pipe is registered as a source.
    pub fn take_source_iter(&self) -> Result<SourceIter, ExtractError> {
        let inner = self.inner.borrow();
        let Some(head) = inner.steps.get(inner.gen_idx) else {
            return Err(ExtractError::PipeNotBoundToData(inner.name.clone(), inner.parent.is_some()));
        };
        let mut step = head.borrow_mut();
        match &mut *step {
            PipeStep::Source(SourceStep::Evaluated(iter)) => iter.take().ok_or_else(|| {
                ExtractError::InternalError(format!(
                    "source iterator of pipe '{}' was already taken",
                    inner.name
                ))
            }),
            other => Err(ExtractError::InternalError(format!(
                "pipe '{}' head was not evaluated (found {} step)",
                inner.name,
                other.kind()
            ))),
        }
    }

    /// Creates a new pipe with the same name and parent link and a shallow
    /// copy of the step list. The id is preserved by default so fork edges
    /// comparing pipes by identity still match after cloning.
    pub fn clone_pipe(&self, keep_identity: bool) -> Pipe {
        let inner = self.inner.borrow();
        Pipe::from_inner(PipeInner {
            name: inner.name.clone(),
            id: if keep_identity { inner.id } else { PipeId::new() },
            steps: inner.steps.clone(),
            parent: inner.parent.clone(),
            gen_idx: inner.gen_idx,
        })
    }

    pub(crate) fn set_parent(&self, parent: Option<Pipe>) {
        self.inner.borrow_mut().parent = parent;
    }

    /// Drops all steps and the parent link.
    ///
    /// Used when a finished iteration graph is torn down: fork edges may
    /// point back at their own pipe, and severing the step lists breaks
    /// those reference cycles.
    pub fn sever(&self) {
        let mut inner = self.inner.borrow_mut();
        inner.steps.clear();
        inner.parent = None;
    }
}

impl fmt::Debug for Pipe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(inner) => {
                let parent = inner.parent.as_ref().map(|p| p.name());
                f.debug_struct("Pipe")
                    .field("name", &inner.name)
                    .field("id", &inner.id.to_string())
                    .field("steps", &inner.steps.len())
                    .field("parent", &parent)
                    .finish()
            }
            Err(_) => write!(f, "Pipe(<borrowed>)"),
        }
    }

    // identity helpers live on the handle; equality of pipes is by id, which
    // deliberately survives clone_pipe
}

impl Pipe {
    fn check_transform_step(&self, step: PipeStep) -> Result<PipeStep, ExtractError> {
        match step {
            PipeStep::Source(_) => {
                let msg = if self.has_parent() {
                    "a producer step cannot be added to a transformer pipe"
                } else {
                    "a producer step can only be the first step of a resource pipe"
                };
                Err(ExtractError::CreatePipe(self.name(), msg.to_string()))
            }
            other => Ok(other),
        }
    }
}
