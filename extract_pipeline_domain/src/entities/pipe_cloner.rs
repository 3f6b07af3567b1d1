// /////////////////////////////////////////////////////////////////////////////
// Extract Pipeline RS
// Copyright (c) 2025 Michael Gardner, A Bit of Help, Inc.
// SPDX-License-Identifier: BSD-3-Clause
// See LICENSE file in the project root.
// /////////////////////////////////////////////////////////////////////////////

//! # Pipe Cloner
//!
//! Deep-clones a set of pipes while preserving parent-sharing identity:
//! every input pipe gets a fresh clone, shared parents are cloned exactly
//! once, and the parent links of clones point only at clones. The originals
//! keep their own parent chain untouched, so a set of pipes can be iterated
//! many times.

use std::collections::HashMap;

use crate::entities::pipe::Pipe;

/// Clones `pipes` and rewires the parent references of the clones.
///
/// The identity map is keyed on the address of each original pipe: walking a
/// clone's parent chain, each original parent is cloned once on first sight
/// and reused for every descendant that referred to the same original.
pub fn clone_pipes(pipes: &[Pipe]) -> Vec<Pipe> {
    let clones: Vec<Pipe> = pipes.iter().map(|p| p.clone_pipe(true)).collect();
    let mut cloned_pairs: HashMap<usize, Pipe> = pipes
        .iter()
        .zip(clones.iter())
        .map(|(original, clone)| (original.addr(), clone.clone()))
        .collect();

    for clone in &clones {
        let mut current = clone.clone();
        loop {
            let Some(parent) = current.parent() else {
                break;
            };
            // stop as soon as the chain already points into the cloned set
            if cloned_pairs.values().any(|c| c.ptr_eq(&parent)) {
                break;
            }
            let parent_clone = cloned_pairs
                .entry(parent.addr())
                .or_insert_with(|| parent.clone_pipe(true))
                .clone();
            current.set_parent(Some(parent_clone.clone()));
            current = parent_clone;
        }
    }

    clones
}
