// SPDX-License-Identifier: Apache-2.0
// © James Ross Ω FLYING•ROBOTS <https://github.com/flyingrobots>
//! Dependency resolver for relations that reference other relations.
//!
//! Builds a directed graph (edge = "referencer → referenced"), hangs every
//! node with no incoming edge off a synthetic root, and emits a post-order
//! depth-first traversal: a relation is emitted only after every relation it
//! references, so the returned order is upload-safe. The traversal uses an
//! explicit work stack — reference chains can be arbitrarily deep and must
//! not be bounded by call-stack depth.
//!
//! The graph is built fresh per run from the not-yet-mapped relations only
//! (callers exclude mapped ones: a mapped target is already "before"
//! everything) and discarded once the order is produced.

use std::collections::BTreeMap;

use crate::element::{Element, ElementId, ElementKind};
use crate::error::CycleError;

/// Traversal colors: unvisited, on the current stack path, finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    New,
    Open,
    Done,
}

/// Returns `true` if any element in `relations` references another relation.
///
/// The cheap-path gate: when nothing is self-referential the resolver is
/// bypassed entirely and relations upload in document order.
#[must_use]
pub fn any_relation_reference(relations: &[&Element]) -> bool {
    relations
        .iter()
        .any(|r| r.refs.iter().any(|m| m.kind == ElementKind::Relation))
}

/// Computes an upload-safe total order over `relations`.
///
/// For every reference A→B inside the set, B precedes A in the output.
/// References to relations outside the set (already mapped, or absent from
/// the document) impose no ordering. Adjacency and root attachment iterate
/// in ascending id order, so the output is deterministic for a given input
/// set regardless of document order.
///
/// # Errors
/// Returns [`CycleError`] when the set contains a genuine reference cycle —
/// either found as a back-edge during the traversal (the error carries the
/// ids on the cycle path) or left unreachable from the synthetic root (a
/// cycle island with no zero-incoming entry point). No ordering is invented
/// for cyclic input.
pub fn upload_order(relations: &[&Element]) -> Result<Vec<ElementId>, CycleError> {
    let mut adjacency: BTreeMap<ElementId, Vec<ElementId>> = BTreeMap::new();
    for r in relations {
        adjacency.entry(r.id).or_default();
    }
    let mut incoming: BTreeMap<ElementId, usize> =
        adjacency.keys().map(|id| (*id, 0)).collect();
    for r in relations {
        for m in &r.refs {
            if m.kind == ElementKind::Relation && incoming.contains_key(&m.id) {
                if let Some(out) = adjacency.get_mut(&r.id) {
                    out.push(m.id);
                }
                if let Some(n) = incoming.get_mut(&m.id) {
                    *n += 1;
                }
            }
        }
    }

    let mut marks: BTreeMap<ElementId, Mark> =
        adjacency.keys().map(|id| (*id, Mark::New)).collect();
    let mut order = Vec::with_capacity(adjacency.len());

    // The synthetic root's children: every node nobody references.
    let roots: Vec<ElementId> = incoming
        .iter()
        .filter(|(_, n)| **n == 0)
        .map(|(id, _)| *id)
        .collect();

    for root in roots {
        if marks.get(&root) == Some(&Mark::Done) {
            continue;
        }
        // Frames of (node, next-child-index); a node is emitted when its
        // frame is exhausted, which is exactly post-order.
        let mut stack: Vec<(ElementId, usize)> = vec![(root, 0)];
        marks.insert(root, Mark::Open);
        while let Some((id, next)) = stack.last_mut() {
            let id = *id;
            let children = adjacency.get(&id).map_or(&[] as &[ElementId], Vec::as_slice);
            if let Some(child) = children.get(*next).copied() {
                *next += 1;
                match marks.get(&child).copied().unwrap_or(Mark::New) {
                    Mark::New => {
                        marks.insert(child, Mark::Open);
                        stack.push((child, 0));
                    }
                    // A child already on the current path is a back-edge.
                    Mark::Open => {
                        return Err(CycleError {
                            ids: cycle_path(&stack, child),
                        });
                    }
                    Mark::Done => {}
                }
            } else {
                marks.insert(id, Mark::Done);
                order.push(id);
                stack.pop();
            }
        }
    }

    if order.len() != adjacency.len() {
        // Unreachable from every zero-incoming node: a cycle island.
        let ids: Vec<ElementId> = marks
            .iter()
            .filter(|(_, mark)| **mark != Mark::Done)
            .map(|(id, _)| *id)
            .collect();
        return Err(CycleError { ids });
    }
    Ok(order)
}

/// The stack suffix from the first occurrence of `closing` to the top is the
/// cycle path.
fn cycle_path(stack: &[(ElementId, usize)], closing: ElementId) -> Vec<ElementId> {
    let start = stack
        .iter()
        .position(|(id, _)| *id == closing)
        .unwrap_or(0);
    stack[start..].iter().map(|(id, _)| *id).collect()
}
