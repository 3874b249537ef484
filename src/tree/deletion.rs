//! Deletion Batch Optimizer
//!
//! Turns an arbitrary multi-selection into the fewest contiguous row removals
//! per parent. Marked subtrees are removed whole, so nothing beneath a marked
//! node is ever emitted separately.

use super::{NodeHandle, Tree};
use crate::error::ImageError;
use tracing::{debug, warn};

/// One contiguous removal: `count` rows of `parent` starting at `start`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RemovalOp {
    pub parent: NodeHandle,
    pub start: usize,
    pub count: usize,
}

pub struct DeletionBatchOptimizer;

impl DeletionBatchOptimizer {
    /// Mark every node of `selection` and remove all of them.
    ///
    /// The root is never deleted; it is dropped from the selection with a
    /// warning. Returns the number of nodes removed, descendants included.
    /// A handle that no longer resolves fails the call before anything is
    /// marked.
    pub fn delete_selection(tree: &mut Tree, selection: &[NodeHandle]) -> Result<usize, ImageError> {
        for &handle in selection {
            tree.node(handle)?;
        }
        for &handle in selection {
            if handle == tree.root() {
                warn!("Ignoring root in delete selection");
                continue;
            }
            tree.mark_for_delete(handle)?;
        }
        Self::delete_marked(tree)
    }

    /// Remove every node currently marked for deletion.
    pub fn delete_marked(tree: &mut Tree) -> Result<usize, ImageError> {
        let ops = Self::plan(tree);
        let removed = Self::apply(tree, &ops)?;
        Self::clear_descendant_flags(tree);
        debug!(ops = ops.len(), removed, "Applied deletion batch");
        Ok(removed)
    }

    /// Removal operations for the current marks. Within one parent the runs
    /// are ordered from the highest row down, so applying them in order keeps
    /// the remaining indices valid.
    pub fn plan(tree: &Tree) -> Vec<RemovalOp> {
        let mut ops = Vec::new();
        let mut stack = vec![tree.root()];
        while let Some(parent) = stack.pop() {
            let Some(node) = tree.get(parent) else {
                continue;
            };

            let mut marked = Vec::new();
            for (row, &child) in node.children().iter().enumerate() {
                let Some(child_node) = tree.get(child) else {
                    continue;
                };
                if child_node.is_marked_for_delete() {
                    marked.push(row);
                } else if child_node.has_descendant_marked_for_delete() {
                    stack.push(child);
                }
            }
            marked.sort_unstable();
            ops.extend(contiguous_runs(&marked).into_iter().map(|(start, count)| RemovalOp {
                parent,
                start,
                count,
            }));
        }
        ops
    }

    /// Apply `ops` in order. Returns the number of nodes removed.
    pub fn apply(tree: &mut Tree, ops: &[RemovalOp]) -> Result<usize, ImageError> {
        let mut removed = 0;
        for op in ops {
            removed += tree.remove_rows(op.parent, op.start, op.count)?;
        }
        Ok(removed)
    }

    fn clear_descendant_flags(tree: &mut Tree) {
        for handle in tree.descendants(tree.root()) {
            if let Some(node) = tree.get_mut(handle) {
                node.has_descendant_marked_for_delete = false;
            }
        }
    }
}

/// Maximal runs of consecutive values in an ascending slice, highest first,
/// as `(start, count)` pairs.
fn contiguous_runs(sorted_rows: &[usize]) -> Vec<(usize, usize)> {
    let mut runs = Vec::new();
    let mut iter = sorted_rows.iter().rev().copied();
    let Some(first) = iter.next() else {
        return runs;
    };
    let (mut start, mut end) = (first, first);
    for row in iter {
        if row + 1 == start {
            start = row;
        } else {
            runs.push((start, end - start + 1));
            start = row;
            end = row;
        }
    }
    runs.push((start, end - start + 1));
    runs
}
