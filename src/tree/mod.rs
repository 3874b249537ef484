//! Object Tree
//!
//! Plain ownership hierarchy of image objects. Nodes live in an arena and are
//! addressed by `NodeHandle`; every directory owns an ordered child list whose
//! row order is stable (insertion order, never sorted). Structural and data
//! changes are reported to an optional `TreeObserver`, which is the only
//! surface a presentation layer needs.

pub mod builder;
pub mod deletion;
pub mod node;

pub use builder::{LoadedImage, ReadSummary, TreeBuilder};
pub use deletion::{DeletionBatchOptimizer, RemovalOp};
pub use node::{validate_name, Condition, Node, NodeKind};

use crate::error::ImageError;
use tracing::debug;

/// Index of a node in its tree's arena. Handles of removed nodes resolve to
/// nothing; slots are never reused within one tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeHandle(usize);

/// Before/after notifications for structural and data changes.
///
/// Row ranges are inclusive, matching the removal operations emitted by the
/// deletion batcher.
pub trait TreeObserver: Send + Sync {
    fn rows_about_to_be_inserted(&mut self, _parent: NodeHandle, _first: usize, _last: usize) {}
    fn rows_inserted(&mut self, _parent: NodeHandle, _first: usize, _last: usize) {}
    fn rows_about_to_be_removed(&mut self, _parent: NodeHandle, _first: usize, _last: usize) {}
    fn rows_removed(&mut self, _parent: NodeHandle, _first: usize, _last: usize) {}
    fn data_changed(&mut self, _node: NodeHandle) {}
}

pub struct Tree {
    slots: Vec<Option<Node>>,
    root: NodeHandle,
    live: usize,
    observer: Option<Box<dyn TreeObserver>>,
}

impl Tree {
    /// Create a tree holding only `root`.
    pub fn new(mut root: Node) -> Self {
        root.parent = None;
        root.children.clear();
        Self {
            slots: vec![Some(root)],
            root: NodeHandle(0),
            live: 1,
            observer: None,
        }
    }

    pub fn set_observer(&mut self, observer: Box<dyn TreeObserver>) {
        self.observer = Some(observer);
    }

    pub fn take_observer(&mut self) -> Option<Box<dyn TreeObserver>> {
        self.observer.take()
    }

    pub fn root(&self) -> NodeHandle {
        self.root
    }

    /// Number of live nodes, root included.
    pub fn len(&self) -> usize {
        self.live
    }

    /// A tree always holds its root.
    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn get(&self, handle: NodeHandle) -> Option<&Node> {
        self.slots.get(handle.0).and_then(Option::as_ref)
    }

    pub(crate) fn get_mut(&mut self, handle: NodeHandle) -> Option<&mut Node> {
        self.slots.get_mut(handle.0).and_then(Option::as_mut)
    }

    pub fn node(&self, handle: NodeHandle) -> Result<&Node, ImageError> {
        self.get(handle).ok_or(ImageError::NodeNotFound)
    }

    pub(crate) fn node_mut(&mut self, handle: NodeHandle) -> Result<&mut Node, ImageError> {
        self.get_mut(handle).ok_or(ImageError::NodeNotFound)
    }

    pub fn child_count(&self, parent: NodeHandle) -> usize {
        self.get(parent).map(|n| n.children.len()).unwrap_or(0)
    }

    pub fn child(&self, parent: NodeHandle, row: usize) -> Option<NodeHandle> {
        self.get(parent).and_then(|n| n.children.get(row).copied())
    }

    /// Row of `handle` under its parent; the root is row 0.
    pub fn row(&self, handle: NodeHandle) -> Option<usize> {
        let node = self.get(handle)?;
        match node.parent {
            None => Some(0),
            Some(parent) => self
                .get(parent)?
                .children
                .iter()
                .position(|&c| c == handle),
        }
    }

    /// Exact, case-sensitive lookup among the direct children of `parent`.
    pub fn find_child_by_name(&self, parent: NodeHandle, name: &str) -> Option<NodeHandle> {
        self.get(parent)?
            .children
            .iter()
            .copied()
            .find(|&c| self.get(c).map(|n| n.name == name).unwrap_or(false))
    }

    /// Append `node` as the last child of `parent`.
    pub fn append_child(&mut self, parent: NodeHandle, mut node: Node) -> Result<NodeHandle, ImageError> {
        let parent_node = self.node(parent)?;
        if !parent_node.is_dir() {
            return Err(ImageError::InvalidAttribute(format!(
                "{} is not a directory",
                self.full_path(parent)?
            )));
        }
        let parent_object_id = parent_node.object_id;
        let row = parent_node.children.len();

        node.parent = Some(parent);
        node.parent_object_id = parent_object_id;
        node.children.clear();

        if let Some(observer) = self.observer.as_mut() {
            observer.rows_about_to_be_inserted(parent, row, row);
        }
        let handle = NodeHandle(self.slots.len());
        self.slots.push(Some(node));
        self.live += 1;
        self.node_mut(parent)?.children.push(handle);
        if let Some(observer) = self.observer.as_mut() {
            observer.rows_inserted(parent, row, row);
        }
        Ok(handle)
    }

    /// Remove the child at `row` of `parent` together with its subtree.
    /// Returns the number of nodes dropped.
    pub fn remove_child(&mut self, parent: NodeHandle, row: usize) -> Result<usize, ImageError> {
        self.remove_rows(parent, row, 1)
    }

    /// Remove `count` contiguous rows starting at `start`, with one pair of
    /// notifications. Returns the number of nodes dropped, descendants included.
    pub fn remove_rows(&mut self, parent: NodeHandle, start: usize, count: usize) -> Result<usize, ImageError> {
        let child_count = self.node(parent)?.children.len();
        if count == 0 || start + count > child_count {
            return Err(ImageError::InvalidAttribute(format!(
                "rows {}..{} out of range ({} children)",
                start,
                start + count,
                child_count
            )));
        }

        let last = start + count - 1;
        if let Some(observer) = self.observer.as_mut() {
            observer.rows_about_to_be_removed(parent, start, last);
        }
        let removed: Vec<NodeHandle> = self.node_mut(parent)?.children.drain(start..=last).collect();
        let mut dropped = 0;
        for handle in removed {
            dropped += self.free_subtree(handle);
        }
        if let Some(observer) = self.observer.as_mut() {
            observer.rows_removed(parent, start, last);
        }
        debug!(start, count, dropped, "Removed rows");
        Ok(dropped)
    }

    fn free_subtree(&mut self, handle: NodeHandle) -> usize {
        let Some(node) = self.slots.get_mut(handle.0).and_then(Option::take) else {
            return 0;
        };
        self.live -= 1;
        1 + node
            .children
            .iter()
            .map(|&child| self.free_subtree(child))
            .sum::<usize>()
    }

    /// Flag `handle` for deletion and record the pending deletion on every
    /// ancestor up to the root.
    pub fn mark_for_delete(&mut self, handle: NodeHandle) -> Result<(), ImageError> {
        let node = self.node_mut(handle)?;
        if node.is_root() {
            return Err(ImageError::InvalidAttribute(
                "the root cannot be deleted".to_string(),
            ));
        }
        node.condition = Condition::MarkedForDelete;
        let mut current = node.parent;
        while let Some(ancestor) = current {
            let ancestor_node = self.node_mut(ancestor)?;
            ancestor_node.has_descendant_marked_for_delete = true;
            current = ancestor_node.parent;
        }
        Ok(())
    }

    /// "/"-joined path from the root; the root itself is "/".
    pub fn full_path(&self, handle: NodeHandle) -> Result<String, ImageError> {
        let mut names = Vec::new();
        let mut current = Some(handle);
        while let Some(h) = current {
            let node = self.node(h)?;
            if node.parent.is_none() {
                break;
            }
            names.push(node.name.as_str());
            current = node.parent;
        }
        if names.is_empty() {
            return Ok("/".to_string());
        }
        names.reverse();
        Ok(format!("/{}", names.join("/")))
    }

    /// Look up an absolute internal path.
    pub fn resolve(&self, path: &str) -> Option<NodeHandle> {
        path.split('/')
            .filter(|part| !part.is_empty())
            .try_fold(self.root, |parent, name| self.find_child_by_name(parent, name))
    }

    /// `handle` and all its descendants in pre-order.
    pub fn descendants(&self, handle: NodeHandle) -> Vec<NodeHandle> {
        let mut out = Vec::new();
        let mut stack = vec![handle];
        while let Some(h) = stack.pop() {
            if let Some(node) = self.get(h) {
                out.push(h);
                stack.extend(node.children.iter().rev().copied());
            }
        }
        out
    }

    /// True when `ancestor` is a strict ancestor of `handle`.
    pub fn is_ancestor(&self, ancestor: NodeHandle, handle: NodeHandle) -> bool {
        let mut current = self.get(handle).and_then(|n| n.parent);
        while let Some(h) = current {
            if h == ancestor {
                return true;
            }
            current = self.get(h).and_then(|n| n.parent);
        }
        false
    }

    pub(crate) fn notify_data_changed(&mut self, handle: NodeHandle) {
        if let Some(observer) = self.observer.as_mut() {
            observer.data_changed(handle);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::Arc;

    /// Observer that records every notification as a string.
    #[derive(Clone, Default)]
    pub(crate) struct RecordingObserver {
        pub(crate) events: Arc<Mutex<Vec<String>>>,
    }

    impl TreeObserver for RecordingObserver {
        fn rows_about_to_be_inserted(&mut self, _parent: NodeHandle, first: usize, last: usize) {
            self.events.lock().push(format!("before-insert {}..={}", first, last));
        }
        fn rows_inserted(&mut self, _parent: NodeHandle, first: usize, last: usize) {
            self.events.lock().push(format!("insert {}..={}", first, last));
        }
        fn rows_about_to_be_removed(&mut self, _parent: NodeHandle, first: usize, last: usize) {
            self.events.lock().push(format!("before-remove {}..={}", first, last));
        }
        fn rows_removed(&mut self, _parent: NodeHandle, first: usize, last: usize) {
            self.events.lock().push(format!("remove {}..={}", first, last));
        }
        fn data_changed(&mut self, _node: NodeHandle) {
            self.events.lock().push("changed".to_string());
        }
    }

    fn sample() -> (Tree, NodeHandle, NodeHandle) {
        let mut tree = Tree::new(Node::root());
        let root = tree.root();
        let system = tree.append_child(root, Node::directory("system", 0o755)).unwrap();
        let bin = tree.append_child(system, Node::directory("bin", 0o755)).unwrap();
        tree.append_child(bin, Node::symlink("ls", "toolbox", 0o777)).unwrap();
        (tree, system, bin)
    }

    #[test]
    fn test_full_path_and_resolve() {
        let (tree, system, bin) = sample();
        assert_eq!(tree.full_path(tree.root()).unwrap(), "/");
        assert_eq!(tree.full_path(system).unwrap(), "/system");
        assert_eq!(tree.full_path(bin).unwrap(), "/system/bin");

        let ls = tree.resolve("/system/bin/ls").unwrap();
        assert_eq!(tree.full_path(ls).unwrap(), "/system/bin/ls");
        assert_eq!(tree.resolve("//system//bin/"), Some(bin));
        assert_eq!(tree.resolve("/"), Some(tree.root()));
        assert_eq!(tree.resolve("/vendor"), None);
    }

    #[test]
    fn test_rows_stay_contiguous_after_removal() {
        let mut tree = Tree::new(Node::root());
        let root = tree.root();
        let names = ["a", "b", "c", "d"];
        for name in names {
            tree.append_child(root, Node::directory(name, 0o755)).unwrap();
        }
        assert_eq!(tree.remove_child(root, 1).unwrap(), 1);

        let remaining: Vec<_> = (0..tree.child_count(root))
            .map(|row| {
                let child = tree.child(root, row).unwrap();
                assert_eq!(tree.row(child), Some(row));
                tree.node(child).unwrap().name().to_string()
            })
            .collect();
        assert_eq!(remaining, vec!["a", "c", "d"]);
    }

    #[test]
    fn test_removing_subtree_drops_descendants() {
        let (mut tree, system, _) = sample();
        assert_eq!(tree.len(), 4);
        let removed = tree.remove_rows(tree.root(), 0, 1).unwrap();
        assert_eq!(removed, 3);
        assert_eq!(tree.len(), 1);
        assert!(tree.get(system).is_none());
    }

    #[test]
    fn test_find_child_by_name_is_case_sensitive() {
        let (tree, system, _) = sample();
        assert_eq!(tree.find_child_by_name(tree.root(), "system"), Some(system));
        assert_eq!(tree.find_child_by_name(tree.root(), "System"), None);
    }

    #[test]
    fn test_mark_for_delete_flags_every_ancestor() {
        let (mut tree, system, bin) = sample();
        let ls = tree.resolve("/system/bin/ls").unwrap();
        tree.mark_for_delete(ls).unwrap();

        assert!(tree.node(ls).unwrap().is_marked_for_delete());
        assert!(tree.node(bin).unwrap().has_descendant_marked_for_delete());
        assert!(tree.node(system).unwrap().has_descendant_marked_for_delete());
        assert!(tree.node(tree.root()).unwrap().has_descendant_marked_for_delete());
        assert!(tree.mark_for_delete(tree.root()).is_err());
    }

    #[test]
    fn test_observer_sees_insert_and_remove() {
        let observer = RecordingObserver::default();
        let events = observer.events.clone();
        let mut tree = Tree::new(Node::root());
        tree.set_observer(Box::new(observer));

        let root = tree.root();
        tree.append_child(root, Node::directory("a", 0o755)).unwrap();
        tree.append_child(root, Node::directory("b", 0o755)).unwrap();
        tree.remove_rows(root, 0, 2).unwrap();

        assert_eq!(
            *events.lock(),
            vec![
                "before-insert 0..=0",
                "insert 0..=0",
                "before-insert 1..=1",
                "insert 1..=1",
                "before-remove 0..=1",
                "remove 0..=1",
            ]
        );
    }

    #[test]
    fn test_append_to_non_directory_fails() {
        let (mut tree, _, _) = sample();
        let ls = tree.resolve("/system/bin/ls").unwrap();
        assert!(tree.append_child(ls, Node::directory("x", 0o755)).is_err());
    }
}
