//! Tree Builder
//!
//! Rebuilds the object tree from a decoded record stream. Records arrive in
//! physical order, which says nothing about hierarchy: a child may precede its
//! parent. Nodes whose parent is already known are attached immediately, the
//! rest wait in a pending list and are re-resolved once the scan is complete.
//! Whatever is still unreachable from the root afterwards is an orphan.

use super::{Node, NodeHandle, Tree};
use crate::codec::{DecodedRecord, ObjectHeader, RecordKind, RecordScanner};
use crate::error::ImageError;
use crate::types::{ImageGeometry, ObjectId, ObjectType, OBJECT_ID_ROOT};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};

/// Aggregate counters produced once per load.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadSummary {
    pub success: bool,
    pub files: usize,
    pub directories: usize,
    pub symlinks: usize,
    pub hardlinks: usize,
    pub specials: usize,
    pub unknowns: usize,
    /// Headers that failed to decode.
    pub corrupt_headers: usize,
    pub orphans: usize,
    /// Headers repeating an already seen object id; the last one wins.
    pub duplicate_headers: usize,
    /// Data chunks that did not follow their predecessor's index.
    pub chunk_gaps: usize,
    /// The image ended on a partial record.
    pub truncated_tail: bool,
}

/// Result of a load: the tree (absent when the image held no objects) and
/// its summary.
pub struct LoadedImage {
    pub tree: Option<Tree>,
    pub summary: ReadSummary,
}

struct Staged {
    node: Node,
    children: Vec<usize>,
}

#[derive(Default)]
pub struct TreeBuilder {
    staged: Vec<Staged>,
    index: HashMap<ObjectId, usize>,
    root: Option<usize>,
    pending: Vec<usize>,
    unknown_ids: HashSet<ObjectId>,
    last_chunk: HashMap<ObjectId, u32>,
    summary: ReadSummary,
}

impl TreeBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan the image at `path` and build its tree.
    pub fn load(path: &Path, geometry: ImageGeometry) -> Result<LoadedImage, ImageError> {
        let mut scanner = RecordScanner::open(path, geometry)?;
        let mut builder = TreeBuilder::new();
        for record in scanner.by_ref() {
            builder.ingest(record?);
        }
        let loaded = builder.finish(scanner.truncated_tail())?;
        info!(
            path = %path.display(),
            files = loaded.summary.files,
            directories = loaded.summary.directories,
            symlinks = loaded.summary.symlinks,
            orphans = loaded.summary.orphans,
            corrupt = loaded.summary.corrupt_headers,
            "Loaded image"
        );
        Ok(loaded)
    }

    pub fn ingest(&mut self, record: DecodedRecord) {
        match record.kind {
            RecordKind::Header => match ObjectHeader::decode(&record.payload, record.position) {
                Ok(header) => self.ingest_header(record.object_id, &header, record.position),
                Err(e) => {
                    warn!(object_id = record.object_id, error = %e, "Skipping corrupt header");
                    self.summary.corrupt_headers += 1;
                }
            },
            RecordKind::Chunk { index, .. } => self.ingest_chunk(record.object_id, index),
        }
    }

    fn ingest_header(&mut self, object_id: ObjectId, header: &ObjectHeader, position: u64) {
        let Some(node) = Node::from_header(object_id, header, position) else {
            if self.unknown_ids.insert(object_id) {
                self.summary.unknowns += 1;
            }
            return;
        };

        if let Some(&existing) = self.index.get(&object_id) {
            let staged = &mut self.staged[existing].node;
            if staged.object_type() != header.object_type {
                warn!(
                    object_id,
                    first = ?staged.object_type(),
                    repeated = ?header.object_type,
                    "Duplicate header changes the object type, ignoring it"
                );
                self.summary.corrupt_headers += 1;
                return;
            }
            debug!(object_id, "Duplicate header, keeping latest attributes");
            self.summary.duplicate_headers += 1;
            // Placement follows the first header.
            let parent_object_id = staged.parent_object_id;
            staged.apply_header(header);
            staged.parent_object_id = parent_object_id;
            staged.header_position = Some(position);
            return;
        }

        if object_id == OBJECT_ID_ROOT {
            let idx = self.stage(node);
            self.index.insert(OBJECT_ID_ROOT, idx);
            self.root = Some(idx);
            return;
        }

        self.count_category(header.object_type);
        let parent = self.directory_index(header.parent_id);
        let idx = self.stage(node);
        self.index.insert(object_id, idx);
        match parent {
            Some(parent) => self.staged[parent].children.push(idx),
            None => self.pending.push(idx),
        }
    }

    fn ingest_chunk(&mut self, object_id: ObjectId, index: u32) {
        let last = self.last_chunk.insert(object_id, index).unwrap_or(0);
        if index != last + 1 {
            debug!(object_id, index, last, "Chunk index gap");
            self.summary.chunk_gaps += 1;
        }
    }

    /// Finish ingestion: synthesize a missing root, resolve forward
    /// references and materialize the tree.
    pub fn finish(mut self, truncated_tail: bool) -> Result<LoadedImage, ImageError> {
        self.summary.truncated_tail = truncated_tail;

        if self.root.is_none() {
            if self.staged.is_empty() {
                warn!("Image contains no objects");
                return Ok(LoadedImage {
                    tree: None,
                    summary: self.summary,
                });
            }
            debug!("No root header found, synthesizing one");
            let idx = self.stage(Node::root());
            self.index.insert(OBJECT_ID_ROOT, idx);
            self.root = Some(idx);
        }

        for idx in std::mem::take(&mut self.pending) {
            let parent_id = self.staged[idx].node.parent_object_id;
            match self.directory_index(parent_id) {
                Some(parent) if parent != idx => {
                    debug!(parent_id, "Child preceded its parent in the image");
                    self.staged[parent].children.push(idx);
                }
                _ => {}
            }
        }

        let root_idx = self.root.ok_or(ImageError::NoImageOpen)?;
        let total_non_root = self.staged.len() - 1;
        let mut summary = std::mem::take(&mut self.summary);
        let (tree, reachable) = self.materialize(root_idx)?;

        summary.orphans = total_non_root - reachable;
        if summary.orphans > 0 {
            warn!(orphans = summary.orphans, "Objects without a reachable parent were dropped");
        }
        summary.success = true;
        Ok(LoadedImage {
            tree: Some(tree),
            summary,
        })
    }

    /// Move staged nodes reachable from `root_idx` into a tree.
    fn materialize(self, root_idx: usize) -> Result<(Tree, usize), ImageError> {
        let mut children: Vec<Vec<usize>> = Vec::with_capacity(self.staged.len());
        let mut nodes: Vec<Option<Node>> = Vec::with_capacity(self.staged.len());
        for staged in self.staged {
            children.push(staged.children);
            nodes.push(Some(staged.node));
        }

        let root = nodes[root_idx].take().ok_or(ImageError::NoImageOpen)?;
        let mut tree = Tree::new(root);
        let mut reachable = 0;
        let mut stack: Vec<(usize, NodeHandle)> = vec![(root_idx, tree.root())];
        while let Some((idx, handle)) = stack.pop() {
            let mut added = Vec::with_capacity(children[idx].len());
            for &child in &children[idx] {
                if let Some(node) = nodes[child].take() {
                    added.push((child, tree.append_child(handle, node)?));
                    reachable += 1;
                }
            }
            stack.extend(added.into_iter().rev());
        }

        for node in nodes.iter().flatten() {
            if !node.is_root() {
                debug!(name = node.name(), parent_id = node.parent_object_id, "Orphan");
            }
        }
        Ok((tree, reachable))
    }

    fn stage(&mut self, node: Node) -> usize {
        self.staged.push(Staged {
            node,
            children: Vec::new(),
        });
        self.staged.len() - 1
    }

    fn directory_index(&self, object_id: ObjectId) -> Option<usize> {
        self.index
            .get(&object_id)
            .copied()
            .filter(|&idx| self.staged[idx].node.is_dir())
    }

    fn count_category(&mut self, object_type: ObjectType) {
        match object_type {
            ObjectType::File => self.summary.files += 1,
            ObjectType::Directory => self.summary.directories += 1,
            ObjectType::SymLink => self.summary.symlinks += 1,
            ObjectType::HardLink => self.summary.hardlinks += 1,
            ObjectType::Special => self.summary.specials += 1,
            ObjectType::Unknown => self.summary.unknowns += 1,
        }
    }
}
