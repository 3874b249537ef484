//! Save-as
//!
//! Serializes a tree into a brand new image. The image is written to a
//! uniquely named temporary file beside the target and renamed over the
//! target only when every node was written. New files are read from the host,
//! everything else that carries data is copied out of the currently open
//! image. Node state (fresh ids, positions, `Clean`) is committed only after
//! the rename succeeded.

use crate::codec::{ImageWriter, SourceImage, WrittenObject};
use crate::error::ImageError;
use crate::tree::{Condition, NodeHandle, NodeKind, Tree};
use crate::types::{ImageGeometry, ObjectId, ObjectType, OBJECT_ID_ROOT};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Per-category outcome of one save.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveSummary {
    pub success: bool,
    pub files_saved: usize,
    pub files_failed: usize,
    pub directories_saved: usize,
    pub directories_failed: usize,
    pub symlinks_saved: usize,
    pub symlinks_failed: usize,
    pub hardlinks_saved: usize,
    pub hardlinks_failed: usize,
    pub specials_saved: usize,
    pub specials_failed: usize,
}

impl SaveSummary {
    pub fn saved(&self) -> usize {
        self.files_saved
            + self.directories_saved
            + self.symlinks_saved
            + self.hardlinks_saved
            + self.specials_saved
    }

    pub fn failures(&self) -> usize {
        self.files_failed
            + self.directories_failed
            + self.symlinks_failed
            + self.hardlinks_failed
            + self.specials_failed
    }

    fn record(&mut self, object_type: ObjectType, ok: bool) {
        let (saved, failed) = match object_type {
            ObjectType::File => (&mut self.files_saved, &mut self.files_failed),
            ObjectType::Directory => (&mut self.directories_saved, &mut self.directories_failed),
            ObjectType::SymLink => (&mut self.symlinks_saved, &mut self.symlinks_failed),
            ObjectType::HardLink => (&mut self.hardlinks_saved, &mut self.hardlinks_failed),
            ObjectType::Special | ObjectType::Unknown => {
                (&mut self.specials_saved, &mut self.specials_failed)
            }
        };
        if ok {
            *saved += 1;
        } else {
            *failed += 1;
        }
    }
}

/// True when both paths name the same file. Paths that cannot be
/// canonicalized (e.g. a target that does not exist yet) compare literally.
pub fn same_image_path(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Write `tree` as a new image at `target`.
///
/// `source_image` is the image the tree was loaded from; it supplies the data
/// of files without a host source. Per-node failures do not abort the walk:
/// they are counted, the failing nodes become `Condition::Error`, the target
/// is left untouched and the summary reports `success = false`. Errors that
/// prevent any image from being produced are returned as `Err`.
pub fn save_as(
    tree: &mut Tree,
    source_image: Option<&Path>,
    target: &Path,
    geometry: ImageGeometry,
) -> Result<SaveSummary, ImageError> {
    if let Some(source) = source_image {
        if same_image_path(source, target) {
            return Err(ImageError::AlreadyOpenAsTarget(target.to_path_buf()));
        }
    }

    let dir = match target.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let prefix = format!(
        ".{}.",
        target
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "image".to_string())
    );
    let temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(".tmp")
        .tempfile_in(&dir)
        .map_err(|e| ImageError::io(&dir, e))?;
    let temp_path = temp.path().to_path_buf();
    debug!(temp = %temp_path.display(), "Writing image to temporary file");

    let mut walk = SaveWalk {
        tree: &*tree,
        writer: ImageWriter::new(BufWriter::new(temp), geometry),
        source: source_image.map(|p| SourceImage::new(p, geometry)),
        summary: SaveSummary::default(),
        committed: Vec::new(),
        failed: Vec::new(),
        id_map: HashMap::new(),
        hardlinks: Vec::new(),
    };
    walk.write_root();
    walk.write_hardlinks();

    let SaveWalk {
        writer,
        mut summary,
        committed,
        failed,
        ..
    } = walk;

    if summary.failures() > 0 {
        for handle in failed {
            if let Some(node) = tree.get_mut(handle) {
                node.condition = Condition::Error;
            }
            tree.notify_data_changed(handle);
        }
        warn!(
            target = %target.display(),
            failures = summary.failures(),
            "Save failed, target left untouched"
        );
        return Ok(summary);
    }

    let temp = writer
        .finish()?
        .into_inner()
        .map_err(|e| ImageError::io(&temp_path, e.into_error()))?;
    temp.as_file()
        .sync_all()
        .map_err(|e| ImageError::io(&temp_path, e))?;
    temp.persist(target)
        .map_err(|e| ImageError::io(target, e.error))?;

    for update in committed {
        if let Some(node) = tree.get_mut(update.handle) {
            node.object_id = update.written.object_id;
            node.parent_object_id = update.parent_id;
            node.header_position = Some(update.written.header_position);
            node.condition = Condition::Clean;
            if let NodeKind::File {
                size,
                external_source,
            } = &mut node.kind
            {
                *size = update.file_size;
                *external_source = None;
            }
            if let NodeKind::HardLink { equivalent_id } = &mut node.kind {
                *equivalent_id = update.equivalent_id;
            }
        }
        tree.notify_data_changed(update.handle);
    }

    summary.success = true;
    info!(
        target = %target.display(),
        files = summary.files_saved,
        directories = summary.directories_saved,
        symlinks = summary.symlinks_saved,
        "Saved image"
    );
    Ok(summary)
}

/// Node state to apply once the save is known to have succeeded.
struct CommitUpdate {
    handle: NodeHandle,
    written: WrittenObject,
    parent_id: ObjectId,
    file_size: u64,
    equivalent_id: ObjectId,
}

struct SaveWalk<'a, W: Write> {
    tree: &'a Tree,
    writer: ImageWriter<W>,
    source: Option<SourceImage>,
    summary: SaveSummary,
    committed: Vec<CommitUpdate>,
    failed: Vec<NodeHandle>,
    /// Loaded object id to freshly written id.
    id_map: HashMap<ObjectId, ObjectId>,
    /// Hard links with the fresh id of their parent, written after the walk.
    hardlinks: Vec<(NodeHandle, ObjectId)>,
}

impl<W: Write> SaveWalk<'_, W> {
    fn write_root(&mut self) {
        let tree = self.tree;
        let root = tree.root();
        let result = tree
            .node(root)
            .and_then(|node| self.writer.add_root(&node.to_header(OBJECT_ID_ROOT)));
        match result {
            Ok(written) => {
                self.written(root, OBJECT_ID_ROOT, written, 0, 0);
                self.write_children(root, OBJECT_ID_ROOT);
            }
            Err(e) => self.fail_subtree(root, &e),
        }
    }

    fn write_children(&mut self, parent: NodeHandle, parent_id: ObjectId) {
        let children = self.tree.get(parent).map(|n| n.children().to_vec()).unwrap_or_default();
        for child in children {
            self.write_node(child, parent_id);
        }
    }

    fn write_node(&mut self, handle: NodeHandle, parent_id: ObjectId) {
        let tree = self.tree;
        let Some(node) = tree.get(handle) else {
            return;
        };
        let header = node.to_header(parent_id);

        let result = match node.kind() {
            NodeKind::HardLink { .. } => {
                self.hardlinks.push((handle, parent_id));
                return;
            }
            NodeKind::File { .. } => self
                .file_data(handle)
                .and_then(|data| {
                    let len = data.len() as u64;
                    self.writer.add_file(&header, &data).map(|w| (w, len))
                }),
            _ => self.writer.add_object(&header).map(|w| (w, 0)),
        };

        match result {
            Ok((written, file_size)) => {
                self.written(handle, parent_id, written, file_size, 0);
                if node.is_dir() {
                    self.write_children(handle, written.object_id);
                }
            }
            Err(e) => self.fail_subtree(handle, &e),
        }
    }

    /// Hard links go last so every equivalent object already has its new id.
    fn write_hardlinks(&mut self) {
        let tree = self.tree;
        for (handle, parent_id) in std::mem::take(&mut self.hardlinks) {
            let Some(node) = tree.get(handle) else {
                continue;
            };
            let old_equivalent = node.equivalent_object_id().unwrap_or(0);
            let result = self
                .id_map
                .get(&old_equivalent)
                .copied()
                .ok_or_else(|| {
                    ImageError::Reference(format!(
                        "hard link '{}' points at missing object {}",
                        node.name(),
                        old_equivalent
                    ))
                })
                .and_then(|equivalent_id| {
                    let mut header = node.to_header(parent_id);
                    header.equivalent_id = equivalent_id;
                    self.writer.add_object(&header).map(|w| (w, equivalent_id))
                });
            match result {
                Ok((written, equivalent_id)) => {
                    self.written(handle, parent_id, written, 0, equivalent_id)
                }
                Err(e) => self.fail_subtree(handle, &e),
            }
        }
    }

    fn file_data(&mut self, handle: NodeHandle) -> Result<Vec<u8>, ImageError> {
        let tree = self.tree;
        let node = tree.node(handle)?;
        if let Some(host_path) = node.external_source() {
            return fs::read(host_path).map_err(|e| ImageError::io(host_path, e));
        }
        let position = node.header_position().ok_or_else(|| {
            ImageError::Reference(format!("file '{}' has neither host nor image data", node.name()))
        })?;
        let source = self.source.as_mut().ok_or(ImageError::NoImageOpen)?;
        source.extract_file(position)
    }

    fn written(
        &mut self,
        handle: NodeHandle,
        parent_id: ObjectId,
        written: WrittenObject,
        file_size: u64,
        equivalent_id: ObjectId,
    ) {
        let tree = self.tree;
        let Some(node) = tree.get(handle) else {
            return;
        };
        debug!(
            name = node.name(),
            object_id = written.object_id,
            position = written.header_position,
            "Wrote object"
        );
        if node.object_id() != 0 {
            self.id_map.insert(node.object_id(), written.object_id);
        }
        // The root is implied by every image and is not counted.
        if !node.is_root() {
            self.summary.record(node.object_type(), true);
        }
        self.committed.push(CommitUpdate {
            handle,
            written,
            parent_id,
            file_size,
            equivalent_id,
        });
    }

    /// Fail `handle`; a directory that could not be written takes its whole
    /// subtree with it.
    fn fail_subtree(&mut self, handle: NodeHandle, error: &ImageError) {
        let tree = self.tree;
        let path = tree.full_path(handle).unwrap_or_default();
        warn!(path = %path, error = %error, "Failed to save object");
        for h in tree.descendants(handle) {
            if let Some(node) = tree.get(h) {
                if !node.is_root() {
                    self.summary.record(node.object_type(), false);
                }
                self.failed.push(h);
            }
        }
    }
}
