//! Engine
//!
//! One `Engine` owns zero or one open tree together with the path of the image
//! it came from and the pending-change counters. Every edit goes through the
//! engine so that counters, conditions and observer notifications stay in
//! step. Independent engines share nothing.

use crate::error::ImageError;
use crate::export::{export_selection, ExportSummary, DEFAULT_FAILURE_CAP};
use crate::persist::{save_as, SaveSummary};
use crate::tree::{
    validate_name, DeletionBatchOptimizer, Node, NodeHandle, NodeKind, ReadSummary, Tree,
    TreeBuilder, TreeObserver,
};
use crate::types::{ImageGeometry, MAX_ALIAS_LENGTH, PERMISSION_MASK};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Permissions of imported files when none are given.
pub const DEFAULT_FILE_PERMISSIONS: u32 = 0o644;
/// Permissions of created directories when none are given.
pub const DEFAULT_DIR_PERMISSIONS: u32 = 0o755;

/// Settings the engine needs; built from `YaffsConfig` by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    pub geometry: ImageGeometry,
    pub export_failure_cap: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            geometry: ImageGeometry::default(),
            export_failure_cap: DEFAULT_FAILURE_CAP,
        }
    }
}

/// Edits made since the last load or successful save.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingChanges {
    pub new: usize,
    pub dirty: usize,
    pub deleted: usize,
}

impl PendingChanges {
    pub fn is_empty(&self) -> bool {
        self.new == 0 && self.dirty == 0 && self.deleted == 0
    }
}

pub struct Engine {
    config: EngineConfig,
    tree: Option<Tree>,
    image_path: Option<PathBuf>,
    image_name: Option<String>,
    changes: PendingChanges,
    /// Observer kept while no tree is open.
    detached_observer: Option<Box<dyn TreeObserver>>,
}

impl Engine {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            tree: None,
            image_path: None,
            image_name: None,
            changes: PendingChanges::default(),
            detached_observer: None,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Load the image at `path`, replacing any open tree.
    ///
    /// A load that finds no objects leaves the engine without a tree and
    /// reports `success = false`.
    pub fn load_image(&mut self, path: &Path) -> Result<ReadSummary, ImageError> {
        let loaded = TreeBuilder::load(path, self.config.geometry)?;
        match loaded.tree {
            Some(tree) => {
                self.install_tree(tree);
                self.image_path = Some(path.to_path_buf());
                self.image_name = path.file_name().map(|n| n.to_string_lossy().into_owned());
            }
            None => self.close_image(),
        }
        self.changes = PendingChanges::default();
        Ok(loaded.summary)
    }

    /// Start a new image holding only the root.
    pub fn new_empty_image(&mut self, name: &str) -> NodeHandle {
        let mut root = Node::root();
        stamp(&mut root);
        let tree = Tree::new(root);
        let root = tree.root();
        self.install_tree(tree);
        self.image_path = None;
        self.image_name = Some(name.to_string());
        self.changes = PendingChanges {
            new: 1,
            ..PendingChanges::default()
        };
        info!(name, "Created empty image");
        root
    }

    /// Drop the open tree and forget the image path.
    pub fn close_image(&mut self) {
        if let Some(observer) = self.tree.as_mut().and_then(Tree::take_observer) {
            self.detached_observer = Some(observer);
        }
        self.tree = None;
        self.image_path = None;
        self.image_name = None;
        self.changes = PendingChanges::default();
    }

    pub fn tree(&self) -> Option<&Tree> {
        self.tree.as_ref()
    }

    /// Path of the image the tree was loaded from or last saved to.
    pub fn image_path(&self) -> Option<&Path> {
        self.image_path.as_deref()
    }

    pub fn image_name(&self) -> Option<&str> {
        self.image_name.as_deref()
    }

    pub fn pending_changes(&self) -> PendingChanges {
        self.changes
    }

    pub fn is_dirty(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Install the observer notified of tree changes; it survives image
    /// replacement.
    pub fn set_observer(&mut self, observer: Box<dyn TreeObserver>) {
        match self.tree.as_mut() {
            Some(tree) => tree.set_observer(observer),
            None => self.detached_observer = Some(observer),
        }
    }

    /// Node at an absolute internal path.
    pub fn resolve(&self, path: &str) -> Result<NodeHandle, ImageError> {
        self.open_tree()?.resolve(path).ok_or(ImageError::NodeNotFound)
    }

    pub fn node(&self, handle: NodeHandle) -> Result<&Node, ImageError> {
        self.open_tree()?.node(handle)
    }

    /// Import one host file under `parent`, keeping its file name.
    pub fn import_file(&mut self, parent: NodeHandle, host_path: &Path) -> Result<NodeHandle, ImageError> {
        let name = host_file_name(host_path)?;
        self.import_file_named(parent, host_path, &name)
    }

    /// Import a host file at an internal path, creating missing parent
    /// directories, and apply ownership and permissions.
    pub fn import_file_at(
        &mut self,
        host_path: &Path,
        internal_path: &str,
        uid: u32,
        gid: u32,
        permissions: u32,
    ) -> Result<NodeHandle, ImageError> {
        check_permissions(permissions)?;
        let (parent_path, name) = split_internal_path(internal_path)?;
        self.check_host_file(host_path)?;
        let parent = self.ensure_directory_path(parent_path)?;
        let handle = self.import_file_named(parent, host_path, name)?;
        let node = self.open_tree_mut()?.node_mut(handle)?;
        node.uid = uid;
        node.gid = gid;
        node.set_permission_bits(permissions);
        Ok(handle)
    }

    /// Mirror a host directory under `parent`. Host entries that are neither
    /// files nor directories, or whose names cannot be stored, are skipped.
    pub fn import_directory(&mut self, parent: NodeHandle, host_dir: &Path) -> Result<NodeHandle, ImageError> {
        let meta = fs::metadata(host_dir).map_err(|e| ImageError::io(host_dir, e))?;
        if !meta.is_dir() {
            return Err(ImageError::InvalidAttribute(format!(
                "{} is not a directory",
                host_dir.display()
            )));
        }
        let name = host_file_name(host_dir)?;
        let top = self.add_child(parent, Node::directory(name, DEFAULT_DIR_PERMISSIONS))?;

        let mut dirs: HashMap<PathBuf, NodeHandle> = HashMap::new();
        dirs.insert(host_dir.to_path_buf(), top);
        for entry in WalkDir::new(host_dir).min_depth(1).sort_by_file_name() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable host entry");
                    continue;
                }
            };
            let Some(&dir) = entry.path().parent().and_then(|p| dirs.get(p)) else {
                continue;
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type();
            let result = if file_type.is_dir() {
                self.add_child(dir, Node::directory(name, DEFAULT_DIR_PERMISSIONS))
                    .map(|handle| {
                        dirs.insert(entry.path().to_path_buf(), handle);
                    })
            } else if file_type.is_file() {
                self.import_file_named(dir, entry.path(), &name).map(|_| ())
            } else {
                debug!(path = %entry.path().display(), "Skipping non-regular host entry");
                Ok(())
            };
            if let Err(e) = result {
                warn!(path = %entry.path().display(), error = %e, "Skipping host entry");
            }
        }
        Ok(top)
    }

    /// Create a directory at an internal path, creating missing parents.
    pub fn create_directory(
        &mut self,
        internal_path: &str,
        uid: u32,
        gid: u32,
        permissions: u32,
    ) -> Result<NodeHandle, ImageError> {
        check_permissions(permissions)?;
        let (parent_path, name) = split_internal_path(internal_path)?;
        let parent = self.ensure_directory_path(parent_path)?;
        let mut node = Node::directory(name, permissions);
        node.uid = uid;
        node.gid = gid;
        self.add_child(parent, node)
    }

    /// Create a symlink at an internal path, creating missing parents.
    pub fn create_symlink(
        &mut self,
        internal_path: &str,
        alias: &str,
        uid: u32,
        gid: u32,
        permissions: u32,
    ) -> Result<NodeHandle, ImageError> {
        check_permissions(permissions)?;
        check_alias(alias)?;
        let (parent_path, name) = split_internal_path(internal_path)?;
        let parent = self.ensure_directory_path(parent_path)?;
        let mut node = Node::symlink(name, alias, permissions);
        node.uid = uid;
        node.gid = gid;
        self.add_child(parent, node)
    }

    pub fn set_name(&mut self, handle: NodeHandle, name: &str) -> Result<(), ImageError> {
        validate_name(name)?;
        let tree = self.open_tree()?;
        let node = tree.node(handle)?;
        if node.is_root() {
            return Err(ImageError::InvalidAttribute("the root cannot be renamed".to_string()));
        }
        if let Some(parent) = node.parent() {
            if let Some(existing) = tree.find_child_by_name(parent, name) {
                if existing != handle {
                    return Err(ImageError::DuplicateName {
                        parent: tree.full_path(parent)?,
                        name: name.to_string(),
                    });
                }
            }
        }
        self.edit(handle, |node| node.name = name.to_string())
    }

    pub fn set_permissions(&mut self, handle: NodeHandle, permissions: u32) -> Result<(), ImageError> {
        check_permissions(permissions)?;
        self.edit(handle, |node| node.set_permission_bits(permissions))
    }

    pub fn set_alias(&mut self, handle: NodeHandle, alias: &str) -> Result<(), ImageError> {
        check_alias(alias)?;
        if !self.node(handle)?.is_symlink() {
            return Err(ImageError::InvalidAttribute(
                "only symlinks carry an alias".to_string(),
            ));
        }
        self.edit(handle, |node| {
            if let NodeKind::SymLink { alias: current } = &mut node.kind {
                *current = alias.to_string();
            }
        })
    }

    pub fn set_uid(&mut self, handle: NodeHandle, uid: u32) -> Result<(), ImageError> {
        self.edit(handle, |node| node.uid = uid)
    }

    pub fn set_gid(&mut self, handle: NodeHandle, gid: u32) -> Result<(), ImageError> {
        self.edit(handle, |node| node.gid = gid)
    }

    /// Delete `selection`; returns the number of nodes removed, descendants
    /// included.
    pub fn delete_selection(&mut self, selection: &[NodeHandle]) -> Result<usize, ImageError> {
        let tree = self.open_tree_mut()?;
        let removed = DeletionBatchOptimizer::delete_selection(tree, selection)?;
        self.changes.deleted += removed;
        info!(removed, "Deleted selection");
        Ok(removed)
    }

    /// Write the open tree to `target`. On success `target` becomes the
    /// open image and the change counters reset.
    pub fn save_as(&mut self, target: &Path) -> Result<SaveSummary, ImageError> {
        let tree = self.tree.as_mut().ok_or(ImageError::NoImageOpen)?;
        let summary = save_as(tree, self.image_path.as_deref(), target, self.config.geometry)?;
        if summary.success {
            self.image_path = Some(target.to_path_buf());
            self.image_name = target.file_name().map(|n| n.to_string_lossy().into_owned());
            self.changes = PendingChanges::default();
        }
        Ok(summary)
    }

    pub fn export_selection(&self, selection: &[NodeHandle], dest: &Path) -> Result<ExportSummary, ImageError> {
        export_selection(
            self.open_tree()?,
            self.image_path.as_deref(),
            selection,
            dest,
            self.config.geometry,
            self.config.export_failure_cap,
        )
    }

    fn install_tree(&mut self, mut tree: Tree) {
        let observer = self
            .tree
            .as_mut()
            .and_then(Tree::take_observer)
            .or_else(|| self.detached_observer.take());
        if let Some(observer) = observer {
            tree.set_observer(observer);
        }
        self.tree = Some(tree);
    }

    fn open_tree(&self) -> Result<&Tree, ImageError> {
        self.tree.as_ref().ok_or(ImageError::NoImageOpen)
    }

    fn open_tree_mut(&mut self) -> Result<&mut Tree, ImageError> {
        self.tree.as_mut().ok_or(ImageError::NoImageOpen)
    }

    /// Apply `change` to a node, flip it to Dirty and notify.
    fn edit(&mut self, handle: NodeHandle, change: impl FnOnce(&mut Node)) -> Result<(), ImageError> {
        let tree = self.open_tree_mut()?;
        let node = tree.node_mut(handle)?;
        change(node);
        let became_dirty = node.touch();
        tree.notify_data_changed(handle);
        if became_dirty {
            self.changes.dirty += 1;
        }
        Ok(())
    }

    /// Append a New node after the duplicate-name check.
    fn add_child(&mut self, parent: NodeHandle, mut node: Node) -> Result<NodeHandle, ImageError> {
        validate_name(node.name())?;
        let tree = self.open_tree_mut()?;
        if tree.find_child_by_name(parent, node.name()).is_some() {
            return Err(ImageError::DuplicateName {
                parent: tree.full_path(parent)?,
                name: node.name().to_string(),
            });
        }
        stamp(&mut node);
        let handle = tree.append_child(parent, node)?;
        debug!(path = %tree.full_path(handle)?, "Added node");
        self.changes.new += 1;
        Ok(handle)
    }

    fn import_file_named(&mut self, parent: NodeHandle, host_path: &Path, name: &str) -> Result<NodeHandle, ImageError> {
        let size = self.check_host_file(host_path)?;
        self.add_child(
            parent,
            Node::host_file(name, host_path, size, DEFAULT_FILE_PERMISSIONS),
        )
    }

    /// Size of a readable regular host file.
    fn check_host_file(&self, host_path: &Path) -> Result<u64, ImageError> {
        let meta = fs::metadata(host_path).map_err(|e| ImageError::io(host_path, e))?;
        if !meta.is_file() {
            return Err(ImageError::InvalidAttribute(format!(
                "{} is not a regular file",
                host_path.display()
            )));
        }
        fs::File::open(host_path).map_err(|e| ImageError::io(host_path, e))?;
        Ok(meta.len())
    }

    /// Directory at `path`, creating missing components as New directories.
    fn ensure_directory_path(&mut self, path: &str) -> Result<NodeHandle, ImageError> {
        let mut current = self.open_tree()?.root();
        for name in path.split('/').filter(|part| !part.is_empty()) {
            let tree = self.open_tree()?;
            current = match tree.find_child_by_name(current, name) {
                Some(child) if tree.node(child)?.is_dir() => child,
                Some(child) => {
                    return Err(ImageError::InvalidAttribute(format!(
                        "{} is not a directory",
                        tree.full_path(child)?
                    )))
                }
                None => self.add_child(current, Node::directory(name, DEFAULT_DIR_PERMISSIONS))?,
            };
        }
        Ok(current)
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new(EngineConfig::default())
    }
}

/// Split an absolute internal path into parent path and leaf name.
fn split_internal_path(path: &str) -> Result<(&str, &str), ImageError> {
    let trimmed = path.trim_end_matches('/');
    let (parent, name) = trimmed.rsplit_once('/').unwrap_or(("", trimmed));
    validate_name(name)?;
    Ok((parent, name))
}

fn host_file_name(host_path: &Path) -> Result<String, ImageError> {
    host_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .ok_or_else(|| ImageError::InvalidName(format!("{} has no file name", host_path.display())))
}

fn check_permissions(permissions: u32) -> Result<(), ImageError> {
    if permissions & !PERMISSION_MASK != 0 {
        return Err(ImageError::InvalidAttribute(format!(
            "permissions {:o} exceed {:o}",
            permissions, PERMISSION_MASK
        )));
    }
    Ok(())
}

fn check_alias(alias: &str) -> Result<(), ImageError> {
    if alias.is_empty() || alias.len() > MAX_ALIAS_LENGTH {
        return Err(ImageError::InvalidAttribute(format!(
            "alias must be 1..={} bytes, got {}",
            MAX_ALIAS_LENGTH,
            alias.len()
        )));
    }
    Ok(())
}

/// Set all three timestamps of a freshly created node to now.
fn stamp(node: &mut Node) {
    let now = u32::try_from(chrono::Utc::now().timestamp()).unwrap_or(0);
    node.atime = now;
    node.mtime = now;
    node.ctime = now;
}
