//! Tree node types

use super::NodeHandle;
use crate::codec::ObjectHeader;
use crate::error::ImageError;
use crate::types::{
    ObjectId, ObjectType, MAX_NAME_LENGTH, OBJECT_ID_ROOT, PERMISSION_MASK, S_IFDIR, S_IFLNK,
    S_IFMT, S_IFREG,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Variant-specific part of a node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeKind {
    Root,
    Directory,
    File {
        size: u64,
        /// Host file backing a not-yet-saved import.
        external_source: Option<PathBuf>,
    },
    SymLink {
        alias: String,
    },
    HardLink {
        equivalent_id: ObjectId,
    },
    Special {
        rdev: u32,
    },
}

/// Lifecycle tag relative to the open image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Condition {
    Clean,
    Dirty,
    New,
    Error,
    MarkedForDelete,
}

/// Check that `name` can be used as a single path component.
pub fn validate_name(name: &str) -> Result<(), ImageError> {
    if name.is_empty() || name == "." || name == ".." {
        return Err(ImageError::InvalidName(format!("'{}' is not a valid entry name", name)));
    }
    if name.contains('/') || name.contains('\0') {
        return Err(ImageError::InvalidName(format!("'{}' contains '/' or NUL", name)));
    }
    if name.len() > MAX_NAME_LENGTH {
        return Err(ImageError::InvalidName(format!(
            "name is {} bytes, at most {} allowed",
            name.len(),
            MAX_NAME_LENGTH
        )));
    }
    Ok(())
}

/// One entry of the tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) kind: NodeKind,
    pub(crate) object_id: ObjectId,
    pub(crate) parent_object_id: ObjectId,
    pub(crate) name: String,
    pub(crate) mode: u32,
    pub(crate) uid: u32,
    pub(crate) gid: u32,
    pub(crate) atime: u32,
    pub(crate) mtime: u32,
    pub(crate) ctime: u32,
    pub(crate) header_position: Option<u64>,
    pub(crate) condition: Condition,
    pub(crate) has_descendant_marked_for_delete: bool,
    pub(crate) parent: Option<NodeHandle>,
    pub(crate) children: Vec<NodeHandle>,
}

impl Node {
    fn with_kind(kind: NodeKind, name: String, mode: u32, condition: Condition) -> Self {
        Self {
            kind,
            object_id: 0,
            parent_object_id: 0,
            name,
            mode,
            uid: 0,
            gid: 0,
            atime: 0,
            mtime: 0,
            ctime: 0,
            header_position: None,
            condition,
            has_descendant_marked_for_delete: false,
            parent: None,
            children: Vec::new(),
        }
    }

    /// A fresh root, as created for an empty image or synthesized on load.
    pub fn root() -> Self {
        let mut node = Self::with_kind(NodeKind::Root, "/".to_string(), S_IFDIR | 0o771, Condition::New);
        node.object_id = OBJECT_ID_ROOT;
        node.parent_object_id = OBJECT_ID_ROOT;
        node
    }

    pub fn directory(name: impl Into<String>, permissions: u32) -> Self {
        Self::with_kind(
            NodeKind::Directory,
            name.into(),
            S_IFDIR | (permissions & PERMISSION_MASK),
            Condition::New,
        )
    }

    /// A file imported from the host; its data is read at save time.
    pub fn host_file(name: impl Into<String>, source: &Path, size: u64, permissions: u32) -> Self {
        Self::with_kind(
            NodeKind::File {
                size,
                external_source: Some(source.to_path_buf()),
            },
            name.into(),
            S_IFREG | (permissions & PERMISSION_MASK),
            Condition::New,
        )
    }

    pub fn symlink(name: impl Into<String>, alias: impl Into<String>, permissions: u32) -> Self {
        Self::with_kind(
            NodeKind::SymLink {
                alias: alias.into(),
            },
            name.into(),
            S_IFLNK | (permissions & PERMISSION_MASK),
            Condition::New,
        )
    }

    /// Node for a decoded header. Unknown-type headers have no node.
    pub fn from_header(object_id: ObjectId, header: &ObjectHeader, position: u64) -> Option<Self> {
        let kind = if object_id == OBJECT_ID_ROOT {
            NodeKind::Root
        } else {
            match header.object_type {
                ObjectType::Unknown => return None,
                ObjectType::Directory => NodeKind::Directory,
                ObjectType::File => NodeKind::File {
                    size: header.file_size,
                    external_source: None,
                },
                ObjectType::SymLink => NodeKind::SymLink {
                    alias: header.alias.clone(),
                },
                ObjectType::HardLink => NodeKind::HardLink {
                    equivalent_id: header.equivalent_id,
                },
                ObjectType::Special => NodeKind::Special { rdev: header.rdev },
            }
        };
        let mut node = Self::with_kind(kind, String::new(), 0, Condition::Clean);
        node.object_id = object_id;
        node.header_position = Some(position);
        node.apply_header(header);
        Some(node)
    }

    /// Overwrite attributes from a (re)decoded header; tree links are kept.
    pub(crate) fn apply_header(&mut self, header: &ObjectHeader) {
        self.parent_object_id = header.parent_id;
        self.name = if self.is_root() {
            "/".to_string()
        } else {
            header.name.clone()
        };
        self.mode = header.mode;
        self.uid = header.uid;
        self.gid = header.gid;
        self.atime = header.atime;
        self.mtime = header.mtime;
        self.ctime = header.ctime;
        match &mut self.kind {
            NodeKind::File { size, .. } => *size = header.file_size,
            NodeKind::SymLink { alias } => alias.clone_from(&header.alias),
            NodeKind::HardLink { equivalent_id } => *equivalent_id = header.equivalent_id,
            NodeKind::Special { rdev } => *rdev = header.rdev,
            NodeKind::Root | NodeKind::Directory => {}
        }
    }

    /// Header describing this node as it would be written under `parent_id`.
    pub fn to_header(&self, parent_id: ObjectId) -> ObjectHeader {
        let mut header = ObjectHeader::new(self.object_type(), parent_id, self.name.clone());
        header.mode = self.mode;
        header.uid = self.uid;
        header.gid = self.gid;
        header.atime = self.atime;
        header.mtime = self.mtime;
        header.ctime = self.ctime;
        match &self.kind {
            NodeKind::File { size, .. } => header.file_size = *size,
            NodeKind::SymLink { alias } => header.alias.clone_from(alias),
            NodeKind::HardLink { equivalent_id } => header.equivalent_id = *equivalent_id,
            NodeKind::Special { rdev } => header.rdev = *rdev,
            NodeKind::Root | NodeKind::Directory => {}
        }
        header
    }

    pub fn kind(&self) -> &NodeKind {
        &self.kind
    }

    pub fn object_type(&self) -> ObjectType {
        match self.kind {
            NodeKind::Root | NodeKind::Directory => ObjectType::Directory,
            NodeKind::File { .. } => ObjectType::File,
            NodeKind::SymLink { .. } => ObjectType::SymLink,
            NodeKind::HardLink { .. } => ObjectType::HardLink,
            NodeKind::Special { .. } => ObjectType::Special,
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self.kind, NodeKind::Root)
    }

    /// Root or directory: anything that owns children.
    pub fn is_dir(&self) -> bool {
        matches!(self.kind, NodeKind::Root | NodeKind::Directory)
    }

    pub fn is_file(&self) -> bool {
        matches!(self.kind, NodeKind::File { .. })
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self.kind, NodeKind::SymLink { .. })
    }

    pub fn object_id(&self) -> ObjectId {
        self.object_id
    }

    pub fn parent_object_id(&self) -> ObjectId {
        self.parent_object_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn mode(&self) -> u32 {
        self.mode
    }

    pub fn permissions(&self) -> u32 {
        self.mode & PERMISSION_MASK
    }

    pub fn uid(&self) -> u32 {
        self.uid
    }

    pub fn gid(&self) -> u32 {
        self.gid
    }

    pub fn atime(&self) -> u32 {
        self.atime
    }

    pub fn mtime(&self) -> u32 {
        self.mtime
    }

    pub fn ctime(&self) -> u32 {
        self.ctime
    }

    /// File size; zero for everything that is not a file.
    pub fn file_size(&self) -> u64 {
        match self.kind {
            NodeKind::File { size, .. } => size,
            _ => 0,
        }
    }

    pub fn alias(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::SymLink { alias } => Some(alias),
            _ => None,
        }
    }

    pub fn equivalent_object_id(&self) -> Option<ObjectId> {
        match self.kind {
            NodeKind::HardLink { equivalent_id } => Some(equivalent_id),
            _ => None,
        }
    }

    pub fn external_source(&self) -> Option<&Path> {
        match &self.kind {
            NodeKind::File {
                external_source, ..
            } => external_source.as_deref(),
            _ => None,
        }
    }

    /// Offset of the header in the home image; `None` until loaded or saved.
    pub fn header_position(&self) -> Option<u64> {
        self.header_position
    }

    pub fn condition(&self) -> Condition {
        self.condition
    }

    pub fn is_marked_for_delete(&self) -> bool {
        self.condition == Condition::MarkedForDelete
    }

    pub fn has_descendant_marked_for_delete(&self) -> bool {
        self.has_descendant_marked_for_delete
    }

    pub fn parent(&self) -> Option<NodeHandle> {
        self.parent
    }

    pub fn children(&self) -> &[NodeHandle] {
        &self.children
    }

    /// Flip Clean to Dirty. Returns true when the node just became dirty.
    pub(crate) fn touch(&mut self) -> bool {
        if self.condition == Condition::Clean {
            self.condition = Condition::Dirty;
            true
        } else {
            false
        }
    }

    /// Keep the file type bits, replace the permission bits.
    pub(crate) fn set_permission_bits(&mut self, permissions: u32) {
        let type_bits = match self.mode & S_IFMT {
            0 => match self.object_type() {
                ObjectType::Directory => S_IFDIR,
                ObjectType::File => S_IFREG,
                ObjectType::SymLink => S_IFLNK,
                _ => 0,
            },
            bits => bits,
        };
        self.mode = type_bits | (permissions & PERMISSION_MASK);
    }
}
