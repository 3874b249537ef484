//! Export of selected nodes to a host directory.

use crate::codec::SourceImage;
use crate::error::ImageError;
use crate::tree::{validate_name, NodeHandle, NodeKind, Tree};
use crate::types::ImageGeometry;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::{debug, info, warn};

/// Default number of failure paths kept per category.
pub const DEFAULT_FAILURE_CAP: usize = 10;

/// Outcome for one selected node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportedItem {
    pub path: String,
    pub success: bool,
}

/// Failure paths, capped, with the uncapped total.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureList {
    pub paths: Vec<String>,
    pub total: usize,
}

impl FailureList {
    fn push(&mut self, path: String, cap: usize) {
        if self.paths.len() < cap {
            self.paths.push(path);
        }
        self.total += 1;
    }

    /// Failures beyond the cap.
    pub fn omitted(&self) -> usize {
        self.total - self.paths.len()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportSummary {
    pub items: Vec<ExportedItem>,
    pub files_exported: usize,
    pub directories_exported: usize,
    /// Symlinks, hard links and specials encountered and not exported.
    pub skipped: usize,
    pub failed_files: FailureList,
    pub failed_directories: FailureList,
}

impl ExportSummary {
    pub fn failures(&self) -> usize {
        self.failed_files.total + self.failed_directories.total
    }
}

struct Exporter<'a> {
    tree: &'a Tree,
    source: Option<SourceImage>,
    failure_cap: usize,
    summary: ExportSummary,
}

/// Copy `selection` out of the tree into `dest`.
///
/// Directories are recreated recursively. File data comes from the host file
/// of a not-yet-saved import, otherwise from `source_image`. Selected nodes
/// below another selected node are exported once, through that ancestor.
pub fn export_selection(
    tree: &Tree,
    source_image: Option<&Path>,
    selection: &[NodeHandle],
    dest: &Path,
    geometry: ImageGeometry,
    failure_cap: usize,
) -> Result<ExportSummary, ImageError> {
    fs::create_dir_all(dest).map_err(|e| ImageError::io(dest, e))?;

    let mut exporter = Exporter {
        tree,
        source: source_image.map(|p| SourceImage::new(p, geometry)),
        failure_cap,
        summary: ExportSummary::default(),
    };

    for &handle in selection {
        if selection
            .iter()
            .any(|&other| other != handle && tree.is_ancestor(other, handle))
        {
            debug!("Selected node covered by a selected ancestor");
            continue;
        }
        let failures_before = exporter.summary.failures();
        let exported = if tree.node(handle)?.is_root() {
            exporter.export_children(handle, dest);
            true
        } else {
            exporter.export_node(handle, dest)
        };
        let success = exported && exporter.summary.failures() == failures_before;
        exporter.summary.items.push(ExportedItem {
            path: tree.full_path(handle)?,
            success,
        });
    }

    let summary = exporter.summary;
    info!(
        dest = %dest.display(),
        files = summary.files_exported,
        directories = summary.directories_exported,
        failures = summary.failures(),
        "Exported selection"
    );
    Ok(summary)
}

impl Exporter<'_> {
    fn export_children(&mut self, dir: NodeHandle, host_dir: &Path) {
        let tree = self.tree;
        if let Some(node) = tree.get(dir) {
            for &child in node.children() {
                self.export_node(child, host_dir);
            }
        }
    }

    /// Export one node. Returns false when it was skipped or failed.
    fn export_node(&mut self, handle: NodeHandle, host_dir: &Path) -> bool {
        let tree = self.tree;
        let Some(node) = tree.get(handle) else {
            return false;
        };
        let host_path = host_dir.join(node.name());

        match node.kind() {
            NodeKind::Root | NodeKind::Directory => {
                let created = validate_name(node.name()).and_then(|_| {
                    fs::create_dir_all(&host_path).map_err(|e| ImageError::io(&host_path, e))
                });
                match created {
                    Ok(()) => {
                        self.summary.directories_exported += 1;
                        self.export_children(handle, &host_path);
                        true
                    }
                    Err(e) => {
                        let path = tree.full_path(handle).unwrap_or_default();
                        warn!(path = %path, error = %e, "Failed to export directory");
                        self.summary.failed_directories.push(path, self.failure_cap);
                        false
                    }
                }
            }
            NodeKind::File { .. } => match self.write_file(handle, &host_path) {
                Ok(()) => {
                    self.summary.files_exported += 1;
                    true
                }
                Err(e) => {
                    let path = tree.full_path(handle).unwrap_or_default();
                    warn!(path = %path, error = %e, "Failed to export file");
                    self.summary.failed_files.push(path, self.failure_cap);
                    false
                }
            },
            NodeKind::SymLink { .. } | NodeKind::HardLink { .. } | NodeKind::Special { .. } => {
                debug!(name = node.name(), "Skipping non-regular entry");
                self.summary.skipped += 1;
                false
            }
        }
    }

    fn write_file(&mut self, handle: NodeHandle, host_path: &Path) -> Result<(), ImageError> {
        let tree = self.tree;
        let node = tree.node(handle)?;
        validate_name(node.name())?;
        let data = match (node.external_source(), node.header_position()) {
            (Some(host_source), _) => {
                fs::read(host_source).map_err(|e| ImageError::io(host_source, e))?
            }
            (None, Some(position)) => self
                .source
                .as_mut()
                .ok_or(ImageError::NoImageOpen)?
                .extract_file(position)?,
            (None, None) => {
                return Err(ImageError::Reference(format!(
                    "file '{}' has no data source",
                    node.name()
                )))
            }
        };
        fs::write(host_path, data).map_err(|e| ImageError::io(host_path, e))
    }
}
