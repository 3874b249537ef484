//! Error types for image loading, editing and saving.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors surfaced by the image engine and its collaborators.
#[derive(Debug, Error)]
pub enum ImageError {
    /// A host file or the image itself could not be read or written.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// I/O failure on an anonymous stream (writer or reader without a path).
    #[error("I/O error: {0}")]
    Stream(#[from] std::io::Error),

    #[error("corrupt object header at offset {offset}: {reason}")]
    CorruptHeader { offset: u64, reason: String },

    /// Dangling parent or equivalent-object reference.
    #[error("unresolved reference: {0}")]
    Reference(String),

    #[error("an entry named '{name}' already exists in {parent}")]
    DuplicateName { parent: String, name: String },

    #[error("cannot save over the currently open image: {}", .0.display())]
    AlreadyOpenAsTarget(PathBuf),

    #[error("no image is open")]
    NoImageOpen,

    #[error("image {} contains no objects", .0.display())]
    EmptyImage(PathBuf),

    /// Save walk finished with per-object failures; the target was not replaced.
    #[error("save failed: {0} object(s) could not be written")]
    SaveFailed(usize),

    #[error("node not found in the open tree")]
    NodeNotFound,

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("invalid attribute: {0}")]
    InvalidAttribute(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl ImageError {
    /// Wrap an `io::Error` with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        ImageError::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub(crate) fn corrupt(offset: u64, reason: impl Into<String>) -> Self {
        ImageError::CorruptHeader {
            offset,
            reason: reason.into(),
        }
    }
}

impl From<config::ConfigError> for ImageError {
    fn from(err: config::ConfigError) -> Self {
        ImageError::ConfigError(err.to_string())
    }
}
