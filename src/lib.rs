//! yaffsedit: YAFFS2 image editing
//!
//! Reads a YAFFS2 flash image into an in-memory tree, applies edits (import,
//! create, rename, attribute changes, deletion) and writes a fresh image.
//! Files can also be exported from an image to the host filesystem.

pub mod codec;
pub mod concurrency;
pub mod config;
pub mod engine;
pub mod error;
pub mod export;
pub mod logging;
pub mod persist;
pub mod tooling;
pub mod tree;
pub mod types;

pub use engine::{Engine, EngineConfig, PendingChanges};
pub use error::ImageError;
