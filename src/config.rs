//! Configuration
//!
//! `YaffsConfig` is assembled from built-in defaults, an optional TOML file and
//! `YAFFSEDIT__*` environment variables (see [`ConfigLoader`]). The library core
//! never reads configuration itself; callers turn a `YaffsConfig` into an
//! [`EngineConfig`](crate::engine::EngineConfig).

pub mod facade;
pub mod merge;
pub mod sources;

pub use facade::ConfigLoader;

use crate::engine::EngineConfig;
use crate::error::ImageError;
use crate::export::DEFAULT_FAILURE_CAP;
use crate::logging::LoggingConfig;
use crate::types::ImageGeometry;
use serde::{Deserialize, Serialize};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct YaffsConfig {
    #[serde(default)]
    pub geometry: GeometryConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl YaffsConfig {
    /// Validate and convert into the value the engine consumes.
    pub fn engine_config(&self) -> Result<EngineConfig, ImageError> {
        Ok(EngineConfig {
            geometry: self.geometry.to_geometry()?,
            export_failure_cap: self.export.failure_cap,
        })
    }
}

/// Page geometry of the images being edited.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeometryConfig {
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    #[serde(default = "default_spare_size")]
    pub spare_size: usize,
    #[serde(default = "default_pages_per_block")]
    pub pages_per_block: usize,
}

fn default_page_size() -> usize {
    2048
}

fn default_spare_size() -> usize {
    64
}

fn default_pages_per_block() -> usize {
    64
}

impl Default for GeometryConfig {
    fn default() -> Self {
        Self {
            page_size: default_page_size(),
            spare_size: default_spare_size(),
            pages_per_block: default_pages_per_block(),
        }
    }
}

impl GeometryConfig {
    pub fn to_geometry(&self) -> Result<ImageGeometry, ImageError> {
        ImageGeometry::new(self.page_size, self.spare_size, self.pages_per_block)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Failure paths listed per category before the rest is summarized.
    #[serde(default = "default_failure_cap")]
    pub failure_cap: usize,
}

fn default_failure_cap() -> usize {
    DEFAULT_FAILURE_CAP
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            failure_cap: default_failure_cap(),
        }
    }
}
