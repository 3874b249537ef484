//! ConfigLoader facade delegating to merge service.

use super::merge::service::MergeService;
use super::YaffsConfig;
use crate::error::ImageError;
use std::path::Path;

/// Configuration loader facade.
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration: defaults, then `file` if given, then environment.
    pub fn load(file: Option<&Path>) -> Result<YaffsConfig, ImageError> {
        Ok(MergeService::load(file)?)
    }

    /// Built-in defaults only.
    pub fn default() -> YaffsConfig {
        YaffsConfig::default()
    }
}
