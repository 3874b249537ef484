//! MergeService: orchestrates sources and deserializes to YaffsConfig.

use crate::config::sources::environment;
use crate::config::YaffsConfig;
use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, File, FileFormat};
use std::path::Path;

/// Merge service for config composition.
pub struct MergeService;

impl MergeService {
    /// Precedence: defaults (lowest) -> config file -> environment (highest).
    pub fn load(file: Option<&Path>) -> Result<YaffsConfig, ConfigError> {
        let mut builder = Self::builder_with_defaults()?;
        if let Some(path) = file {
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }
        let builder = environment::add_to_builder(builder)?;
        builder.build()?.try_deserialize()
    }

    fn builder_with_defaults() -> Result<ConfigBuilder<DefaultState>, ConfigError> {
        let defaults = Config::try_from(&YaffsConfig::default())?;
        Ok(Config::builder().add_source(defaults))
    }
}
