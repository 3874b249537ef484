//! Environment variable source: YAFFSEDIT_* prefix with __ separator

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::Environment;

/// Prefix of configuration environment variables.
pub const ENV_PREFIX: &str = "YAFFSEDIT";

/// Add environment variable overlay to builder.
/// `YAFFSEDIT__GEOMETRY__PAGE_SIZE=4096` sets `geometry.page_size`.
pub fn add_to_builder(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    Ok(builder.add_source(
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true),
    ))
}
