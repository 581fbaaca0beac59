//! Global config file source: $XDG_CONFIG_HOME/docpace/config.toml (~/.config/docpace on Linux)

use config::builder::DefaultState;
use config::ConfigBuilder;
use config::ConfigError;
use config::File;
use directories::BaseDirs;
use std::path::PathBuf;
use tracing::debug;

/// Path to the global config file, if a home directory can be resolved.
pub fn global_config_path() -> Option<PathBuf> {
    BaseDirs::new().map(|dirs| dirs.config_dir().join("docpace").join("config.toml"))
}

/// Add the global config file to the builder when it exists.
pub fn add_to_builder(
    mut builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let Some(path) = global_config_path() else {
        return Ok(builder);
    };
    if path.exists() {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.clone());
        builder = builder.add_source(File::from(canonical).required(false));
    } else {
        debug!(
            config_path = %path.display(),
            "No global configuration file; using defaults"
        );
    }
    Ok(builder)
}
