//! Where the client config lives, and writing the first-run template.

use std::ffi::OsString;
use std::path::{Path, PathBuf};

use analyst_common::ConfigError;
use tracing::info;

use super::template::default_config_toml;

/// Environment variable naming a config file to use instead of the
/// platform default.
pub const CONFIG_PATH_ENV: &str = "ANALYST_CONFIG";

/// `$ANALYST_CONFIG` if set, else `<config_dir>/analyst/config.toml`.
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    resolve_config_path(std::env::var_os(CONFIG_PATH_ENV), dirs::config_dir())
}

pub(crate) fn resolve_config_path(
    explicit: Option<OsString>,
    config_dir: Option<PathBuf>,
) -> Result<PathBuf, ConfigError> {
    if let Some(path) = explicit.filter(|p| !p.is_empty()) {
        return Ok(PathBuf::from(path));
    }
    config_dir
        .map(|dir| dir.join("analyst").join("config.toml"))
        .ok_or_else(|| {
            ConfigError::ParseError(format!(
                "no platform config directory; set {CONFIG_PATH_ENV}"
            ))
        })
}

/// Write the commented template to `path`, creating parent directories.
pub fn create_default_config(path: &Path) -> Result<(), ConfigError> {
    let write_failed = |what: &str, target: &Path, e: std::io::Error| {
        ConfigError::ParseError(format!("failed to {what} {}: {e}", target.display()))
    };

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| write_failed("create config directory", parent, e))?;
    }
    std::fs::write(path, default_config_toml())
        .map_err(|e| write_failed("write default config to", path, e))?;

    info!(path = %path.display(), "Created default config");
    Ok(())
}
