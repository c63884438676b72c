//! Core TOML config loading: read from path or platform default.

use crate::schema::AnalystConfig;
use crate::validation;
use analyst_common::ConfigError;
use std::path::Path;
use tracing::{info, warn};

use super::paths::{create_default_config, default_config_path};

/// Load config from a specific TOML file path.
///
/// Missing fields take their serde defaults. A config that fails
/// validation is logged and returned as parsed.
pub fn load_from_path(path: &Path) -> Result<AnalystConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.to_path_buf())
        } else {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        }
    })?;

    let config: AnalystConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::ParseError(format!("failed to parse TOML: {e}")))?;

    if let Err(e) = validation::validate(&config) {
        warn!("config validation warning: {e}");
    }

    info!("loaded config from {}", path.display());
    Ok(config)
}

/// Load config from `$ANALYST_CONFIG`, or else the platform-specific
/// default path.
///
/// On Linux: `~/.config/analyst/config.toml`
/// On macOS: `~/Library/Application Support/analyst/config.toml`
///
/// If the file does not exist, writes the default template and returns defaults.
pub fn load_default() -> Result<AnalystConfig, ConfigError> {
    let path = default_config_path()?;

    match load_from_path(&path) {
        Ok(config) => Ok(config),
        Err(ConfigError::FileNotFound(_)) => {
            info!("no config found at {}, creating default", path.display());
            create_default_config(&path)?;
            Ok(AnalystConfig::default())
        }
        Err(e) => Err(e),
    }
}
