//! Analyst client configuration.
//!
//! Provides the TOML client config (session, auth, logging sections), the
//! loader for the deployed `aws-exports.json` artifact that carries the
//! WebSocket endpoint, and validation. All config sections use defaults
//! so partial configs work out of the box.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use analyst_config::{load_config, resolve_websocket_endpoint, ConfigOverrides};
//!
//! let config = load_config(None, &ConfigOverrides::default()).expect("failed to load config");
//! let endpoint = resolve_websocket_endpoint(&config).expect("no endpoint configured");
//! println!("{endpoint}");
//! ```

pub mod deployed;
pub mod schema;
pub mod toml_loader;
pub mod validation;

pub use deployed::{load_deployed, DeployedConfig};
pub use schema::{
    AnalystConfig, AuthConfig, DeploymentConfig, LogLevel, LoggingConfig, ReconnectMode,
    SessionSettings, CONFIG_SCHEMA_VERSION,
};

use std::path::{Path, PathBuf};

use analyst_common::ConfigError;

/// Values supplied on the command line that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub exports_path: Option<PathBuf>,
    pub websocket_endpoint: Option<String>,
}

impl ConfigOverrides {
    pub fn apply(&self, config: &mut AnalystConfig) {
        if let Some(path) = &self.exports_path {
            config.deployment.exports_path = Some(path.clone());
        }
        if let Some(endpoint) = &self.websocket_endpoint {
            config.deployment.websocket_endpoint = endpoint.clone();
        }
    }
}

/// Load config from `path` (or the default location), apply `overrides`,
/// and validate the result.
///
/// Creates a commented default `config.toml` when loading from the default
/// location and none exists.
pub fn load_config(
    path: Option<&Path>,
    overrides: &ConfigOverrides,
) -> Result<AnalystConfig, ConfigError> {
    let mut config = match path {
        Some(path) => toml_loader::load_from_path(path)?,
        None => toml_loader::load_default()?,
    };
    overrides.apply(&mut config);
    validation::validate(&config)?;
    Ok(config)
}

/// Resolve the WebSocket endpoint the session should connect to.
///
/// An explicit `deployment.websocket_endpoint` wins; otherwise the endpoint
/// is read from the deployed exports file at `deployment.exports_path`.
pub fn resolve_websocket_endpoint(config: &AnalystConfig) -> Result<String, ConfigError> {
    let explicit = config.deployment.websocket_endpoint.trim();
    if !explicit.is_empty() {
        return Ok(explicit.to_string());
    }

    match config.deployment.exports_path.as_deref() {
        Some(path) => {
            let deployed = load_deployed(path)?;
            deployed
                .websocket_endpoint()
                .map(str::to_string)
                .ok_or_else(|| {
                    ConfigError::ValidationError(format!(
                        "{} has no API.REST.WebSocketApi.endpoint",
                        path.display()
                    ))
                })
        }
        None => Err(ConfigError::ValidationError(
            "no websocket endpoint: set deployment.websocket_endpoint or deployment.exports_path"
                .into(),
        )),
    }
}

/// Serialize a config to a pretty-printed JSON string.
pub fn config_to_json(config: &AnalystConfig) -> String {
    serde_json::to_string_pretty(config)
        .unwrap_or_else(|e| format!("{{\"error\": \"failed to serialize config: {e}\"}}"))
}
