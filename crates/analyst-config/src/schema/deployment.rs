use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Where the deployed endpoint comes from.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeploymentConfig {
    /// Path to the deployed `aws-exports.json`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exports_path: Option<PathBuf>,
    /// Explicit WebSocket endpoint; overrides the exports file when set.
    pub websocket_endpoint: String,
}
