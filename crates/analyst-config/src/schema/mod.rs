//! Configuration schema types for the analyst client.
//!
//! All structs use `serde(default)` so partial configs work correctly.

mod auth;
mod deployment;
mod logging;
mod session;

pub use auth::*;
pub use deployment::*;
pub use logging::*;
pub use session::*;

use serde::{Deserialize, Serialize};

/// Current config schema version.
pub const CONFIG_SCHEMA_VERSION: u32 = 1;

/// Root configuration for the analyst client.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalystConfig {
    pub deployment: DeploymentConfig,
    pub session: SessionSettings,
    pub auth: AuthConfig,
    pub logging: LoggingConfig,
}
