use serde::{Deserialize, Serialize};

/// Identity provider settings.
///
/// Secrets never live in the file; only the names of the environment
/// variables that hold them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// User pool username for password authentication.
    pub username: String,
    /// Environment variable holding the user pool password.
    pub password_env: String,
    /// Environment variable holding a ready-made ID token.
    pub token_env: String,
    /// Overrides the region from the deployed exports.
    pub region: String,
    /// Overrides `Auth.Cognito.userPoolClientId` from the deployed exports.
    pub client_id: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            username: String::new(),
            password_env: "ANALYST_PASSWORD".into(),
            token_env: "ANALYST_ID_TOKEN".into(),
            region: String::new(),
            client_id: String::new(),
        }
    }
}
