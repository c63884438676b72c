//! Loader for the deployed `aws-exports.json` artifact.
//!
//! The deployment writes a small JSON document next to the web app that
//! names the region, the user pool client, and the REST/WebSocket API
//! endpoints. Only the parts the client needs are modelled; unknown keys
//! are ignored.

use std::path::Path;

use analyst_common::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::info;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployedConfig {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "Auth", default)]
    pub auth: Option<DeployedAuth>,
    #[serde(rename = "API", default)]
    pub api: Option<DeployedApi>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployedAuth {
    #[serde(rename = "Cognito", default)]
    pub cognito: Option<CognitoExports>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CognitoExports {
    #[serde(default)]
    pub user_pool_client_id: String,
    #[serde(default)]
    pub user_pool_id: String,
    #[serde(default)]
    pub identity_pool_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeployedApi {
    #[serde(rename = "REST", default)]
    pub rest: Option<RestApis>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RestApis {
    #[serde(rename = "WebSocketApi", default)]
    pub websocket_api: Option<ApiEndpoint>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ApiEndpoint {
    pub endpoint: String,
}

impl DeployedConfig {
    pub fn from_json_str(text: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(text)
            .map_err(|e| ConfigError::ParseError(format!("failed to parse exports JSON: {e}")))
    }

    /// `API.REST.WebSocketApi.endpoint`, if present and non-empty.
    pub fn websocket_endpoint(&self) -> Option<&str> {
        self.rest_apis()
            .and_then(|r| r.websocket_api.as_ref())
            .map(|e| e.endpoint.as_str())
            .filter(|e| !e.is_empty())
    }

    pub fn cognito(&self) -> Option<&CognitoExports> {
        self.auth.as_ref().and_then(|a| a.cognito.as_ref())
    }

    /// Region, falling back to the prefix of the user pool id
    /// (`us-east-1_AbCdEf` → `us-east-1`).
    pub fn region(&self) -> Option<&str> {
        if let Some(region) = self.region.as_deref().filter(|r| !r.is_empty()) {
            return Some(region);
        }
        self.cognito()
            .and_then(|c| c.user_pool_id.split_once('_'))
            .map(|(region, _)| region)
            .filter(|r| !r.is_empty())
    }

    fn rest_apis(&self) -> Option<&RestApis> {
        self.api.as_ref().and_then(|a| a.rest.as_ref())
    }
}

/// Read and parse a deployed exports file.
pub fn load_deployed(path: &Path) -> Result<DeployedConfig, ConfigError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            ConfigError::FileNotFound(path.to_path_buf())
        } else {
            ConfigError::ParseError(format!("failed to read {}: {e}", path.display()))
        }
    })?;

    let deployed = DeployedConfig::from_json_str(&content)?;
    info!("loaded deployed exports from {}", path.display());
    Ok(deployed)
}

#[cfg(test)]
mod tests {
    use super::*;

    const EXPORTS: &str = r#"{
        "region": "us-west-2",
        "Auth": {
            "Cognito": {
                "userPoolClientId": "3abc",
                "userPoolId": "us-west-2_Pool1",
                "identityPoolId": "us-west-2:1234"
            }
        },
        "API": {
            "REST": {
                "RestApi": { "endpoint": "https://d111.cloudfront.net/api/v1" },
                "WebSocketApi": { "endpoint": "wss://d111.cloudfront.net/wss/" }
            }
        }
    }"#;

    #[test]
    fn parses_full_exports() {
        let deployed = DeployedConfig::from_json_str(EXPORTS).unwrap();
        assert_eq!(
            deployed.websocket_endpoint(),
            Some("wss://d111.cloudfront.net/wss/")
        );
        assert_eq!(deployed.region(), Some("us-west-2"));
        let cognito = deployed.cognito().unwrap();
        assert_eq!(cognito.user_pool_client_id, "3abc");
        assert_eq!(cognito.identity_pool_id.as_deref(), Some("us-west-2:1234"));
    }

    #[test]
    fn region_falls_back_to_user_pool_prefix() {
        let deployed = DeployedConfig::from_json_str(
            r#"{"Auth": {"Cognito": {"userPoolClientId": "x", "userPoolId": "eu-central-1_Zz"}}}"#,
        )
        .unwrap();
        assert_eq!(deployed.region(), Some("eu-central-1"));
    }

    #[test]
    fn empty_document_has_no_endpoints() {
        let deployed = DeployedConfig::from_json_str("{}").unwrap();
        assert!(deployed.websocket_endpoint().is_none());
        assert!(deployed.region().is_none());
    }

    #[test]
    fn empty_endpoint_string_counts_as_missing() {
        let deployed = DeployedConfig::from_json_str(
            r#"{"API": {"REST": {"WebSocketApi": {"endpoint": ""}}}}"#,
        )
        .unwrap();
        assert!(deployed.websocket_endpoint().is_none());
    }

    #[test]
    fn invalid_json_is_parse_error() {
        let err = DeployedConfig::from_json_str("not json").unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_)));
    }

    #[test]
    fn missing_file_is_file_not_found() {
        let err = load_deployed(Path::new("/tmp/nonexistent_analyst_exports.json")).unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound(_)));
    }
}
