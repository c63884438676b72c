//! User pool password authentication over the `InitiateAuth` JSON API.
//!
//! Tokens are cached; a token within [`EXPIRY_SKEW`] of expiring is
//! refreshed with the refresh token, falling back to a fresh password
//! login if the refresh is rejected.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::TokenProvider;
use crate::error::AuthError;

const INITIATE_AUTH_TARGET: &str = "AWSCognitoIdentityProviderService.InitiateAuth";
const AMZ_JSON: &str = "application/x-amz-json-1.1";
const EXPIRY_SKEW: Duration = Duration::from_secs(60);
/// Lifetime assumed when the provider omits `ExpiresIn`.
const DEFAULT_EXPIRES_IN: u64 = 3600;

#[derive(Clone)]
pub struct CognitoConfig {
    pub region: String,
    /// User pool app client id (`Auth.Cognito.userPoolClientId`).
    pub client_id: String,
    pub username: String,
    pub password: String,
    /// Overrides `https://cognito-idp.<region>.amazonaws.com/`.
    pub endpoint: Option<String>,
}

impl std::fmt::Debug for CognitoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CognitoConfig")
            .field("region", &self.region)
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("endpoint", &self.endpoint)
            .finish()
    }
}

impl CognitoConfig {
    pub(crate) fn endpoint_url(&self) -> String {
        match &self.endpoint {
            Some(url) => url.clone(),
            None => format!("https://cognito-idp.{}.amazonaws.com/", self.region),
        }
    }
}

struct CachedTokens {
    id_token: String,
    refresh_token: Option<String>,
    expires_at: Instant,
}

impl CachedTokens {
    fn is_fresh(&self) -> bool {
        Instant::now() + EXPIRY_SKEW < self.expires_at
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InitiateAuthResponse {
    authentication_result: Option<AuthenticationResult>,
    challenge_name: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct AuthenticationResult {
    id_token: Option<String>,
    refresh_token: Option<String>,
    expires_in: Option<u64>,
}

/// A successful sign-in or refresh.
#[derive(Debug)]
struct IssuedTokens {
    id_token: String,
    refresh_token: Option<String>,
    expires_in: Duration,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    #[serde(rename = "__type", default)]
    kind: String,
    #[serde(alias = "Message", default)]
    message: String,
}

pub struct CognitoTokenProvider {
    config: CognitoConfig,
    http: reqwest::Client,
    cache: Mutex<Option<CachedTokens>>,
}

impl CognitoTokenProvider {
    pub fn new(config: CognitoConfig) -> Result<Self, AuthError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| AuthError::Network(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            config,
            http,
            cache: Mutex::new(None),
        })
    }

    fn password_body(&self) -> serde_json::Value {
        serde_json::json!({
            "AuthFlow": "USER_PASSWORD_AUTH",
            "ClientId": self.config.client_id,
            "AuthParameters": {
                "USERNAME": self.config.username,
                "PASSWORD": self.config.password,
            }
        })
    }

    fn refresh_body(&self, refresh_token: &str) -> serde_json::Value {
        serde_json::json!({
            "AuthFlow": "REFRESH_TOKEN_AUTH",
            "ClientId": self.config.client_id,
            "AuthParameters": {
                "REFRESH_TOKEN": refresh_token,
            }
        })
    }

    async fn initiate_auth(&self, body: serde_json::Value) -> Result<IssuedTokens, AuthError> {
        let response = self
            .http
            .post(self.config.endpoint_url())
            .header("X-Amz-Target", INITIATE_AUTH_TARGET)
            .header("Content-Type", AMZ_JSON)
            .body(body.to_string())
            .send()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| AuthError::Network(e.to_string()))?;

        parse_initiate_auth(status.as_u16(), &text)
    }
}

/// Turn an `InitiateAuth` HTTP response into issued tokens.
fn parse_initiate_auth(status: u16, text: &str) -> Result<IssuedTokens, AuthError> {
    if !(200..300).contains(&status) {
        let detail = match serde_json::from_str::<ErrorResponse>(text) {
            Ok(err) if !err.kind.is_empty() => {
                let kind = err.kind.rsplit('#').next().unwrap_or(&err.kind);
                format!("{kind}: {}", err.message)
            }
            _ => text.chars().take(200).collect(),
        };
        return Err(AuthError::Provider(format!("HTTP {status}: {detail}")));
    }

    let parsed: InitiateAuthResponse =
        serde_json::from_str(text).map_err(|e| AuthError::Provider(format!("bad response: {e}")))?;

    if let Some(challenge) = parsed.challenge_name {
        return Err(AuthError::Challenge(challenge));
    }

    let result = parsed
        .authentication_result
        .ok_or_else(|| AuthError::Provider("response carried no authentication result".into()))?;
    let id_token = result
        .id_token
        .ok_or_else(|| AuthError::Provider("response carried no ID token".into()))?;
    Ok(IssuedTokens {
        id_token,
        refresh_token: result.refresh_token,
        expires_in: Duration::from_secs(result.expires_in.unwrap_or(DEFAULT_EXPIRES_IN)),
    })
}

#[async_trait]
impl TokenProvider for CognitoTokenProvider {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        let mut cache = self.cache.lock().await;

        if let Some(cached) = cache.as_ref() {
            if cached.is_fresh() {
                return Ok(Some(cached.id_token.clone()));
            }
        }

        let refresh_token = cache.as_ref().and_then(|c| c.refresh_token.clone());
        let mut result = None;
        if let Some(refresh) = refresh_token.as_deref() {
            debug!("refreshing identity token");
            match self.initiate_auth(self.refresh_body(refresh)).await {
                Ok(r) => result = Some(r),
                Err(e) => warn!(error = %e, "token refresh failed, signing in again"),
            }
        }

        let issued = match result {
            Some(r) => r,
            None => {
                let r = self.initiate_auth(self.password_body()).await?;
                info!(username = %self.config.username, "signed in to user pool");
                r
            }
        };

        *cache = Some(CachedTokens {
            id_token: issued.id_token.clone(),
            // Refresh responses do not repeat the refresh token.
            refresh_token: issued.refresh_token.or(refresh_token),
            expires_at: Instant::now() + issued.expires_in,
        });
        Ok(Some(issued.id_token))
    }
}
