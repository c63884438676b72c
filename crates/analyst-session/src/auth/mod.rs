//! Identity token providers.
//!
//! The session asks its provider for a fresh ID token before every
//! connection attempt. `Ok(None)` means there is no authenticated session;
//! the session treats that like any other failed attempt.

mod cognito;

use async_trait::async_trait;

use crate::error::AuthError;

pub use cognito::{CognitoConfig, CognitoTokenProvider};

#[async_trait]
pub trait TokenProvider: Send + Sync {
    /// The current ID token, or `None` when no session is active.
    async fn id_token(&self) -> Result<Option<String>, AuthError>;
}

/// Always returns the same token.
#[derive(Clone)]
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
        }
    }
}

impl std::fmt::Debug for StaticTokenProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StaticTokenProvider")
            .field("token", &"[REDACTED]")
            .finish()
    }
}

#[async_trait]
impl TokenProvider for StaticTokenProvider {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        Ok(Some(self.token.clone()))
    }
}

/// Reads the token from an environment variable on every fetch, so an
/// external process can rotate it.
#[derive(Debug, Clone)]
pub struct EnvTokenProvider {
    var: String,
}

impl EnvTokenProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self { var: var.into() }
    }

    pub fn var(&self) -> &str {
        &self.var
    }
}

#[async_trait]
impl TokenProvider for EnvTokenProvider {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        Ok(std::env::var(&self.var)
            .ok()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty()))
    }
}
