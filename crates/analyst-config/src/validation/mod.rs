//! Configuration validation.
//!
//! Each check pushes a message; all failures are joined into a single
//! `ConfigError::ValidationError`.


use crate::schema::{AnalystConfig, ReconnectMode};
use analyst_common::ConfigError;

/// Run all validations on a config, collecting all errors.
pub fn validate(config: &AnalystConfig) -> Result<(), ConfigError> {
    let mut errors: Vec<String> = Vec::new();

    validate_deployment(&mut errors, config);
    validate_session(&mut errors, config);

    if errors.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(errors.join("; ")))
    }
}

/// Accept only `ws://` and `wss://` endpoints.
pub fn validate_websocket_endpoint(endpoint: &str) -> Result<(), ConfigError> {
    if endpoint.starts_with("wss://") || endpoint.starts_with("ws://") {
        Ok(())
    } else {
        Err(ConfigError::ValidationError(format!(
            "websocket endpoint must start with ws:// or wss://, got {endpoint:?}"
        )))
    }
}

fn validate_deployment(errors: &mut Vec<String>, config: &AnalystConfig) {
    let endpoint = config.deployment.websocket_endpoint.trim();
    if !endpoint.is_empty() {
        if let Err(e) = validate_websocket_endpoint(endpoint) {
            errors.push(format!("deployment.websocket_endpoint: {e}"));
        }
    }
}

fn validate_session(errors: &mut Vec<String>, config: &AnalystConfig) {
    let session = &config.session;

    if session.token_param.trim().is_empty() {
        errors.push("session.token_param must not be empty".into());
    }
    if session.request_timeout_secs == 0 {
        errors.push("session.request_timeout_secs must be greater than 0".into());
    }
    if session.reconnect == ReconnectMode::Backoff {
        if session.reconnect_initial_ms == 0 {
            errors.push("session.reconnect_initial_ms must be greater than 0".into());
        }
        if session.reconnect_initial_ms > session.reconnect_max_ms {
            errors.push(format!(
                "session.reconnect_initial_ms = {} exceeds session.reconnect_max_ms = {}",
                session.reconnect_initial_ms, session.reconnect_max_ms
            ));
        }
    }
}
