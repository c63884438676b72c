//! Session connection settings.

use serde::{Deserialize, Serialize};

/// How the session reschedules a connection after an unsolicited close.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ReconnectMode {
    /// Reconnect on the next scheduler tick, without limit.
    #[default]
    Immediate,
    /// Exponential backoff between `reconnect_initial_ms` and `reconnect_max_ms`.
    Backoff,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSettings {
    /// Query parameter that carries the identity token.
    pub token_param: String,
    pub reconnect: ReconnectMode,
    pub reconnect_initial_ms: u64,
    pub reconnect_max_ms: u64,
    /// 0 disables the connect timeout.
    pub connect_timeout_secs: u64,
    /// 0 disables client pings.
    pub keepalive_secs: u64,
    /// How long a CLI request waits for its final response.
    pub request_timeout_secs: u64,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            token_param: "idToken".into(),
            reconnect: ReconnectMode::Immediate,
            reconnect_initial_ms: 500,
            reconnect_max_ms: 30_000,
            connect_timeout_secs: 15,
            keepalive_secs: 0,
            request_timeout_secs: 300,
        }
    }
}
