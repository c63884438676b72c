//! Configuration, lifecycle states, and internal commands for the session.

use std::fmt;
use std::time::Duration;

use crate::error::SessionError;

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// How soon to reconnect after the connection drops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReconnectPolicy {
    /// Reconnect on the next scheduler tick, without limit.
    #[default]
    Immediate,
    /// Double the delay per consecutive failed attempt, capped at `max`.
    /// A successful connect resets the delay to `initial`.
    Backoff { initial: Duration, max: Duration },
}

impl ReconnectPolicy {
    /// Delay before attempt number `attempt` (1-based count of consecutive
    /// failures). `None` means yield and retry right away.
    pub fn delay(&self, attempt: u32) -> Option<Duration> {
        match *self {
            ReconnectPolicy::Immediate => None,
            ReconnectPolicy::Backoff { initial, max } => {
                let shift = attempt.saturating_sub(1).min(16);
                Some(initial.saturating_mul(1u32 << shift).min(max))
            }
        }
    }
}

/// Connection settings for one [`Session`](super::Session).
#[derive(Clone)]
pub struct SessionConfig {
    /// Base WebSocket URL, e.g. `wss://d1234.cloudfront.net/wss/`.
    pub endpoint: String,
    /// Query parameter that carries the identity token.
    pub token_param: String,
    pub reconnect: ReconnectPolicy,
    /// Limit on a single connect handshake. `None` waits indefinitely.
    pub connect_timeout: Option<Duration>,
    /// Client ping interval. `None` or zero disables client pings.
    pub keepalive_interval: Option<Duration>,
}

impl fmt::Debug for SessionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionConfig")
            .field("endpoint", &self.endpoint)
            .field("token_param", &self.token_param)
            .field("reconnect", &self.reconnect)
            .field("connect_timeout", &self.connect_timeout)
            .field("keepalive_interval", &self.keepalive_interval)
            .finish()
    }
}

impl SessionConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            token_param: "idToken".to_string(),
            reconnect: ReconnectPolicy::Immediate,
            connect_timeout: Some(Duration::from_secs(15)),
            keepalive_interval: None,
        }
    }

    pub fn with_token_param(mut self, param: impl Into<String>) -> Self {
        self.token_param = param.into();
        self
    }

    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, interval: Option<Duration>) -> Self {
        self.keepalive_interval = interval.filter(|every| !every.is_zero());
        self
    }

    /// The ping interval to run, if any.
    pub(crate) fn keepalive(&self) -> Option<Duration> {
        self.keepalive_interval.filter(|every| !every.is_zero())
    }

    /// Reject endpoints that are not `ws://` or `wss://` URLs.
    pub fn validate(&self) -> Result<(), SessionError> {
        let endpoint = self.endpoint.trim();
        let lower = endpoint.to_ascii_lowercase();
        let rest = if let Some(rest) = lower.strip_prefix("wss://") {
            rest
        } else if let Some(rest) = lower.strip_prefix("ws://") {
            rest
        } else {
            return Err(SessionError::Endpoint(format!(
                "expected a ws:// or wss:// URL, got '{endpoint}'"
            )));
        };
        if rest.is_empty() || rest.starts_with('/') {
            return Err(SessionError::Endpoint(format!(
                "missing host in '{endpoint}'"
            )));
        }
        if self.token_param.is_empty() {
            return Err(SessionError::Endpoint("token parameter name is empty".into()));
        }
        Ok(())
    }

    /// The endpoint with `token` appended as a query credential.
    pub fn connection_url(&self, token: &str) -> Result<String, SessionError> {
        self.validate()?;
        let endpoint = self.endpoint.trim();
        let separator = match endpoint.find('?') {
            None => "?",
            Some(_) if endpoint.ends_with('?') || endpoint.ends_with('&') => "",
            Some(_) => "&",
        };
        Ok(format!(
            "{endpoint}{separator}{}={}",
            urlencoding::encode(&self.token_param),
            urlencoding::encode(token)
        ))
    }

    /// The endpoint without any query string, safe for logs.
    pub(crate) fn display_endpoint(&self) -> &str {
        self.endpoint.split('?').next().unwrap_or("").trim()
    }
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Constructed and never opened.
    Idle,
    /// Fetching a token, handshaking, or waiting to reconnect.
    Connecting,
    /// A live connection accepts frames.
    Ready,
    /// Closed by the caller; never reconnects.
    Closed,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Connecting => "connecting",
            SessionState::Ready => "ready",
            SessionState::Closed => "closed",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned by [`Session::on_message`](super::Session::on_message) and
/// accepted by [`Session::remove_handler`](super::Session::remove_handler).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(pub(crate) u64);

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

/// Work handed from the public handle to the live connection.
#[derive(Debug)]
pub(crate) enum Outgoing {
    Frame(String),
    Close,
}
