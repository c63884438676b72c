/// Failures while obtaining an identity token.
#[derive(Debug, Clone, thiserror::Error)]
pub enum AuthError {
    #[error("no active authenticated session")]
    NoSession,
    #[error("identity provider error: {0}")]
    Provider(String),
    #[error("authentication challenge required: {0}")]
    Challenge(String),
    #[error("network error: {0}")]
    Network(String),
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("invalid endpoint: {0}")]
    Endpoint(String),
    #[error("session is not ready")]
    NotReady,
    #[error("timed out")]
    Timeout,
    #[error("session closed")]
    Closed,
}

impl From<tokio_tungstenite::tungstenite::Error> for SessionError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        SessionError::Transport(e.to_string())
    }
}
