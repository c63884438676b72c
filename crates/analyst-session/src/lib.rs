//! Reconnecting WebSocket session client for the investment analyst API.
//!
//! One [`Session`] backs one view: it fetches an identity token, connects
//! to the deployed WebSocket endpoint with the token as a query credential,
//! dispatches every inbound JSON frame to registered handlers, and
//! reconnects whenever the connection drops until the caller closes it.

pub mod action;
pub mod auth;
pub mod error;
pub mod exchange;
pub mod inbound;
pub mod session;
pub mod views;

pub use action::{ActionName, OutboundAction};
pub use auth::{CognitoConfig, CognitoTokenProvider, EnvTokenProvider, StaticTokenProvider, TokenProvider};
pub use error::{AuthError, SessionError};
pub use exchange::ViewResponse;
pub use inbound::InboundMessage;
pub use session::{HandlerId, ReconnectPolicy, Session, SessionConfig, SessionState};
pub use views::{Completion, FieldSpec, View, ViewProfile, ViewUpdate};
