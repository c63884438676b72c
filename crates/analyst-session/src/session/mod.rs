//! Reconnecting session over one WebSocket connection.
//!
//! A [`Session`] fetches an identity token, connects with the token as a
//! query credential, fans every inbound JSON frame out to its handlers, and
//! reconnects after any close it did not ask for.

mod client;
mod connection;
mod handler;
mod types;

pub use client::Session;
pub use types::{HandlerId, ReconnectPolicy, SessionConfig, SessionState};

#[cfg(test)]
mod tests;
