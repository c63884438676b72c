//! One request, one answer: drive a view over a ready session.
//!
//! The API has no correlation ids on the wire, so a session should carry
//! at most one outstanding request at a time. Messages that arrive while a
//! request is pending are attributed to it.

use std::time::Duration;

use analyst_common::new_correlation_id;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::action::OutboundAction;
use crate::error::SessionError;
use crate::inbound::InboundMessage;
use crate::session::{HandlerId, Session, SessionState};
use crate::views::{View, ViewUpdate};

/// Everything a view received for one request.
#[derive(Debug, Clone, PartialEq)]
pub struct ViewResponse {
    pub view: View,
    /// Field values in arrival order, including those from the final message.
    pub updates: Vec<ViewUpdate>,
    /// The message that completed the view.
    pub message: InboundMessage,
}

impl ViewResponse {
    /// Latest value received for `field`.
    pub fn field(&self, field: &str) -> Option<&Value> {
        self.updates
            .iter()
            .rev()
            .find(|u| u.field == field)
            .map(|u| &u.value)
    }
}

/// Removes a temporary handler on every exit path.
struct HandlerGuard<'a> {
    session: &'a Session,
    id: HandlerId,
}

impl Drop for HandlerGuard<'_> {
    fn drop(&mut self) {
        self.session.remove_handler(self.id);
    }
}

impl Session {
    /// Send `action` and collect `view`'s fields until the view completes.
    ///
    /// Fails with [`SessionError::NotReady`] if the action could not be
    /// sent, [`SessionError::Timeout`] if no completing message arrives in
    /// time, and [`SessionError::Closed`] if the session closes first.
    pub async fn request(
        &self,
        view: View,
        action: &OutboundAction,
        timeout: Duration,
    ) -> Result<ViewResponse, SessionError> {
        if action.action_name() != Some(view.action()) {
            warn!(view = ?view, action = %action.action(), "Action does not match view");
        }

        let (tx, mut rx) = tokio::sync::mpsc::unbounded_channel();
        let _guard = HandlerGuard {
            session: self,
            id: self.on_message(move |msg| {
                let _ = tx.send(msg.clone());
            }),
        };

        if !self.send(action).await {
            return Err(SessionError::NotReady);
        }
        let request_id = new_correlation_id();
        info!(session = %self.id(), request = %request_id, action = %action.action(), "Request sent");

        let profile = view.profile();
        let mut updates = Vec::new();
        let mut states = self.subscribe();
        let deadline = tokio::time::Instant::now() + timeout;

        loop {
            let message = tokio::select! {
                received = tokio::time::timeout_at(deadline, rx.recv()) => match received {
                    Ok(Some(message)) => message,
                    Ok(None) => return Err(SessionError::Closed),
                    Err(_) => {
                        warn!(session = %self.id(), request = %request_id, "Request timed out");
                        return Err(SessionError::Timeout);
                    }
                },
                _ = states.wait_for(|s| *s == SessionState::Closed) => {
                    return Err(SessionError::Closed);
                }
            };

            if message.is_ack() {
                debug!(session = %self.id(), request = %request_id, "Request acknowledged");
                continue;
            }

            let extracted = profile.extract(&message);
            debug!(session = %self.id(), request = %request_id, fields = extracted.len(), "View update");
            updates.extend(extracted);

            if profile.is_complete(&message) {
                return Ok(ViewResponse {
                    view,
                    updates,
                    message,
                });
            }
        }
    }
}
