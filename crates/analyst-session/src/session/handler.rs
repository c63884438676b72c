//! Inbound frame dispatch.

use std::panic::{catch_unwind, AssertUnwindSafe};

use tracing::{error, trace, warn};

use super::client::SessionInner;
use crate::inbound::InboundMessage;

/// Parse one text frame and hand it to every registered handler.
///
/// Frames that are not JSON are logged and dropped; the connection stays up.
/// A handler that panics is logged and the remaining handlers still run.
pub(crate) fn dispatch_frame(inner: &SessionInner, text: &str) {
    let message = match InboundMessage::parse(text) {
        Ok(message) => message,
        Err(e) => {
            warn!(session = %inner.id, error = %e, len = text.len(), "Dropping malformed frame");
            return;
        }
    };

    let handlers = inner.handlers();
    trace!(session = %inner.id, keys = ?message.keys(), handlers = handlers.len(), "Dispatching message");
    for handler in handlers {
        if catch_unwind(AssertUnwindSafe(|| handler(&message))).is_err() {
            error!(session = %inner.id, "Message handler panicked");
        }
    }
}
