//! Public handle owning one logical connection.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use analyst_common::SessionId;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use super::connection::connection_loop;
use super::types::{HandlerId, Outgoing, SessionConfig, SessionState};
use crate::action::OutboundAction;
use crate::auth::TokenProvider;
use crate::error::SessionError;
use crate::inbound::InboundMessage;

pub(crate) type Handler = Arc<dyn Fn(&InboundMessage) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ---------------------------------------------------------------------------
// Shared State
// ---------------------------------------------------------------------------

/// State shared between the handle and its connection task.
pub(crate) struct SessionInner {
    pub(crate) id: SessionId,
    pub(crate) config: SessionConfig,
    pub(crate) tokens: Arc<dyn TokenProvider>,
    closed: AtomicBool,
    generation: AtomicU64,
    state_tx: watch::Sender<SessionState>,
    handlers: RwLock<Vec<(HandlerId, Handler)>>,
    next_handler: AtomicU64,
    /// Sender into the live connection, tagged with its generation.
    outbound: Mutex<Option<(u64, mpsc::Sender<Outgoing>)>>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// True while `generation` is the newest connection and the caller
    /// has not closed the session.
    pub(crate) fn is_live(&self, generation: u64) -> bool {
        !self.is_closed() && self.generation.load(Ordering::SeqCst) == generation
    }

    /// Publish a live connection. Returns `false` when the generation is
    /// stale or the session was closed, in which case the caller must drop
    /// the connection.
    pub(crate) fn mark_ready(&self, generation: u64, tx: mpsc::Sender<Outgoing>) -> bool {
        let mut accepted = false;
        self.state_tx.send_if_modified(|state| {
            if !self.is_live(generation) {
                return false;
            }
            *lock(&self.outbound) = Some((generation, tx));
            accepted = true;
            let changed = *state != SessionState::Ready;
            *state = SessionState::Ready;
            changed
        });
        accepted
    }

    /// Withdraw the connection of `generation` and fall back to `Connecting`.
    pub(crate) fn mark_connecting(&self, generation: u64) {
        self.state_tx.send_if_modified(|state| {
            let mut outbound = lock(&self.outbound);
            if outbound.as_ref().is_some_and(|(g, _)| *g == generation) {
                *outbound = None;
            }
            if !self.is_live(generation) || *state == SessionState::Connecting {
                return false;
            }
            *state = SessionState::Connecting;
            true
        });
    }

    /// Handlers registered right now, in registration order.
    pub(crate) fn handlers(&self) -> Vec<Handler> {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, h)| Arc::clone(h))
            .collect()
    }

    fn live_sender(&self) -> Option<mpsc::Sender<Outgoing>> {
        let current = self.generation.load(Ordering::SeqCst);
        lock(&self.outbound)
            .as_ref()
            .filter(|(g, _)| *g == current)
            .map(|(_, tx)| tx.clone())
    }

    /// Flag the session closed and ask the live connection to close.
    fn shut_down(&self) -> bool {
        if self.closed.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.state_tx.send_replace(SessionState::Closed);
        if let Some((_, tx)) = lock(&self.outbound).take() {
            let _ = tx.try_send(Outgoing::Close);
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// One view's connection to the analyst WebSocket API.
///
/// The session owns at most one live connection at a time. Once opened it
/// reconnects after every unsolicited close until [`close`](Self::close) is
/// called or the session is dropped. Failures never surface as errors; they
/// show up as the session not being [`Ready`](SessionState::Ready).
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Create a session. No I/O happens until [`open`](Self::open).
    pub fn new(
        config: SessionConfig,
        tokens: Arc<dyn TokenProvider>,
    ) -> Result<Self, SessionError> {
        config.validate()?;
        let (state_tx, _) = watch::channel(SessionState::Idle);
        Ok(Self {
            inner: Arc::new(SessionInner {
                id: SessionId::new(),
                config,
                tokens,
                closed: AtomicBool::new(false),
                generation: AtomicU64::new(0),
                state_tx,
                handlers: RwLock::new(Vec::new()),
                next_handler: AtomicU64::new(1),
                outbound: Mutex::new(None),
                task: Mutex::new(None),
            }),
        })
    }

    pub fn id(&self) -> &SessionId {
        &self.inner.id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// Start (or restart) the connection task.
    ///
    /// Any existing connection is discarded first. Does nothing once the
    /// session has been closed. Must be called inside a Tokio runtime.
    pub fn open(&self) {
        let inner = &self.inner;
        if inner.is_closed() {
            info!(session = %inner.id, "Ignoring open on a closed session");
            return;
        }

        let mut task = lock(&inner.task);
        if let Some(previous) = task.take() {
            previous.abort();
        }

        let mut generation = 0;
        inner.state_tx.send_if_modified(|state| {
            generation = inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
            *lock(&inner.outbound) = None;
            if inner.is_closed() {
                return false;
            }
            *state = SessionState::Connecting;
            true
        });

        debug!(session = %inner.id, generation, "Opening session");
        *task = Some(tokio::spawn(connection_loop(Arc::clone(inner), generation)));
    }

    /// Hand `action` to the live connection.
    ///
    /// Returns `false` without sending when the session is not ready.
    pub async fn send(&self, action: &OutboundAction) -> bool {
        let Some(tx) = self.inner.live_sender() else {
            debug!(session = %self.inner.id, action = %action.action(), "Not ready, dropping action");
            return false;
        };
        let frame = match action.to_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!(session = %self.inner.id, error = %e, "Failed to encode action");
                return false;
            }
        };
        if tx.send(Outgoing::Frame(frame)).await.is_err() {
            debug!(session = %self.inner.id, action = %action.action(), "Connection went away, dropping action");
            return false;
        }
        debug!(session = %self.inner.id, action = %action.action(), "Action sent");
        true
    }

    /// Register a handler for every parsed inbound message.
    ///
    /// Handlers run on the connection task, one message at a time, in
    /// receive order.
    pub fn on_message<F>(&self, handler: F) -> HandlerId
    where
        F: Fn(&InboundMessage) + Send + Sync + 'static,
    {
        let id = HandlerId(self.inner.next_handler.fetch_add(1, Ordering::Relaxed));
        self.inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(handler)));
        id
    }

    /// Returns `false` if `id` was not registered.
    pub fn remove_handler(&self, id: HandlerId) -> bool {
        let mut handlers = self
            .inner
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|(h, _)| *h != id);
        handlers.len() != before
    }

    /// Close the session for good. Suppresses every future reconnect.
    pub fn close(&self) {
        if self.inner.shut_down() {
            info!(session = %self.inner.id, "Session closed");
        }
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state_tx.borrow()
    }

    pub fn is_ready(&self) -> bool {
        self.state() == SessionState::Ready
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Watch state transitions, e.g. to enable a submit control only
    /// while the session is ready.
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.inner.state_tx.subscribe()
    }

    /// Wait until the session is ready.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<(), SessionError> {
        let mut rx = self.subscribe();
        let reached = tokio::time::timeout(
            timeout,
            rx.wait_for(|s| matches!(s, SessionState::Ready | SessionState::Closed)),
        )
        .await;
        match reached {
            Err(_) => Err(SessionError::Timeout),
            Ok(Err(_)) => Err(SessionError::Closed),
            Ok(Ok(state)) if *state == SessionState::Ready => Ok(()),
            Ok(Ok(_)) => Err(SessionError::Closed),
        }
    }
}

#[cfg(test)]
impl Session {
    /// Kill the connection task without going through `close`.
    pub(crate) fn abort_connection(&self) {
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.inner.id)
            .field("state", &self.state())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.inner.shut_down();
        if let Some(task) = lock(&self.inner.task).take() {
            task.abort();
        }
    }
}
