//! Background connection loop with reconnect-on-close.

use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::{Instant, Interval};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use tracing::{debug, error, info, warn};

use super::client::SessionInner;
use super::handler::dispatch_frame;
use super::types::Outgoing;
use crate::error::{AuthError, SessionError};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Queue depth between the handle and the live connection.
const OUTBOUND_CAPACITY: usize = 64;

// ---------------------------------------------------------------------------
// Connection Loop
// ---------------------------------------------------------------------------

/// Runs one connection generation until it goes stale or the session is
/// closed.
pub(crate) async fn connection_loop(inner: Arc<SessionInner>, generation: u64) {
    let mut streak = FailureStreak::default();

    loop {
        if !inner.is_live(generation) {
            return;
        }

        match connect(&inner).await {
            Ok(mut ws) => {
                streak.reset();
                let (tx, rx) = mpsc::channel(OUTBOUND_CAPACITY);
                if !inner.mark_ready(generation, tx) {
                    debug!(session = %inner.id, generation, "Session closed during connect, dropping connection");
                    let _ = ws.close(None).await;
                    return;
                }
                info!(session = %inner.id, endpoint = %inner.config.display_endpoint(), "Session ready");

                {
                    let _ready = ReadyGuard {
                        inner: &inner,
                        generation,
                    };
                    pump(&inner, ws, rx).await;
                }

                if !inner.is_live(generation) {
                    return;
                }
                pause(&inner, 1).await;
            }
            Err(SessionError::Endpoint(reason)) => {
                error!(session = %inner.id, reason = %reason, "Endpoint is unusable, giving up");
                return;
            }
            Err(e) => {
                if !inner.is_live(generation) {
                    return;
                }
                if streak.record() {
                    warn!(session = %inner.id, error = %e, "Connection attempt failed");
                } else {
                    debug!(session = %inner.id, error = %e, failures = streak.len(), "Connection attempt failed");
                }
                pause(&inner, streak.len()).await;
            }
        }
    }
}

/// Consecutive failed attempts since the last successful connection.
#[derive(Debug, Default)]
struct FailureStreak(u32);

impl FailureStreak {
    /// Count a failed attempt. Returns `true` for the first of a streak.
    fn record(&mut self) -> bool {
        self.0 = self.0.saturating_add(1);
        self.0 == 1
    }

    fn reset(&mut self) {
        self.0 = 0;
    }

    fn len(&self) -> u32 {
        self.0
    }
}

/// Withdraws a published connection when the pump ends, including when the
/// task is aborted or unwinds.
struct ReadyGuard<'a> {
    inner: &'a SessionInner,
    generation: u64,
}

impl Drop for ReadyGuard<'_> {
    fn drop(&mut self) {
        self.inner.mark_connecting(self.generation);
    }
}

/// Wait out the reconnect policy before attempt number `attempt`.
async fn pause(inner: &SessionInner, attempt: u32) {
    match inner.config.reconnect.delay(attempt) {
        Some(delay) => {
            info!(session = %inner.id, delay_ms = delay.as_millis() as u64, "Reconnecting");
            tokio::time::sleep(delay).await;
        }
        None => {
            debug!(session = %inner.id, "Reconnecting");
            tokio::task::yield_now().await;
        }
    }
}

/// Fetch a token and complete one WebSocket handshake.
async fn connect(inner: &SessionInner) -> Result<WsStream, SessionError> {
    let token = inner
        .tokens
        .id_token()
        .await?
        .ok_or(AuthError::NoSession)?;
    let url = inner.config.connection_url(&token)?;

    debug!(session = %inner.id, endpoint = %inner.config.display_endpoint(), "Connecting");
    let handshake = tokio_tungstenite::connect_async(url.as_str());
    let (ws, _response) = match inner.config.connect_timeout {
        Some(limit) => tokio::time::timeout(limit, handshake)
            .await
            .map_err(|_| SessionError::Timeout)??,
        None => handshake.await?,
    };
    Ok(ws)
}

// ---------------------------------------------------------------------------
// Frame Pump
// ---------------------------------------------------------------------------

/// Move frames in both directions until the transport ends or a close is
/// requested.
async fn pump(inner: &SessionInner, ws: WsStream, mut outbound: mpsc::Receiver<Outgoing>) {
    let (mut write, mut read) = ws.split();
    let mut keepalive = inner
        .config
        .keepalive()
        .map(|every| tokio::time::interval_at(Instant::now() + every, every));

    loop {
        tokio::select! {
            command = outbound.recv() => match command {
                Some(Outgoing::Frame(text)) => {
                    if let Err(e) = write.send(WsMessage::Text(text.into())).await {
                        warn!(session = %inner.id, error = %e, "Failed to send frame");
                        break;
                    }
                }
                Some(Outgoing::Close) | None => {
                    debug!(session = %inner.id, "Closing connection");
                    let _ = write.close().await;
                    break;
                }
            },
            frame = read.next() => match frame {
                Some(Ok(WsMessage::Text(text))) => dispatch_frame(inner, text.as_str()),
                Some(Ok(WsMessage::Binary(data))) => match std::str::from_utf8(&data) {
                    Ok(text) => dispatch_frame(inner, text),
                    Err(_) => debug!(session = %inner.id, len = data.len(), "Ignoring non-UTF-8 binary frame"),
                },
                Some(Ok(WsMessage::Ping(payload))) => {
                    if write.send(WsMessage::Pong(payload)).await.is_err() {
                        break;
                    }
                }
                Some(Ok(WsMessage::Close(frame))) => {
                    info!(session = %inner.id, reason = ?frame, "Server closed connection");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(session = %inner.id, error = %e, "WebSocket error");
                    break;
                }
                None => {
                    info!(session = %inner.id, "Connection ended");
                    break;
                }
            },
            _ = keepalive_tick(&mut keepalive) => {
                if write.send(WsMessage::Ping(Vec::<u8>::new().into())).await.is_err() {
                    warn!(session = %inner.id, "Keepalive ping failed");
                    break;
                }
            }
        }
    }
}

async fn keepalive_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
