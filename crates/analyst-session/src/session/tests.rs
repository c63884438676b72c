use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Notify};
use tokio::time::Instant;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message as WsMessage;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

use super::*;
use crate::action::OutboundAction;
use crate::auth::{StaticTokenProvider, TokenProvider};
use crate::error::{AuthError, SessionError};
use crate::inbound::InboundMessage;

// ---------------------------------------------------------------------------
// Test Server
// ---------------------------------------------------------------------------

#[derive(Clone, Copy)]
enum Behavior {
    /// Echo every text frame.
    Echo,
    /// Close the first connection right after the handshake, echo on later ones.
    DropFirst,
    /// Send a non-JSON frame and then a JSON one, then echo.
    GreetMalformed,
    /// Ping the client with a `hi` payload, then echo.
    PingFirst,
}

struct TestServer {
    url: String,
    accepted: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
    uris: Arc<Mutex<Vec<String>>>,
    /// Ping and pong frames received from clients.
    control: Arc<Mutex<Vec<WsMessage>>>,
}

impl TestServer {
    fn accepted(&self) -> usize {
        self.accepted.load(Ordering::SeqCst)
    }

    fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    fn pings(&self) -> usize {
        let control = self.control.lock().unwrap();
        control.iter().filter(|m| matches!(m, WsMessage::Ping(_))).count()
    }

    fn pong_payloads(&self) -> Vec<Vec<u8>> {
        let control = self.control.lock().unwrap();
        control
            .iter()
            .filter_map(|m| match m {
                WsMessage::Pong(payload) => Some(payload.to_vec()),
                _ => None,
            })
            .collect()
    }
}

async fn spawn_server(behavior: Behavior) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    let accepted = Arc::new(AtomicUsize::new(0));
    let live = Arc::new(AtomicUsize::new(0));
    let uris = Arc::new(Mutex::new(Vec::new()));
    let control = Arc::new(Mutex::new(Vec::new()));

    let server = TestServer {
        url,
        accepted: Arc::clone(&accepted),
        live: Arc::clone(&live),
        uris: Arc::clone(&uris),
        control: Arc::clone(&control),
    };

    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let index = accepted.fetch_add(1, Ordering::SeqCst);
            let live = Arc::clone(&live);
            let uris = Arc::clone(&uris);
            let control = Arc::clone(&control);
            tokio::spawn(async move {
                let record = move |req: &Request, resp: Response| {
                    uris.lock().unwrap().push(req.uri().to_string());
                    Ok::<Response, ErrorResponse>(resp)
                };
                let Ok(mut ws) = accept_hdr_async(stream, record).await else {
                    return;
                };
                live.fetch_add(1, Ordering::SeqCst);
                serve(&mut ws, behavior, index, &control).await;
                live.fetch_sub(1, Ordering::SeqCst);
            });
        }
    });

    server
}

async fn serve(
    ws: &mut WebSocketStream<TcpStream>,
    behavior: Behavior,
    index: usize,
    control: &Mutex<Vec<WsMessage>>,
) {
    match behavior {
        Behavior::DropFirst if index == 0 => {
            let _ = ws.close(None).await;
            return;
        }
        Behavior::GreetMalformed => {
            let _ = ws.send(WsMessage::Text("Connection established".into())).await;
            let _ = ws.send(WsMessage::Text(r#"{"hello": 1}"#.into())).await;
        }
        Behavior::PingFirst => {
            let _ = ws.send(WsMessage::Ping(b"hi".to_vec().into())).await;
        }
        _ => {}
    }

    while let Some(Ok(msg)) = ws.next().await {
        match msg {
            WsMessage::Text(text) => {
                if ws.send(WsMessage::Text(text)).await.is_err() {
                    break;
                }
            }
            WsMessage::Ping(_) | WsMessage::Pong(_) => {
                control.lock().unwrap().push(msg);
            }
            WsMessage::Close(_) => break,
            _ => {}
        }
    }
}

/// Accepts TCP connections and never answers the WebSocket handshake.
async fn spawn_stalled_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    tokio::spawn(async move {
        let mut held = Vec::new();
        while let Ok((stream, _)) = listener.accept().await {
            held.push(stream);
        }
    });
    url
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Counts fetches and never has a token.
#[derive(Default)]
struct SignedOut {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for SignedOut {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(None)
    }
}

/// Counts fetches and always has a token.
#[derive(Default)]
struct Counting {
    calls: AtomicUsize,
}

#[async_trait]
impl TokenProvider for Counting {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Some("token".into()))
    }
}

/// Blocks every token fetch until released.
#[derive(Default)]
struct Gated {
    calls: AtomicUsize,
    release: Notify,
}

#[async_trait]
impl TokenProvider for Gated {
    async fn id_token(&self) -> Result<Option<String>, AuthError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.release.notified().await;
        Ok(Some("token".into()))
    }
}

fn session_for(url: &str, token: &str) -> Session {
    Session::new(
        SessionConfig::new(url),
        Arc::new(StaticTokenProvider::new(token)),
    )
    .unwrap()
}

fn collect(session: &Session) -> mpsc::UnboundedReceiver<InboundMessage> {
    let (tx, rx) = mpsc::unbounded_channel();
    session.on_message(move |msg| {
        let _ = tx.send(msg.clone());
    });
    rx
}

async fn next_message(rx: &mut mpsc::UnboundedReceiver<InboundMessage>) -> InboundMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a message")
        .expect("handler channel closed")
}

async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !check() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

const READY_WAIT: Duration = Duration::from_secs(5);

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

#[test]
fn connection_url_appends_token() {
    let config = SessionConfig::new("wss://d1234.cloudfront.net/wss/");
    assert_eq!(
        config.connection_url("abc.def").unwrap(),
        "wss://d1234.cloudfront.net/wss/?idToken=abc.def"
    );
}

#[test]
fn connection_url_encodes_and_extends_query() {
    let config = SessionConfig::new("wss://api.example.com/prod?stage=1")
        .with_token_param("token");
    assert_eq!(
        config.connection_url("a b+c").unwrap(),
        "wss://api.example.com/prod?stage=1&token=a%20b%2Bc"
    );

    let config = SessionConfig::new("ws://localhost:9000/?");
    assert_eq!(
        config.connection_url("t").unwrap(),
        "ws://localhost:9000/?idToken=t"
    );
}

#[test]
fn rejects_non_websocket_endpoints() {
    for endpoint in ["https://api.example.com/", "api.example.com", "wss://", "ws:///path"] {
        let err = SessionConfig::new(endpoint).validate().unwrap_err();
        assert!(matches!(err, SessionError::Endpoint(_)), "{endpoint}");
    }
    assert!(Session::new(
        SessionConfig::new("http://nope"),
        Arc::new(StaticTokenProvider::new("t"))
    )
    .is_err());
}

#[test]
fn config_debug_has_no_token() {
    let config = SessionConfig::new("wss://api.example.com/");
    let url = config.connection_url("secret-token").unwrap();
    assert!(url.contains("secret-token"));
    assert!(!format!("{config:?}").contains("secret-token"));
}

#[test]
fn reconnect_delays() {
    assert_eq!(ReconnectPolicy::Immediate.delay(1), None);
    assert_eq!(ReconnectPolicy::Immediate.delay(50), None);

    let backoff = ReconnectPolicy::Backoff {
        initial: Duration::from_millis(500),
        max: Duration::from_secs(3),
    };
    assert_eq!(backoff.delay(1), Some(Duration::from_millis(500)));
    assert_eq!(backoff.delay(2), Some(Duration::from_millis(1000)));
    assert_eq!(backoff.delay(3), Some(Duration::from_millis(2000)));
    assert_eq!(backoff.delay(4), Some(Duration::from_secs(3)));
    assert_eq!(backoff.delay(u32::MAX), Some(Duration::from_secs(3)));
}

// ---------------------------------------------------------------------------
// Lifecycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn new_session_is_idle_until_opened() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    assert_eq!(session.state(), SessionState::Idle);
    assert!(matches!(
        session.wait_ready(Duration::from_millis(50)).await,
        Err(SessionError::Timeout)
    ));
    assert_eq!(server.accepted(), 0);
}

#[tokio::test]
async fn open_connects_with_token_in_query() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "tok en");

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    assert!(session.is_ready());
    let uris = server.uris.lock().unwrap().clone();
    assert_eq!(uris, vec!["/?idToken=tok%20en".to_string()]);
}

#[tokio::test]
async fn send_before_ready_returns_false() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    assert!(!session.send(&OutboundAction::ticker_news("AAPL")).await);
    assert_eq!(server.accepted(), 0);
}

#[tokio::test]
async fn echoed_action_reaches_handler_unchanged() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    let action = OutboundAction::industry_report("Semiconductors", None, None);
    assert!(session.send(&action).await);

    let echoed = next_message(&mut rx).await;
    assert_eq!(
        echoed.as_value(),
        &json!({
            "action": "getIndustryReport",
            "industry": "Semiconductors",
            "region": "global",
            "time_horizon": "next 12 months"
        })
    );
}

#[tokio::test]
async fn handlers_see_messages_in_order() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    for i in 0..5 {
        assert!(session.send(&OutboundAction::send_message(&format!("m{i}"))).await);
    }
    for i in 0..5 {
        let msg = next_message(&mut rx).await;
        assert_eq!(msg.get("data"), Some(&json!(format!("m{i}"))));
    }
}

#[tokio::test]
async fn removed_handler_stops_receiving() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    let seen = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&seen);
    let id = session.on_message(move |_| {
        counter.fetch_add(1, Ordering::SeqCst);
    });
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    assert!(session.send(&OutboundAction::send_message("one")).await);
    next_message(&mut rx).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);

    assert!(session.remove_handler(id));
    assert!(!session.remove_handler(id));

    assert!(session.send(&OutboundAction::send_message("two")).await);
    next_message(&mut rx).await;
    assert_eq!(seen.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn malformed_frame_is_dropped_and_connection_survives() {
    let server = spawn_server(Behavior::GreetMalformed).await;
    let session = session_for(&server.url, "t");
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    let first = next_message(&mut rx).await;
    assert_eq!(first.as_value(), &json!({"hello": 1}));

    assert!(session.send(&OutboundAction::chat("still there?")).await);
    let echoed = next_message(&mut rx).await;
    assert_eq!(echoed.get("question"), Some(&json!("still there?")));
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn reconnects_after_unsolicited_close() {
    let server = spawn_server(Behavior::DropFirst).await;
    let session = session_for(&server.url, "t");
    let mut rx = collect(&session);

    session.open();
    eventually("second connection", || server.accepted() >= 2).await;
    session.wait_ready(READY_WAIT).await.unwrap();
    eventually("ready on the new connection", || {
        session.is_ready() && server.live() == 1
    })
    .await;

    assert!(session.send(&OutboundAction::ticker_news("MSFT")).await);
    let echoed = next_message(&mut rx).await;
    assert_eq!(echoed.get("tickr"), Some(&json!("MSFT")));
}

#[tokio::test]
async fn close_stops_reconnecting() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    session.close();
    assert_eq!(session.state(), SessionState::Closed);
    assert!(session.is_closed());
    assert!(!session.send(&OutboundAction::send_message("late")).await);

    eventually("server to see the close", || server.live() == 0).await;
    tokio::time::sleep(Duration::from_millis(100)).await;
    assert_eq!(server.accepted(), 1);
    assert_eq!(session.state(), SessionState::Closed);
}

#[tokio::test]
async fn open_after_close_is_ignored() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    session.close();
    session.open();
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(server.accepted(), 0);
    assert!(matches!(
        session.wait_ready(Duration::from_millis(50)).await,
        Err(SessionError::Closed)
    ));
}

#[tokio::test]
async fn reopen_keeps_one_live_connection() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    session.open();
    eventually("second connection", || server.accepted() == 2).await;
    session.wait_ready(READY_WAIT).await.unwrap();
    eventually("old connection to drop", || server.live() == 1).await;

    assert!(session.send(&OutboundAction::send_message("after reopen")).await);
    let echoed = next_message(&mut rx).await;
    assert_eq!(echoed.get("data"), Some(&json!("after reopen")));
}

#[tokio::test]
async fn missing_token_keeps_retrying_without_connecting() {
    let server = spawn_server(Behavior::Echo).await;
    let tokens = Arc::new(SignedOut::default());
    let session = Session::new(SessionConfig::new(&server.url), tokens.clone()).unwrap();

    session.open();
    eventually("repeated token fetches", || {
        tokens.calls.load(Ordering::SeqCst) >= 3
    })
    .await;

    assert_eq!(session.state(), SessionState::Connecting);
    assert_eq!(server.accepted(), 0);

    session.close();
    tokio::time::sleep(Duration::from_millis(20)).await;
    let after_close = tokens.calls.load(Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(tokens.calls.load(Ordering::SeqCst), after_close);
}

#[tokio::test]
async fn backoff_spaces_out_failed_attempts() {
    // Reserve a port, then free it so connects are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/", listener.local_addr().unwrap());
    drop(listener);

    let tokens = Arc::new(Counting::default());
    let config = SessionConfig::new(url).with_reconnect(ReconnectPolicy::Backoff {
        initial: Duration::from_millis(100),
        max: Duration::from_millis(100),
    });
    let session = Session::new(config, tokens.clone()).unwrap();

    session.open();
    tokio::time::sleep(Duration::from_millis(350)).await;
    session.close();

    let calls = tokens.calls.load(Ordering::SeqCst);
    assert!((2..=6).contains(&calls), "unexpected attempt count {calls}");
    assert!(!session.is_ready());
}

#[tokio::test]
async fn dropping_session_disconnects() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    let mut states = session.subscribe();

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();
    eventually("server to register the connection", || server.live() == 1).await;

    drop(session);
    eventually("server to see the disconnect", || server.live() == 0).await;
    assert_eq!(*states.borrow_and_update(), SessionState::Closed);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn subscribers_observe_ready_transition() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    let mut states = session.subscribe();

    session.open();
    tokio::time::timeout(
        READY_WAIT,
        states.wait_for(|s| *s == SessionState::Ready),
    )
    .await
    .unwrap()
    .unwrap();
}

#[tokio::test]
async fn connection_finishing_after_close_never_becomes_ready() {
    let server = spawn_server(Behavior::Echo).await;
    let tokens = Arc::new(Gated::default());
    let session = Session::new(SessionConfig::new(&server.url), tokens.clone()).unwrap();

    let mut states = session.subscribe();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let record = Arc::clone(&seen);
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            record.lock().unwrap().push(state);
        }
    });

    session.open();
    eventually("token fetch to start", || tokens.calls.load(Ordering::SeqCst) == 1).await;
    session.close();
    tokens.release.notify_one();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(session.state(), SessionState::Closed);
    assert_eq!(server.live(), 0);
    assert_eq!(tokens.calls.load(Ordering::SeqCst), 1);

    let seen = seen.lock().unwrap().clone();
    assert!(!seen.contains(&SessionState::Ready), "{seen:?}");
    assert_eq!(seen.last(), Some(&SessionState::Closed));
}

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

#[tokio::test]
async fn server_ping_is_answered_with_pong() {
    let server = spawn_server(Behavior::PingFirst).await;
    let session = session_for(&server.url, "t");

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    eventually("pong from the client", || !server.pong_payloads().is_empty()).await;
    assert_eq!(server.pong_payloads(), vec![b"hi".to_vec()]);
    assert!(session.is_ready());
}

#[tokio::test]
async fn keepalive_sends_client_pings() {
    let server = spawn_server(Behavior::Echo).await;
    let config = SessionConfig::new(&server.url).with_keepalive(Some(Duration::from_millis(50)));
    let session = Session::new(config, Arc::new(StaticTokenProvider::new("t"))).unwrap();

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    eventually("two keepalive pings", || server.pings() >= 2).await;
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn no_pings_without_keepalive() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;

    assert_eq!(server.pings(), 0);
}

#[tokio::test]
async fn zero_keepalive_disables_pings() {
    assert_eq!(
        SessionConfig::new("ws://localhost/")
            .with_keepalive(Some(Duration::ZERO))
            .keepalive_interval,
        None
    );

    let server = spawn_server(Behavior::Echo).await;
    let mut config = SessionConfig::new(&server.url);
    config.keepalive_interval = Some(Duration::ZERO);
    let session = Session::new(config, Arc::new(StaticTokenProvider::new("t"))).unwrap();
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(session.send(&OutboundAction::send_message("still up")).await);
    let echoed = next_message(&mut rx).await;
    assert_eq!(echoed.get("data"), Some(&json!("still up")));
    assert_eq!(server.accepted(), 1);
    assert_eq!(server.pings(), 0);
}

#[tokio::test]
async fn connect_timeout_abandons_stalled_handshake() {
    let url = spawn_stalled_server().await;
    let tokens = Arc::new(Counting::default());
    let config = SessionConfig::new(url)
        .with_connect_timeout(Some(Duration::from_millis(100)))
        .with_reconnect(ReconnectPolicy::Backoff {
            initial: Duration::from_millis(20),
            max: Duration::from_millis(20),
        });
    let session = Session::new(config, tokens.clone()).unwrap();

    session.open();
    eventually("a retry after the timeout", || {
        tokens.calls.load(Ordering::SeqCst) >= 2
    })
    .await;

    assert_eq!(session.state(), SessionState::Connecting);
    session.close();
}

// ---------------------------------------------------------------------------
// Failure Containment
// ---------------------------------------------------------------------------

#[tokio::test]
async fn panicking_handler_does_not_take_down_the_connection() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");
    session.on_message(|_| panic!("handler failure"));
    let mut rx = collect(&session);

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    for text in ["first", "second"] {
        assert!(session.send(&OutboundAction::send_message(text)).await);
        let echoed = next_message(&mut rx).await;
        assert_eq!(echoed.get("data"), Some(&json!(text)));
    }
    assert!(session.is_ready());
    assert_eq!(server.accepted(), 1);
}

#[tokio::test]
async fn dead_connection_task_does_not_leave_session_ready() {
    let server = spawn_server(Behavior::Echo).await;
    let session = session_for(&server.url, "t");

    session.open();
    session.wait_ready(READY_WAIT).await.unwrap();

    session.abort_connection();
    eventually("session to leave ready", || !session.is_ready()).await;
    assert_eq!(session.state(), SessionState::Connecting);
    assert!(!session.send(&OutboundAction::send_message("gone")).await);
}
