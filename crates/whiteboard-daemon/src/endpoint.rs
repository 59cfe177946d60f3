//! One WebSocket session with another process.
//!
//! An [`Endpoint`] owns the write queue and the event dispatch table for a
//! connection. [`Endpoint::drive`] runs the whole lifetime on the calling task:
//! session handshake, then a single read loop that answers heartbeats and
//! dispatches events in arrival order. Writes go through an unbounded queue
//! drained by a separate writer task, so `emit` never blocks.

use crate::message::{classify, to_frame, Inbound};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{Error as WsError, Message as Frame};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, error, info, warn};
use whiteboard_core::protocol::{
    event, keepalive, session, HandshakeError, KeepAliveConfig, KeepAliveDecision,
    KeepAliveTracker, Message, ProtocolKind, ProtocolTable, Session, HANDSHAKE_TIMEOUT,
};
use whiteboard_core::{ConnectionDirection, DisconnectReason, PeerLink, TransportError};

/// How long the writer may take to flush the close frame.
const WRITER_GRACE: Duration = Duration::from_secs(2);

/// Handler for one event name. Receives the endpoint it arrived on and the
/// raw event payload.
pub type EventHandler = Arc<dyn Fn(&Arc<Endpoint>, &str) + Send + Sync>;

/// Why an endpoint stopped, or never started.
#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("Handshake failed: {0}")]
    Handshake(#[from] HandshakeError),

    #[error("Handshake timed out")]
    HandshakeTimeout,

    #[error("Closed before the handshake finished")]
    Aborted,

    #[error("Protocol violation: {0}")]
    ProtocolViolation(String),

    #[error("Heartbeat reply timed out")]
    KeepAliveTimeout,

    #[error("Remote closed without stopping the session")]
    RemoteClosed,

    #[error("WebSocket error: {0}")]
    Network(String),
}

impl EndpointError {
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::Handshake(_) | Self::ProtocolViolation(_) => DisconnectReason::ProtocolError,
            Self::HandshakeTimeout | Self::KeepAliveTimeout => DisconnectReason::TimedOut,
            Self::Aborted => DisconnectReason::Closed,
            Self::RemoteClosed => DisconnectReason::RemoteClosed,
            Self::Network(_) => DisconnectReason::NetworkError,
        }
    }
}

/// How an active session ended.
#[derive(Debug)]
pub enum EndpointExit {
    /// Local close or an answered stop request
    Closed,
    /// Anything else
    Lost(EndpointError),
}

impl EndpointExit {
    pub fn reason(&self) -> DisconnectReason {
        match self {
            Self::Closed => DisconnectReason::Closed,
            Self::Lost(e) => e.reason(),
        }
    }
}

/// Which side of the handshake this endpoint plays.
#[derive(Debug, Clone)]
pub enum HandshakeRole {
    /// Sends `SessionStartRequest` carrying the secret
    Dialer { secret: Option<String> },
    /// Waits for the request and checks the secret
    Acceptor { secret: Option<String> },
}

/// Timing for one endpoint.
#[derive(Debug, Clone)]
pub struct EndpointConfig {
    pub handshake_timeout: Duration,
    pub keepalive: KeepAliveConfig,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: HANDSHAKE_TIMEOUT,
            keepalive: KeepAliveConfig::default(),
        }
    }
}

impl EndpointConfig {
    /// How often the read loop checks the heartbeat deadline.
    fn keepalive_poll(&self) -> Duration {
        (self.keepalive.interval.min(self.keepalive.timeout) / 4).max(Duration::from_millis(10))
    }
}

/// Event handlers keyed by event name, built once per role.
#[derive(Clone, Default)]
pub struct DispatchTable {
    handlers: HashMap<String, EventHandler>,
}

impl DispatchTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a handler.
    ///
    /// # Panics
    ///
    /// Panics if `event_name` already has one. Tables are built at startup, so
    /// a duplicate is a wiring bug.
    pub fn on(
        mut self,
        event_name: &str,
        handler: impl Fn(&Arc<Endpoint>, &str) + Send + Sync + 'static,
    ) -> Self {
        let previous = self.handlers.insert(event_name.to_string(), Arc::new(handler));
        assert!(previous.is_none(), "handler for {} registered twice", event_name);
        self
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

enum Outbound {
    Frame(Message),
    Close,
}

/// Receiving halves handed to [`Endpoint::drive`].
pub struct EndpointIo {
    outgoing: mpsc::UnboundedReceiver<Outbound>,
    close: watch::Receiver<bool>,
}

pub struct Endpoint {
    id: String,
    direction: ConnectionDirection,
    outgoing: mpsc::UnboundedSender<Outbound>,
    handlers: RwLock<HashMap<String, EventHandler>>,
    protocols: Mutex<ProtocolTable>,
    close_requested: AtomicBool,
    close_tx: watch::Sender<bool>,
}

impl Endpoint {
    /// Create an endpoint for the connection to `id` (the remote `host:port`).
    pub fn new(id: &str, direction: ConnectionDirection) -> (Arc<Self>, EndpointIo) {
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = watch::channel(false);
        let endpoint = Arc::new(Self {
            id: id.to_string(),
            direction,
            outgoing,
            handlers: RwLock::new(HashMap::new()),
            protocols: Mutex::new(ProtocolTable::new()),
            close_requested: AtomicBool::new(false),
            close_tx,
        });
        let io = EndpointIo {
            outgoing: outgoing_rx,
            close: close_rx,
        };
        (endpoint, io)
    }

    pub fn direction(&self) -> ConnectionDirection {
        self.direction
    }

    /// Register the handler for one event name, replacing any earlier one.
    pub fn on(
        &self,
        event_name: &str,
        handler: impl Fn(&Arc<Endpoint>, &str) + Send + Sync + 'static,
    ) {
        let previous = self
            .handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .insert(event_name.to_string(), Arc::new(handler));
        if previous.is_some() {
            debug!("Replaced {} handler on {}", event_name, self.id);
        }
    }

    /// Register every handler in `table`.
    pub fn install(&self, table: &DispatchTable) {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        for (name, handler) in &table.handlers {
            handlers.insert(name.clone(), Arc::clone(handler));
        }
    }

    /// Stop the session gracefully. Safe to call more than once.
    pub fn close(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Closing session with {}", self.id);
        if self.is_protocol_active(ProtocolKind::Session) {
            let _ = self.outgoing.send(Outbound::Frame(session::stop_request()));
        }
        let _ = self.close_tx.send(true);
    }

    pub fn is_closing(&self) -> bool {
        self.close_requested.load(Ordering::SeqCst)
    }

    /// Whether `kind` is currently active on this endpoint.
    pub fn is_protocol_active(&self, kind: ProtocolKind) -> bool {
        self.protocols().is_active(kind)
    }

    /// Run the session to completion.
    ///
    /// `on_active` is called once the handshake succeeds and before the first
    /// event is dispatched, so handlers installed there see every event.
    /// Returns `Err` only if the session never became active.
    pub async fn drive<S, F>(
        self: &Arc<Self>,
        io: EndpointIo,
        ws: WebSocketStream<S>,
        role: HandshakeRole,
        config: &EndpointConfig,
        on_active: F,
    ) -> Result<EndpointExit, EndpointError>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
        F: FnOnce(&Arc<Endpoint>),
    {
        let EndpointIo {
            outgoing,
            close: mut close_rx,
        } = io;
        let (write, mut read) = ws.split();
        let writer = tokio::spawn(write_loop(self.id.clone(), write, outgoing));

        let handshake = tokio::select! {
            result = timeout(config.handshake_timeout, self.handshake(&mut read, &role)) => {
                result.unwrap_or(Err(EndpointError::HandshakeTimeout))
            }
            _ = close_rx.changed() => Err(EndpointError::Aborted),
        };
        if let Err(e) = handshake {
            warn!("Handshake with {} failed: {}", self.id, e);
            self.finish(writer).await;
            return Err(e);
        }

        {
            let mut protocols = self.protocols();
            protocols.request(ProtocolKind::Session);
            protocols.request(ProtocolKind::KeepAlive);
            protocols.request(ProtocolKind::Event);
        }
        info!("Session with {} active ({:?})", self.id, self.direction);
        on_active(self);

        let exit = self.serve(&mut read, &mut close_rx, config).await;
        match &exit {
            EndpointExit::Closed => info!("Session with {} closed", self.id),
            EndpointExit::Lost(e) => warn!("Session with {} lost: {}", self.id, e),
        }
        self.finish(writer).await;
        Ok(exit)
    }

    async fn handshake<S>(
        &self,
        read: &mut SplitStream<WebSocketStream<S>>,
        role: &HandshakeRole,
    ) -> Result<(), EndpointError>
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let mut session = Session::new();
        match role {
            HandshakeRole::Dialer { secret } => {
                self.send(session::start_request(secret.as_deref()))?;
                let reply = next_message(read).await?;
                session.accept_reply(&reply)?;
            }
            HandshakeRole::Acceptor { secret } => {
                let request = next_message(read).await?;
                match session.accept_request(&request, secret.as_deref()) {
                    Ok(reply) => self.send(reply)?,
                    Err(HandshakeError::BadSecret) => {
                        let _ = self.send(session::start_refusal(session::BAD_SECRET));
                        return Err(HandshakeError::BadSecret.into());
                    }
                    Err(e) => return Err(e.into()),
                }
            }
        }
        Ok(())
    }

    async fn serve<S>(
        self: &Arc<Self>,
        read: &mut SplitStream<WebSocketStream<S>>,
        close_rx: &mut watch::Receiver<bool>,
        config: &EndpointConfig,
    ) -> EndpointExit
    where
        S: AsyncRead + AsyncWrite + Unpin,
    {
        let started = Instant::now();
        let mut keepalive = KeepAliveTracker::new(&config.keepalive, 0);
        let mut ticker = tokio::time::interval(config.keepalive_poll());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                frame = read.next() => {
                    let data = match frame {
                        Some(Ok(frame)) => match classify(frame) {
                            Inbound::Data(data) => data,
                            Inbound::Skip => continue,
                            Inbound::Close => {
                                debug!("Received close frame from {}", self.id);
                                return self.ended(EndpointError::RemoteClosed);
                            }
                        },
                        Some(Err(WsError::ConnectionClosed | WsError::AlreadyClosed)) | None => {
                            debug!("Connection {} stream ended", self.id);
                            return self.ended(EndpointError::RemoteClosed);
                        }
                        Some(Err(e)) => {
                            return self.ended(EndpointError::Network(e.to_string()));
                        }
                    };
                    if let Err(e) = self.dispatch(&data, &mut keepalive) {
                        return EndpointExit::Lost(e);
                    }
                }
                _ = ticker.tick() => {
                    let now_ms = started.elapsed().as_millis() as u64;
                    match keepalive.poll(now_ms) {
                        Some(KeepAliveDecision::SendHeartbeat) => {
                            let _ = self.send(keepalive::request());
                        }
                        Some(KeepAliveDecision::TimedOut) => {
                            return EndpointExit::Lost(EndpointError::KeepAliveTimeout);
                        }
                        None => {}
                    }
                }
                _ = close_rx.changed() => return EndpointExit::Closed,
            }
        }
    }

    /// Handle one decoded frame.
    fn dispatch(
        self: &Arc<Self>,
        data: &[u8],
        keepalive: &mut KeepAliveTracker,
    ) -> Result<(), EndpointError> {
        let msg = Message::decode(data)
            .map_err(|e| EndpointError::ProtocolViolation(e.to_string()))?;
        let kind = ProtocolKind::from_wire(&msg.protocol)
            .ok_or_else(|| EndpointError::ProtocolViolation(format!("unknown protocol {}", msg.protocol)))?;
        if !self.is_protocol_active(kind) {
            return Err(EndpointError::ProtocolViolation(format!(
                "{} is not active",
                kind.wire_name()
            )));
        }

        match kind {
            ProtocolKind::Session => match msg.name.as_str() {
                session::STOP_REQUEST => self.stop_from_remote(),
                session::STOP_REPLY => debug!("{} acknowledged stop", self.id),
                other => {
                    return Err(EndpointError::ProtocolViolation(format!(
                        "{} after session start",
                        other
                    )))
                }
            },
            ProtocolKind::KeepAlive => match msg.name.as_str() {
                keepalive::REQUEST => {
                    let _ = self.send(keepalive::reply());
                }
                _ => keepalive.note_reply(),
            },
            ProtocolKind::Event => match event::unwrap_request(&msg) {
                Some((name, payload)) => match self.handler(name) {
                    Some(handler) => handler(self, payload),
                    None => debug!("No handler for {} from {}", name, self.id),
                },
                None => debug!("Event {} from {} ignored", msg.name, self.id),
            },
        }
        Ok(())
    }

    /// Answer a `SessionStopRequest` and end the session.
    fn stop_from_remote(&self) {
        if self.close_requested.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("{} requested stop", self.id);
        let _ = self.outgoing.send(Outbound::Frame(session::stop_reply()));
        let _ = self.close_tx.send(true);
    }

    /// The socket ended. After a stop was requested by either side that is
    /// the expected ending.
    fn ended(&self, error: EndpointError) -> EndpointExit {
        if self.is_closing() {
            EndpointExit::Closed
        } else {
            EndpointExit::Lost(error)
        }
    }

    /// Tear down: stop all protocols, flush the close frame, stop the writer.
    async fn finish(&self, mut writer: JoinHandle<()>) {
        self.close_requested.store(true, Ordering::SeqCst);
        self.protocols().stop_all();
        let _ = self.outgoing.send(Outbound::Close);
        if timeout(WRITER_GRACE, &mut writer).await.is_err() {
            debug!("Writer for {} did not finish, aborting", self.id);
            writer.abort();
        }
    }

    fn send(&self, msg: Message) -> Result<(), EndpointError> {
        self.outgoing
            .send(Outbound::Frame(msg))
            .map_err(|_| EndpointError::Network("writer stopped".to_string()))
    }

    fn handler(&self, event_name: &str) -> Option<EventHandler> {
        self.handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(event_name)
            .cloned()
    }

    fn protocols(&self) -> MutexGuard<'_, ProtocolTable> {
        self.protocols.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl PeerLink for Endpoint {
    fn id(&self) -> &str {
        &self.id
    }

    fn emit(&self, event_name: &str, payload: &str) -> Result<(), TransportError> {
        if self.is_closing() {
            return Err(TransportError::Closed(self.id.clone()));
        }
        if !self.is_protocol_active(ProtocolKind::Event) {
            return Err(TransportError::SendFailed(format!("session with {} not active", self.id)));
        }
        self.outgoing
            .send(Outbound::Frame(event::request(event_name, payload)))
            .map_err(|_| TransportError::Closed(self.id.clone()))
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("id", &self.id)
            .field("direction", &self.direction)
            .field("closing", &self.is_closing())
            .finish()
    }
}

/// Read the next message during the handshake, skipping control frames.
async fn next_message<S>(read: &mut SplitStream<WebSocketStream<S>>) -> Result<Message, EndpointError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    loop {
        match read.next().await {
            Some(Ok(frame)) => match classify(frame) {
                Inbound::Data(data) => {
                    return Message::decode(&data)
                        .map_err(|e| EndpointError::ProtocolViolation(e.to_string()));
                }
                Inbound::Skip => continue,
                Inbound::Close => return Err(EndpointError::RemoteClosed),
            },
            Some(Err(e)) => return Err(EndpointError::Network(e.to_string())),
            None => return Err(EndpointError::RemoteClosed),
        }
    }
}

/// Drain the write queue into the socket until told to close.
async fn write_loop<S>(
    id: String,
    mut write: SplitSink<WebSocketStream<S>, Frame>,
    mut outgoing: mpsc::UnboundedReceiver<Outbound>,
) where
    S: AsyncRead + AsyncWrite + Unpin,
{
    while let Some(out) = outgoing.recv().await {
        match out {
            Outbound::Frame(msg) => {
                if let Err(e) = write.send(to_frame(&msg)).await {
                    match e {
                        WsError::ConnectionClosed | WsError::AlreadyClosed => {
                            debug!("Connection {} closed while sending", id);
                        }
                        _ => error!("Failed to send to {}: {}", id, e),
                    }
                    break;
                }
            }
            Outbound::Close => {
                let _ = write.send(Frame::Close(None)).await;
                break;
            }
        }
    }
    let _ = write.close().await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tokio::io::DuplexStream;
    use tokio_tungstenite::tungstenite::protocol::Role;

    async fn ws_pair() -> (WebSocketStream<DuplexStream>, WebSocketStream<DuplexStream>) {
        let (a, b) = tokio::io::duplex(64 * 1024);
        let client = WebSocketStream::from_raw_socket(a, Role::Client, None).await;
        let server = WebSocketStream::from_raw_socket(b, Role::Server, None).await;
        (client, server)
    }

    fn fast_config() -> EndpointConfig {
        EndpointConfig {
            handshake_timeout: Duration::from_millis(500),
            keepalive: KeepAliveConfig {
                interval: Duration::from_millis(50),
                timeout: Duration::from_millis(100),
            },
        }
    }

    fn spawn_endpoint(
        ws: WebSocketStream<DuplexStream>,
        role: HandshakeRole,
        config: EndpointConfig,
        table: DispatchTable,
    ) -> (Arc<Endpoint>, JoinHandle<Result<EndpointExit, EndpointError>>) {
        let direction = match role {
            HandshakeRole::Dialer { .. } => ConnectionDirection::Outgoing,
            HandshakeRole::Acceptor { .. } => ConnectionDirection::Incoming,
        };
        let (endpoint, io) = Endpoint::new("test:1", direction);
        let driver = Arc::clone(&endpoint);
        let handle = tokio::spawn(async move {
            driver
                .drive(io, ws, role, &config, |ep| ep.install(&table))
                .await
        });
        (endpoint, handle)
    }

    fn dialer(secret: Option<&str>) -> HandshakeRole {
        HandshakeRole::Dialer {
            secret: secret.map(String::from),
        }
    }

    fn acceptor(secret: Option<&str>) -> HandshakeRole {
        HandshakeRole::Acceptor {
            secret: secret.map(String::from),
        }
    }

    async fn join(handle: JoinHandle<Result<EndpointExit, EndpointError>>) -> Result<EndpointExit, EndpointError> {
        timeout(Duration::from_secs(5), handle)
            .await
            .expect("endpoint did not finish")
            .expect("endpoint task panicked")
    }

    #[test]
    #[should_panic(expected = "registered twice")]
    fn test_dispatch_table_rejects_duplicates() {
        let _ = DispatchTable::new().on("A", |_, _| {}).on("A", |_, _| {});
    }

    #[tokio::test]
    async fn test_event_dispatch_and_close() {
        let (a, b) = ws_pair().await;
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let table = DispatchTable::new().on("PING_BOARD", move |_, payload| {
            sink.lock().unwrap().push(payload.to_string());
        });

        let (client, client_task) = spawn_endpoint(a, dialer(None), fast_config(), DispatchTable::new());
        let (_server, server_task) = spawn_endpoint(b, acceptor(None), fast_config(), table);

        tokio::time::sleep(Duration::from_millis(100)).await;
        client.emit("PING_BOARD", "one").unwrap();
        client.emit("PING_BOARD", "two").unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        client.close();

        assert!(matches!(join(client_task).await, Ok(EndpointExit::Closed)));
        assert!(matches!(join(server_task).await, Ok(EndpointExit::Closed)));
        assert_eq!(*seen.lock().unwrap(), vec!["one", "two"]);
    }

    #[tokio::test]
    async fn test_bad_secret_fails_both_sides() {
        let (a, b) = ws_pair().await;
        let (_client, client_task) = spawn_endpoint(a, dialer(Some("wrong")), fast_config(), DispatchTable::new());
        let (_server, server_task) = spawn_endpoint(b, acceptor(Some("right")), fast_config(), DispatchTable::new());

        assert!(matches!(
            join(server_task).await,
            Err(EndpointError::Handshake(HandshakeError::BadSecret))
        ));
        assert!(matches!(
            join(client_task).await,
            Err(EndpointError::Handshake(HandshakeError::Rejected(_)))
        ));
    }

    #[tokio::test]
    async fn test_handshake_times_out() {
        let (a, _silent) = ws_pair().await;
        let (_client, task) = spawn_endpoint(a, dialer(None), fast_config(), DispatchTable::new());

        assert!(matches!(join(task).await, Err(EndpointError::HandshakeTimeout)));
    }

    #[tokio::test]
    async fn test_missing_heartbeat_reply_times_out() {
        let (a, mut raw) = ws_pair().await;
        let (_server, task) = spawn_endpoint(a, acceptor(None), fast_config(), DispatchTable::new());

        // Complete the handshake by hand, then never answer heartbeats.
        raw.send(to_frame(&session::start_request(None))).await.unwrap();
        let heartbeats = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&heartbeats);
        tokio::spawn(async move {
            while let Some(Ok(frame)) = raw.next().await {
                if let Inbound::Data(data) = classify(frame) {
                    if Message::decode(&data).unwrap().is(keepalive::PROTOCOL_NAME, keepalive::REQUEST) {
                        counter.fetch_add(1, Ordering::SeqCst);
                    }
                }
            }
        });

        let exit = join(task).await.unwrap();
        assert!(matches!(exit, EndpointExit::Lost(EndpointError::KeepAliveTimeout)));
        assert_eq!(exit.reason(), DisconnectReason::TimedOut);
        assert!(heartbeats.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test]
    async fn test_heartbeats_keep_session_alive() {
        let (a, b) = ws_pair().await;
        let (client, client_task) = spawn_endpoint(a, dialer(None), fast_config(), DispatchTable::new());
        let (_server, server_task) = spawn_endpoint(b, acceptor(None), fast_config(), DispatchTable::new());

        // Several heartbeat windows pass without either side timing out.
        tokio::time::sleep(Duration::from_millis(400)).await;
        assert!(!client_task.is_finished());
        assert!(!server_task.is_finished());

        client.close();
        assert!(matches!(join(client_task).await, Ok(EndpointExit::Closed)));
        assert!(matches!(join(server_task).await, Ok(EndpointExit::Closed)));
    }

    #[tokio::test]
    async fn test_garbage_is_protocol_violation() {
        let (a, mut raw) = ws_pair().await;
        let (_server, task) = spawn_endpoint(a, acceptor(None), fast_config(), DispatchTable::new());

        raw.send(to_frame(&session::start_request(None))).await.unwrap();
        raw.send(Frame::Binary(b"not json".to_vec().into())).await.unwrap();

        let exit = join(task).await.unwrap();
        assert_eq!(exit.reason(), DisconnectReason::ProtocolError);
    }

    #[tokio::test]
    async fn test_dropped_socket_is_remote_closed() {
        let (a, raw) = ws_pair().await;
        let (_server, task) = spawn_endpoint(a, acceptor(None), fast_config(), DispatchTable::new());

        let mut raw = raw;
        raw.send(to_frame(&session::start_request(None))).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(raw);

        let exit = join(task).await.unwrap();
        assert!(matches!(exit.reason(), DisconnectReason::RemoteClosed | DisconnectReason::NetworkError));
    }

    #[tokio::test]
    async fn test_emit_requires_active_session() {
        let (endpoint, _io) = Endpoint::new("x:1", ConnectionDirection::Outgoing);
        assert!(matches!(
            endpoint.emit("SHARE_BOARD", "x:1:b"),
            Err(TransportError::SendFailed(_))
        ));

        endpoint.close();
        endpoint.close();
        assert!(matches!(
            endpoint.emit("SHARE_BOARD", "x:1:b"),
            Err(TransportError::Closed(_))
        ));
    }
}
