//! Connection manager for index and peer sessions.
//!
//! Accepts incoming WebSocket connections, dials outgoing ones, and runs each
//! as an [`Endpoint`] on its own task. Callers only see endpoints whose
//! session handshake succeeded:
//! - `started` fires once the session is active, before any event dispatch
//! - exactly one of `stopped` or `error` fires when it ends
//! - a failed handshake fires nothing and is only logged

use crate::endpoint::{Endpoint, EndpointConfig, EndpointError, EndpointExit, EndpointIo, HandshakeRole};
use anyhow::{anyhow, bail, Result};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_tungstenite::{accept_async, connect_async, WebSocketStream};
use tracing::{debug, error, info, warn};
use whiteboard_core::{ConnectionDirection, PeerLink, PeerRegistry};

type EndpointCallback = Arc<dyn Fn(&Arc<Endpoint>) + Send + Sync>;
type ErrorCallback = Arc<dyn Fn(&Arc<Endpoint>, &EndpointError) + Send + Sync>;

/// Application callbacks for one listener or one dial.
#[derive(Clone, Default)]
pub struct SessionHooks {
    started: Option<EndpointCallback>,
    stopped: Option<EndpointCallback>,
    error: Option<ErrorCallback>,
}

impl SessionHooks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session became active. Install event handlers here.
    pub fn on_started(mut self, f: impl Fn(&Arc<Endpoint>) + Send + Sync + 'static) -> Self {
        self.started = Some(Arc::new(f));
        self
    }

    /// Session ended gracefully.
    pub fn on_stopped(mut self, f: impl Fn(&Arc<Endpoint>) + Send + Sync + 'static) -> Self {
        self.stopped = Some(Arc::new(f));
        self
    }

    /// Session was lost.
    pub fn on_error(
        mut self,
        f: impl Fn(&Arc<Endpoint>, &EndpointError) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Arc::new(f));
        self
    }

    fn started(&self, endpoint: &Arc<Endpoint>) {
        if let Some(f) = &self.started {
            f(endpoint);
        }
    }

    fn stopped(&self, endpoint: &Arc<Endpoint>) {
        if let Some(f) = &self.stopped {
            f(endpoint);
        }
    }

    fn error(&self, endpoint: &Arc<Endpoint>, e: &EndpointError) {
        if let Some(f) = &self.error {
            f(endpoint, e);
        }
    }
}

/// Settings shared by every endpoint of one manager.
#[derive(Debug, Clone, Default)]
pub struct ManagerConfig {
    /// Secret sent when dialing and required when accepting
    pub secret: Option<String>,
    pub endpoint: EndpointConfig,
}

pub struct ConnectionManager {
    config: ManagerConfig,
    /// Active sessions
    registry: PeerRegistry<Endpoint>,
    /// Every endpoint with a running task, including those mid-handshake
    live: Mutex<HashMap<u64, Arc<Endpoint>>>,
    next_serial: AtomicU64,
    tasks: Mutex<Vec<JoinHandle<()>>>,
    shutting_down: AtomicBool,
    shutdown_tx: watch::Sender<bool>,
}

impl ConnectionManager {
    pub fn new(config: ManagerConfig) -> Arc<Self> {
        let (shutdown_tx, _) = watch::channel(false);
        Arc::new(Self {
            config,
            registry: PeerRegistry::new(),
            live: Mutex::new(HashMap::new()),
            next_serial: AtomicU64::new(1),
            tasks: Mutex::new(Vec::new()),
            shutting_down: AtomicBool::new(false),
            shutdown_tx,
        })
    }

    /// Bind to an address and return the TCP listener.
    pub async fn bind(listen_addr: &str) -> Result<TcpListener> {
        let listener = TcpListener::bind(listen_addr).await?;
        info!("WebSocket server listening on {}", listener.local_addr()?);
        Ok(listener)
    }

    /// Bind and start accepting sessions.
    pub async fn listen(self: &Arc<Self>, listen_addr: &str, hooks: SessionHooks) -> Result<SocketAddr> {
        let listener = Self::bind(listen_addr).await?;
        self.serve(listener, hooks)
    }

    /// Start accepting sessions on an already-bound listener.
    pub fn serve(self: &Arc<Self>, listener: TcpListener, hooks: SessionHooks) -> Result<SocketAddr> {
        if self.is_shutting_down() {
            bail!("Connection manager is shutting down");
        }
        let local_addr = listener.local_addr()?;
        let manager = Arc::clone(self);
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    accepted = listener.accept() => match accepted {
                        Ok((stream, addr)) => manager.accept(stream, addr, hooks.clone()),
                        Err(e) => warn!("Accept failed on {}: {}", local_addr, e),
                    },
                    _ = shutdown_rx.changed() => break,
                }
            }
            debug!("Stopped accepting on {}", local_addr);
        });
        self.track(handle);
        Ok(local_addr)
    }

    /// Dial `host:port` and wait for the session handshake.
    pub async fn connect(self: &Arc<Self>, host: &str, port: u16, hooks: SessionHooks) -> Result<Arc<Endpoint>> {
        if self.is_shutting_down() {
            bail!("Connection manager is shutting down");
        }
        let url = format!("ws://{}:{}", host, port);
        let (ws, _) = timeout(self.config.endpoint.handshake_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| anyhow!("Timed out connecting to {}", url))?
            .map_err(|e| anyhow!("Failed to connect to {}: {}", url, e))?;
        debug!("Connected to {}", url);

        let (endpoint, io) = Endpoint::new(&format!("{}:{}", host, port), ConnectionDirection::Outgoing);
        let role = HandshakeRole::Dialer {
            secret: self.config.secret.clone(),
        };
        let (ready_tx, ready_rx) = oneshot::channel();
        let manager = Arc::clone(self);
        let driven = Arc::clone(&endpoint);
        self.track(tokio::spawn(async move {
            manager.run(driven, io, ws, role, hooks, Some(ready_tx)).await;
        }));

        match ready_rx.await {
            Ok(Ok(())) => Ok(endpoint),
            Ok(Err(e)) => Err(anyhow!("Session with {}:{} failed: {}", host, port, e)),
            Err(_) => Err(anyhow!("Session task for {}:{} ended early", host, port)),
        }
    }

    /// Close every session, stop listening, and wait for all tasks.
    pub async fn shutdown(&self) {
        if !self.shutting_down.swap(true, Ordering::SeqCst) {
            info!("Shutting down connection manager");
        }
        self.shutdown_tx.send_replace(true);

        let endpoints: Vec<_> = self.live().values().cloned().collect();
        for endpoint in endpoints {
            endpoint.close();
        }

        loop {
            let handles = std::mem::take(&mut *self.tasks());
            if handles.is_empty() {
                break;
            }
            for handle in handles {
                if let Err(e) = handle.await {
                    if e.is_panic() {
                        error!("Connection task panicked: {}", e);
                    }
                }
            }
        }
    }

    pub fn is_shutting_down(&self) -> bool {
        self.shutting_down.load(Ordering::SeqCst)
    }

    /// Active sessions.
    pub fn registry(&self) -> &PeerRegistry<Endpoint> {
        &self.registry
    }

    pub fn endpoint(&self, id: &str) -> Option<Arc<Endpoint>> {
        self.registry.get(id)
    }

    pub fn session_count(&self) -> usize {
        self.registry.len()
    }

    /// Upgrade an accepted TCP connection and run its session.
    fn accept(self: &Arc<Self>, stream: TcpStream, addr: SocketAddr, hooks: SessionHooks) {
        let manager = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let upgrade = timeout(manager.config.endpoint.handshake_timeout, accept_async(stream)).await;
            let ws = match upgrade {
                Ok(Ok(ws)) => ws,
                Err(_) => {
                    debug!("WebSocket upgrade from {} timed out", addr);
                    return;
                }
                Ok(Err(e)) => {
                    // Port probes connect and close without an upgrade.
                    let err_str = e.to_string();
                    if err_str.contains("Handshake not finished")
                        || err_str.contains("Connection reset")
                        || err_str.contains("unexpected EOF")
                    {
                        debug!("Connection closed before handshake from {}", addr);
                    } else {
                        error!("WebSocket upgrade failed for {}: {}", addr, e);
                    }
                    return;
                }
            };
            info!("New connection from {}", addr);

            let (endpoint, io) = Endpoint::new(&addr.to_string(), ConnectionDirection::Incoming);
            let role = HandshakeRole::Acceptor {
                secret: manager.config.secret.clone(),
            };
            Arc::clone(&manager).run(endpoint, io, ws, role, hooks, None).await;
        });
        self.track(handle);
    }

    async fn run<S>(
        self: Arc<Self>,
        endpoint: Arc<Endpoint>,
        io: EndpointIo,
        ws: WebSocketStream<S>,
        role: HandshakeRole,
        hooks: SessionHooks,
        ready: Option<oneshot::Sender<Result<(), EndpointError>>>,
    ) where
        S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    {
        let serial = self.next_serial.fetch_add(1, Ordering::Relaxed);
        self.live().insert(serial, Arc::clone(&endpoint));
        if self.is_shutting_down() {
            endpoint.close();
        }

        let ready = Mutex::new(ready);
        let result = endpoint
            .drive(io, ws, role, &self.config.endpoint, |active| {
                if !self.registry.insert(Arc::clone(active), active.direction()) {
                    warn!("Replaced existing session for {}", active.id());
                }
                hooks.started(active);
                if let Some(tx) = take_ready(&ready) {
                    let _ = tx.send(Ok(()));
                }
            })
            .await;
        self.live().remove(&serial);

        match result {
            Ok(exit) => {
                let current = self
                    .registry
                    .get(endpoint.id())
                    .is_some_and(|registered| Arc::ptr_eq(&registered, &endpoint));
                if current {
                    self.registry.remove(endpoint.id());
                }
                match exit {
                    EndpointExit::Closed => hooks.stopped(&endpoint),
                    EndpointExit::Lost(e) => hooks.error(&endpoint, &e),
                }
            }
            Err(e) => {
                if let Some(tx) = take_ready(&ready) {
                    let _ = tx.send(Err(e));
                }
            }
        }
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn live(&self) -> MutexGuard<'_, HashMap<u64, Arc<Endpoint>>> {
        self.live.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn take_ready<T>(ready: &Mutex<Option<T>>) -> Option<T> {
    ready.lock().unwrap_or_else(|e| e.into_inner()).take()
}
