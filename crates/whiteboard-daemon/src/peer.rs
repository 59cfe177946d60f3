//! Whiteboard peer: owns boards, mirrors boards shared by others.
//!
//! A peer holds three kinds of session:
//! - one outgoing session with the index server, re-dialed with backoff
//! - outgoing sessions with the owners of boards it mirrors, one per owner
//! - incoming sessions from peers mirroring (or writing to) its own boards
//!
//! All board logic lives in [`BoardReplica`]; this module wires it to
//! endpoints and spawns the dials the index announcements call for.

use crate::config::PeerConfig;
use crate::endpoint::{DispatchTable, Endpoint, EndpointError};
use crate::heartbeat::SnapshotHeartbeat;
use crate::manager::{ConnectionManager, SessionHooks};
use crate::reconnect::{ReconnectConfig, ReconnectState};
use anyhow::Result;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use whiteboard_core::protocol::names;
use whiteboard_core::replica::{accepted_event, update_event};
use whiteboard_core::{BoardDescriptor, BoardReplica, PeerLink, ReplicaError, UpdateKind};

const UPDATE_KINDS: [UpdateKind; 3] = [UpdateKind::Path, UpdateKind::Undo, UpdateKind::Clear];

pub struct WhiteboardPeer {
    manager: Arc<ConnectionManager>,
    replica: Arc<BoardReplica<Endpoint>>,
    heartbeat: Arc<SnapshotHeartbeat<Endpoint>>,
    /// Owner `host:port` → session used to mirror its boards
    owners: Mutex<HashMap<String, Arc<Endpoint>>>,
    /// Serializes owner dials so one owner gets one session
    dialing: tokio::sync::Mutex<()>,
    local_addr: SocketAddr,
    shutdown_tx: watch::Sender<bool>,
    supervisor: Mutex<Option<JoinHandle<()>>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl WhiteboardPeer {
    /// Bind the peer listener, then start dialing the index.
    pub async fn start(config: PeerConfig) -> Result<Arc<Self>> {
        let manager = ConnectionManager::new(config.manager_config());
        let listener = ConnectionManager::bind(&format!("{}:{}", config.bind, config.port)).await?;
        let local_addr = listener.local_addr()?;

        let replica = Arc::new(BoardReplica::new(&config.host, local_addr.port()));
        let heartbeat = SnapshotHeartbeat::new(Arc::clone(&replica), config.timing.snapshot_heartbeat);
        let (shutdown_tx, _) = watch::channel(false);

        let peer = Arc::new(Self {
            manager,
            replica,
            heartbeat,
            owners: Mutex::new(HashMap::new()),
            dialing: tokio::sync::Mutex::new(()),
            local_addr,
            shutdown_tx,
            supervisor: Mutex::new(None),
            tasks: Mutex::new(Vec::new()),
        });

        peer.manager.serve(listener, peer.peer_hooks(false))?;
        info!("Peer {} listening on {}", peer.replica.local_address(), local_addr);

        let index_lost = Arc::new(Notify::new());
        let supervisor = tokio::spawn(supervise_index(
            Arc::clone(&peer.manager),
            config.index_host.clone(),
            config.index_port,
            peer.index_hooks(&index_lost),
            Arc::clone(&index_lost),
            config.timing.reconnect.clone(),
            peer.shutdown_tx.subscribe(),
        ));
        *peer.supervisor.lock().unwrap_or_else(|e| e.into_inner()) = Some(supervisor);

        Ok(peer)
    }

    pub fn replica(&self) -> &Arc<BoardReplica<Endpoint>> {
        &self.replica
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_index_connected(&self) -> bool {
        self.replica.index_link().is_some()
    }

    /// Number of owners this peer holds a session with.
    pub fn owner_count(&self) -> usize {
        self.owners().len()
    }

    /// Delete every board, close every session, and wait for all tasks.
    pub async fn shutdown(&self) {
        self.replica.shutdown();
        self.heartbeat.stop().await;
        self.shutdown_tx.send_replace(true);

        let supervisor = self.supervisor.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = supervisor {
            let _ = handle.await;
        }
        let handles = std::mem::take(&mut *self.tasks());
        for handle in &handles {
            handle.abort();
        }
        for handle in handles {
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Peer task panicked: {}", e);
                }
            }
        }
        self.manager.shutdown().await;
        info!("Peer {} stopped", self.replica.local_address());
    }

    // ==================== Owner sessions ====================

    /// Subscribe to a board announced by the index.
    async fn subscribe_remote(self: Arc<Self>, descriptor: BoardDescriptor) {
        match self.owner_link(descriptor.host(), descriptor.port()).await {
            Ok(owner) => match self.replica.subscribe(&owner, &descriptor) {
                Ok(()) => {}
                Err(ReplicaError::Withdrawn(_)) => debug!("{} was unshared before subscribing", descriptor),
                Err(e) => warn!("Subscribe to {} failed: {}", descriptor, e),
            },
            Err(e) => warn!("Owner of {} unreachable: {}", descriptor, e),
        }
    }

    /// The session with `host:port`, dialing it if there is none.
    async fn owner_link(self: &Arc<Self>, host: &str, port: u16) -> Result<Arc<Endpoint>> {
        let address = format!("{}:{}", host, port);
        let _dialing = self.dialing.lock().await;

        let existing = self.owners().get(&address).cloned();
        if let Some(endpoint) = existing {
            if !endpoint.is_closing() && self.manager.registry().contains(endpoint.id()) {
                return Ok(endpoint);
            }
        }

        let endpoint = self.manager.connect(host, port, self.peer_hooks(true)).await?;
        self.owners().insert(address, Arc::clone(&endpoint));
        Ok(endpoint)
    }

    fn forget_owner(&self, endpoint: &Arc<Endpoint>) {
        self.owners()
            .retain(|_, owner| !Arc::ptr_eq(owner, endpoint));
    }

    fn spawn(&self, handle: JoinHandle<()>) {
        let mut tasks = self.tasks();
        tasks.retain(|h| !h.is_finished());
        tasks.push(handle);
    }

    // ==================== Wiring ====================

    /// Hooks for peer-to-peer sessions; `owner` marks sessions we dialed.
    fn peer_hooks(self: &Arc<Self>, owner: bool) -> SessionHooks {
        let table = self.peer_table();
        let stopped = Arc::downgrade(self);
        let failed = Arc::downgrade(self);

        SessionHooks::new()
            .on_started(move |endpoint| endpoint.install(&table))
            .on_stopped(move |endpoint| {
                if let Some(peer) = stopped.upgrade() {
                    peer.peer_lost(endpoint, owner, None);
                }
            })
            .on_error(move |endpoint, e| {
                if let Some(peer) = failed.upgrade() {
                    peer.peer_lost(endpoint, owner, Some(e));
                }
            })
    }

    fn peer_lost(&self, endpoint: &Arc<Endpoint>, owner: bool, error: Option<&EndpointError>) {
        if owner {
            self.forget_owner(endpoint);
        }
        let removed = self.replica.on_endpoint_lost(endpoint.id());
        match error {
            Some(e) => warn!("Peer {} lost ({}), {} mirror(s) dropped", endpoint.id(), e, removed.len()),
            None => debug!("Peer {} closed, {} mirror(s) dropped", endpoint.id(), removed.len()),
        }
    }

    /// Hooks for the index session; `lost` wakes the supervisor when it ends.
    fn index_hooks(self: &Arc<Self>, lost: &Arc<Notify>) -> SessionHooks {
        let table = self.index_table();
        let replica = Arc::clone(&self.replica);
        let (stopped, stopped_lost) = (Arc::clone(&self.replica), Arc::clone(lost));
        let (failed, failed_lost) = (Arc::clone(&self.replica), Arc::clone(lost));

        SessionHooks::new()
            .on_started(move |endpoint| {
                endpoint.install(&table);
                let announced = replica.attach_index(Arc::clone(endpoint));
                info!("Index session active, announced {} shared board(s)", announced);
            })
            .on_stopped(move |endpoint| {
                stopped.on_endpoint_lost(endpoint.id());
                info!("Index session closed");
                stopped_lost.notify_one();
            })
            .on_error(move |endpoint, e| {
                failed.on_endpoint_lost(endpoint.id());
                warn!("Index session lost: {}", e);
                failed_lost.notify_one();
            })
    }

    fn index_table(self: &Arc<Self>) -> DispatchTable {
        let sharing = Arc::downgrade(self);
        let unsharing = Arc::clone(&self.replica);

        DispatchTable::new()
            .on(names::SHARING_BOARD, move |_, payload| {
                let Some(peer) = sharing.upgrade() else { return };
                match peer.replica.on_sharing_board(payload) {
                    Ok(Some(descriptor)) => {
                        let task = tokio::spawn(Arc::clone(&peer).subscribe_remote(descriptor));
                        peer.spawn(task);
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Bad SHARING_BOARD {}: {}", payload, e),
                }
            })
            .on(names::UNSHARING_BOARD, move |_, payload| {
                if let Err(e) = unsharing.on_unsharing_board(payload) {
                    warn!("Bad UNSHARING_BOARD {}: {}", payload, e);
                }
            })
            .on(names::ERROR, |from, payload| {
                warn!("Index {} refused a request: {}", from.id(), payload);
            })
    }

    fn peer_table(&self) -> DispatchTable {
        let r = &self.replica;
        let mut table = DispatchTable::new();

        let (replica, heartbeat) = (Arc::clone(r), Arc::clone(&self.heartbeat));
        table = table.on(names::BOARD_LISTEN, move |from, payload| {
            match replica.on_listen(from, payload) {
                Ok(_) => heartbeat.ensure_running(),
                Err(e) => refused(names::BOARD_LISTEN, from, e),
            }
        });

        let replica = Arc::clone(r);
        table = table.on(names::BOARD_UNLISTEN, move |from, payload| {
            replica.on_unlisten(from, payload);
        });

        let replica = Arc::clone(r);
        table = table.on(names::GET_BOARD_DATA, move |from, payload| {
            if let Err(e) = replica.on_get_board_data(from, payload) {
                refused(names::GET_BOARD_DATA, from, e);
            }
        });

        for kind in UPDATE_KINDS {
            let replica = Arc::clone(r);
            table = table.on(update_event(kind), move |from, payload| {
                if let Err(e) = replica.on_remote_update(from, kind, payload) {
                    refused(update_event(kind), from, e);
                }
            });

            let replica = Arc::clone(r);
            table = table.on(accepted_event(kind), move |from, payload| {
                replica.on_accepted(from, kind, payload);
            });
        }

        for (event_name, force) in [(names::BOARD_DATA, false), (names::BOARD_DATA_OVERRIDE, true)] {
            let replica = Arc::clone(r);
            table = table.on(event_name, move |from, payload| {
                if let Err(e) = replica.on_board_data(from, payload, force) {
                    refused(event_name, from, e);
                }
            });
        }

        let replica = Arc::clone(r);
        table = table.on(names::BOARD_DELETED, move |from, payload| {
            if let Err(e) = replica.on_board_deleted(from, payload) {
                refused(names::BOARD_DELETED, from, e);
            }
        });

        let replica = Arc::clone(r);
        table.on(names::BOARD_ERROR, move |from, payload| {
            replica.on_board_error(from, payload);
        })
    }

    fn owners(&self) -> MutexGuard<'_, HashMap<String, Arc<Endpoint>>> {
        self.owners.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn tasks(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn refused(event_name: &str, from: &Arc<Endpoint>, e: ReplicaError) {
    debug!("{} from {} not applied: {}", event_name, from.id(), e);
}

/// Keep a session with the index, re-dialing with backoff when it drops.
async fn supervise_index(
    manager: Arc<ConnectionManager>,
    host: String,
    port: u16,
    hooks: SessionHooks,
    lost: Arc<Notify>,
    reconnect: ReconnectConfig,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut backoff = ReconnectState::new();

    loop {
        let connected = tokio::select! {
            result = manager.connect(&host, port, hooks.clone()) => result,
            _ = shutdown.changed() => return,
        };

        match connected {
            Ok(endpoint) => {
                backoff.reset();
                info!("Connected to index {}", endpoint.id());
                tokio::select! {
                    _ = lost.notified() => {}
                    _ = shutdown.changed() => return,
                }
            }
            Err(e) => warn!("Index {}:{} unreachable: {}", host, port, e),
        }

        let Some(delay) = backoff.next_delay(&reconnect) else {
            error!("Giving up on index after {} attempts", backoff.attempts());
            return;
        };
        debug!("Re-dialing index in {:?}", delay);
        tokio::select! {
            _ = tokio::time::sleep(delay) => {}
            _ = shutdown.changed() => return,
        }
    }
}
