//! Index server: the directory of shared boards.
//!
//! Peers hold one session each with the index. The index never sees board
//! content; it only relays `SHARE_BOARD`/`UNSHARE_BOARD` announcements to the
//! other peers and replays the current directory to each new session.

use crate::config::IndexConfig;
use crate::endpoint::{DispatchTable, Endpoint};
use crate::manager::{ConnectionManager, SessionHooks};
use anyhow::Result;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{debug, info};
use whiteboard_core::protocol::names;
use whiteboard_core::{BoardDescriptor, DirectoryRegistry, PeerLink};

pub struct IndexServer {
    manager: Arc<ConnectionManager>,
    directory: Arc<DirectoryRegistry<Endpoint>>,
    local_addr: SocketAddr,
}

impl IndexServer {
    /// Bind and start serving.
    pub async fn start(config: &IndexConfig) -> Result<Self> {
        let manager = ConnectionManager::new(config.manager_config());
        let directory = Arc::new(DirectoryRegistry::new());
        let local_addr = manager
            .listen(&config.listen, session_hooks(&directory))
            .await?;
        info!("Index server listening on {}", local_addr);

        Ok(Self {
            manager,
            directory,
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Boards currently shared, sorted by board id.
    pub fn shared_boards(&self) -> Vec<BoardDescriptor> {
        self.directory.shared_boards()
    }

    pub fn peer_count(&self) -> usize {
        self.directory.peer_count()
    }

    pub async fn shutdown(&self) {
        self.manager.shutdown().await;
        info!("Index server stopped");
    }
}

fn dispatch_table(directory: &Arc<DirectoryRegistry<Endpoint>>) -> DispatchTable {
    let share = Arc::clone(directory);
    let unshare = Arc::clone(directory);
    DispatchTable::new()
        .on(names::SHARE_BOARD, move |from, payload| {
            if let Ok(descriptor) = share.register_share(from, payload) {
                debug!("{} shared {}", from.id(), descriptor);
            }
        })
        .on(names::UNSHARE_BOARD, move |from, payload| {
            if let Ok(descriptor) = unshare.unregister_share(from, payload) {
                debug!("{} unshared {}", from.id(), descriptor);
            }
        })
}

fn session_hooks(directory: &Arc<DirectoryRegistry<Endpoint>>) -> SessionHooks {
    let table = dispatch_table(directory);
    let started = Arc::clone(directory);
    let stopped = Arc::clone(directory);
    let failed = Arc::clone(directory);

    SessionHooks::new()
        .on_started(move |endpoint| {
            endpoint.install(&table);
            let replayed = started.on_peer_connect(endpoint);
            info!("Peer {} joined, replayed {} shared board(s)", endpoint.id(), replayed);
        })
        .on_stopped(move |endpoint| {
            let removed = stopped.on_peer_disconnect(endpoint.id());
            info!("Peer {} left, {} board(s) unshared", endpoint.id(), removed.len());
        })
        .on_error(move |endpoint, e| {
            let removed = failed.on_peer_disconnect(endpoint.id());
            info!(
                "Peer {} lost ({}), {} board(s) unshared",
                endpoint.id(),
                e,
                removed.len()
            );
        })
}
