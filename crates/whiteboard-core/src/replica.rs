//! Board replica: the boards one peer owns and mirrors, and the board
//! events it exchanges with owners, subscribers, and the index server.
//!
//! Owned boards are mutated through the version gate and pushed as whole
//! snapshots to their subscribers. Mirrors are never mutated in place: local
//! edits on a mirror are forwarded to the owner, and the mirror changes only
//! when the owner's snapshot is adopted.
//!
//! Every handler here is synchronous and only queues sends, so it can run
//! inline on an endpoint's receive loop.

use crate::board::{
    Adoption, BoardDescriptor, BoardError, BoardSlot, BoardStore, BoardUpdate, DescriptorError,
    Snapshot, UpdateKind, Whiteboard, WhiteboardPath,
};
use crate::events::{BoardEvent, EventBus};
use crate::protocol::{codes, names};
use crate::subscriptions::SubscriptionSet;
use crate::transport::PeerLink;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReplicaError {
    #[error("No such board: {0}")]
    UnknownBoard(String),

    #[error("Board {0} is a mirror")]
    NotLocal(String),

    #[error("Owner of {0} is not connected")]
    SourceUnavailable(String),

    #[error("Board {0} is no longer shared")]
    Withdrawn(String),

    #[error("No board selected")]
    NoSelection,

    #[error("Stale version for {descriptor}: expected {expected}, board is at {current}")]
    StaleVersion {
        descriptor: String,
        expected: u64,
        current: u64,
    },

    #[error(transparent)]
    Board(#[from] BoardError),

    #[error(transparent)]
    Descriptor(#[from] DescriptorError),
}

/// A local edit request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mutation {
    AppendPath(WhiteboardPath),
    Undo,
    Clear,
}

impl Mutation {
    pub fn kind(&self) -> UpdateKind {
        match self {
            Self::AppendPath(_) => UpdateKind::Path,
            Self::Undo => UpdateKind::Undo,
            Self::Clear => UpdateKind::Clear,
        }
    }

    fn into_path(self) -> Option<WhiteboardPath> {
        match self {
            Self::AppendPath(path) => Some(path),
            Self::Undo | Self::Clear => None,
        }
    }
}

/// What happened to a local edit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationOutcome {
    /// Applied to an owned board; carries the new version
    Applied(u64),
    /// Sent to the owner of a mirror
    Forwarded,
}

/// Row for board listings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardSummary {
    pub descriptor: BoardDescriptor,
    pub version: u64,
    pub paths: usize,
    pub shared: bool,
    pub remote: bool,
}

/// Event carrying a remote update of this kind.
pub fn update_event(kind: UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Path => names::BOARD_PATH_UPDATE,
        UpdateKind::Undo => names::BOARD_UNDO_UPDATE,
        UpdateKind::Clear => names::BOARD_CLEAR_UPDATE,
    }
}

/// Event acknowledging an accepted update of this kind.
pub fn accepted_event(kind: UpdateKind) -> &'static str {
    match kind {
        UpdateKind::Path => names::BOARD_PATH_ACCEPTED,
        UpdateKind::Undo => names::BOARD_UNDO_ACCEPTED,
        UpdateKind::Clear => names::BOARD_CLEAR_ACCEPTED,
    }
}

pub struct BoardReplica<P> {
    host: String,
    port: u16,
    store: BoardStore<P>,
    subscriptions: SubscriptionSet<P>,
    /// Boards the index currently announces as shared by others
    announced: RwLock<HashSet<BoardDescriptor>>,
    /// Endpoint id → boards requested from or mirrored from that endpoint
    remote_index: RwLock<HashMap<String, HashSet<BoardDescriptor>>>,
    index_link: RwLock<Option<Arc<P>>>,
    selected: RwLock<Option<BoardDescriptor>>,
    events: Arc<EventBus>,
    last_board_millis: AtomicU64,
}

impl<P: PeerLink> BoardReplica<P> {
    /// A replica for the peer listening on `host:port`.
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_string(),
            port,
            store: BoardStore::new(),
            subscriptions: SubscriptionSet::new(),
            announced: RwLock::new(HashSet::new()),
            remote_index: RwLock::new(HashMap::new()),
            index_link: RwLock::new(None),
            selected: RwLock::new(None),
            events: Arc::new(EventBus::new()),
            last_board_millis: AtomicU64::new(0),
        }
    }

    /// `host:port` that owner descriptors of local boards carry.
    pub fn local_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn events(&self) -> &Arc<EventBus> {
        &self.events
    }

    // ==================== Local operations ====================

    /// Create an empty local board named `board<millis>` and select it.
    pub fn create_board(&self) -> Result<BoardDescriptor, ReplicaError> {
        let board_id = format!("board{}", self.next_board_millis());
        let descriptor = BoardDescriptor::new(&self.host, self.port, &board_id)?;
        self.store.insert_local(Whiteboard::local(descriptor.clone()));
        *self.selected.write().unwrap_or_else(|e| e.into_inner()) = Some(descriptor.clone());

        info!("Created board {}", descriptor);
        self.events.emit(BoardEvent::Changed {
            descriptor: descriptor.clone(),
            version: 0,
        });
        Ok(descriptor)
    }

    pub fn select_board(&self, descriptor: &BoardDescriptor) -> Result<(), ReplicaError> {
        if !self.store.contains(descriptor) {
            return Err(ReplicaError::UnknownBoard(descriptor.to_string()));
        }
        *self.selected.write().unwrap_or_else(|e| e.into_inner()) = Some(descriptor.clone());
        Ok(())
    }

    pub fn selected(&self) -> Option<BoardDescriptor> {
        self.selected
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn snapshot(&self, descriptor: &BoardDescriptor) -> Option<Snapshot> {
        self.store.snapshot(descriptor)
    }

    pub fn boards(&self) -> Vec<BoardSummary> {
        self.store
            .descriptors()
            .into_iter()
            .filter_map(|descriptor| {
                let slot = self.store.get(&descriptor)?;
                let board = slot.lock();
                Some(BoardSummary {
                    version: board.version(),
                    paths: board.paths().len(),
                    shared: board.is_shared(),
                    remote: board.is_remote(),
                    descriptor,
                })
            })
            .collect()
    }

    pub fn append_path(
        &self,
        descriptor: &BoardDescriptor,
        path: WhiteboardPath,
        expected: u64,
    ) -> Result<MutationOutcome, ReplicaError> {
        self.mutate(descriptor, Mutation::AppendPath(path), expected)
    }

    pub fn undo(&self, descriptor: &BoardDescriptor, expected: u64) -> Result<MutationOutcome, ReplicaError> {
        self.mutate(descriptor, Mutation::Undo, expected)
    }

    pub fn clear(&self, descriptor: &BoardDescriptor, expected: u64) -> Result<MutationOutcome, ReplicaError> {
        self.mutate(descriptor, Mutation::Clear, expected)
    }

    /// Apply `mutation` to an owned board, or forward it to a mirror's owner.
    pub fn mutate(
        &self,
        descriptor: &BoardDescriptor,
        mutation: Mutation,
        expected: u64,
    ) -> Result<MutationOutcome, ReplicaError> {
        let slot = self.slot(descriptor)?;
        let kind = mutation.kind();
        let update = BoardUpdate {
            descriptor: descriptor.clone(),
            expected_version: expected,
            path: mutation.into_path(),
        };

        if slot.is_remote() {
            let source = slot
                .source()
                .ok_or_else(|| ReplicaError::SourceUnavailable(descriptor.to_string()))?;
            source
                .emit(update_event(kind), &update.to_string())
                .map_err(|_| ReplicaError::SourceUnavailable(descriptor.to_string()))?;
            debug!("Forwarded {:?} on {} to {}", kind, descriptor, source.id());
            return Ok(MutationOutcome::Forwarded);
        }

        let (result, snapshot) = apply_locked(&slot, kind, &update);
        match result {
            Ok(version) => {
                self.publish(&snapshot);
                Ok(MutationOutcome::Applied(version))
            }
            Err(BoardError::StaleVersion { expected, current }) => {
                self.events.emit(BoardEvent::Rejected {
                    descriptor: descriptor.clone(),
                    version: current,
                });
                Err(ReplicaError::StaleVersion {
                    descriptor: descriptor.to_string(),
                    expected,
                    current,
                })
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Mark a local board shared or not, telling the index server on change.
    pub fn set_shared(&self, descriptor: &BoardDescriptor, shared: bool) -> Result<(), ReplicaError> {
        let slot = self.slot(descriptor)?;
        let changed = {
            let mut board = slot.lock();
            if board.is_remote() {
                return Err(ReplicaError::NotLocal(descriptor.to_string()));
            }
            let changed = board.is_shared() != shared;
            board.set_shared(shared);
            changed
        };

        if changed {
            let event_name = if shared {
                names::SHARE_BOARD
            } else {
                names::UNSHARE_BOARD
            };
            self.tell_index(event_name, descriptor);
        }
        Ok(())
    }

    /// Remove a board from this peer.
    ///
    /// A shared local board is unshared at the index and its subscribers get
    /// `BOARD_DELETED`; a mirror unlistens from its owner.
    pub fn delete_board(&self, descriptor: &BoardDescriptor) -> Result<(), ReplicaError> {
        let slot = self
            .store
            .remove(descriptor)
            .ok_or_else(|| ReplicaError::UnknownBoard(descriptor.to_string()))?;
        let (remote, shared) = {
            let board = slot.lock();
            (board.is_remote(), board.is_shared())
        };

        if remote {
            if let Some(source) = slot.source() {
                send(&source, names::BOARD_UNLISTEN, &descriptor.to_string());
            }
            self.forget_remote(descriptor);
        } else {
            if shared {
                self.tell_index(names::UNSHARE_BOARD, descriptor);
            }
            for link in self.subscriptions.remove_board(descriptor) {
                send(&link, names::BOARD_DELETED, &descriptor.to_string());
            }
        }

        info!("Deleted board {}", descriptor);
        self.removed(descriptor);
        Ok(())
    }

    /// Send `SHARE_BOARD` for every local shared board. Returns how many.
    pub fn reannounce_shared(&self) -> usize {
        let shared: Vec<_> = self
            .boards()
            .into_iter()
            .filter(|b| b.shared && !b.remote)
            .map(|b| b.descriptor)
            .collect();
        for descriptor in &shared {
            self.tell_index(names::SHARE_BOARD, descriptor);
        }
        shared.len()
    }

    /// Delete every board (process shutdown).
    pub fn shutdown(&self) {
        for descriptor in self.store.descriptors() {
            if let Err(e) = self.delete_board(&descriptor) {
                debug!("Board {} already gone: {}", descriptor, e);
            }
        }
    }

    // ==================== Index link ====================

    /// Use `link` as the index connection and re-announce shared boards.
    pub fn attach_index(&self, link: Arc<P>) -> usize {
        *self.index_link.write().unwrap_or_else(|e| e.into_inner()) = Some(link);
        self.reannounce_shared()
    }

    pub fn index_link(&self) -> Option<Arc<P>> {
        self.index_link
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Handle `SHARING_BOARD`. Returns the board to subscribe to, if any.
    pub fn on_sharing_board(&self, payload: &str) -> Result<Option<BoardDescriptor>, ReplicaError> {
        let descriptor: BoardDescriptor = payload.parse()?;
        if descriptor.owner_address() == self.local_address() {
            return Ok(None);
        }
        self.announced_boards().insert(descriptor.clone());
        if self.store.contains(&descriptor) {
            return Ok(None);
        }
        debug!("Board {} is available", descriptor);
        Ok(Some(descriptor))
    }

    /// Handle `UNSHARING_BOARD`: drop the mirror if there is one, and cancel
    /// a subscription still on its way to the owner.
    pub fn on_unsharing_board(&self, payload: &str) -> Result<bool, ReplicaError> {
        let descriptor: BoardDescriptor = payload.parse()?;
        self.announced_boards().remove(&descriptor);
        // Waits out a snapshot being adopted, so the check below sees it.
        self.forget_remote(&descriptor);

        let is_mirror = self
            .store
            .get(&descriptor)
            .is_some_and(|slot| slot.is_remote());
        if is_mirror {
            self.delete_board(&descriptor)?;
        }
        Ok(is_mirror)
    }

    /// Ask `owner` for an announced board: `BOARD_LISTEN` then
    /// `GET_BOARD_DATA`. Fails with `Withdrawn` once the board is unshared.
    pub fn subscribe(&self, owner: &Arc<P>, descriptor: &BoardDescriptor) -> Result<(), ReplicaError> {
        {
            let announced = self.announced.read().unwrap_or_else(|e| e.into_inner());
            if !announced.contains(descriptor) {
                return Err(ReplicaError::Withdrawn(descriptor.to_string()));
            }
            self.remote_index
                .write()
                .unwrap_or_else(|e| e.into_inner())
                .entry(owner.id().to_string())
                .or_default()
                .insert(descriptor.clone());
        }

        let payload = descriptor.to_string();
        for event_name in [names::BOARD_LISTEN, names::GET_BOARD_DATA] {
            owner
                .emit(event_name, &payload)
                .map_err(|_| ReplicaError::SourceUnavailable(descriptor.to_string()))?;
        }
        info!("Subscribed to {} via {}", descriptor, owner.id());
        Ok(())
    }

    // ==================== Owner side ====================

    /// Handle `BOARD_LISTEN`. Returns true for a new subscription.
    pub fn on_listen(&self, from: &Arc<P>, payload: &str) -> Result<bool, ReplicaError> {
        let (descriptor, _) = self.owned_board(from, payload)?;
        let added = self.subscriptions.listen(&descriptor, from);
        debug!("{} listens to {}", from.id(), descriptor);
        Ok(added)
    }

    /// Handle `BOARD_UNLISTEN`.
    pub fn on_unlisten(&self, from: &Arc<P>, payload: &str) -> bool {
        match payload.parse::<BoardDescriptor>() {
            Ok(descriptor) => self.subscriptions.unlisten(&descriptor, from.id()),
            Err(_) => false,
        }
    }

    /// Handle `GET_BOARD_DATA`: one snapshot to the requester.
    pub fn on_get_board_data(&self, from: &Arc<P>, payload: &str) -> Result<(), ReplicaError> {
        let (_, slot) = self.owned_board(from, payload)?;
        send(from, names::BOARD_DATA, &slot.snapshot().to_string());
        Ok(())
    }

    /// Handle `BOARD_*_UPDATE` through the same gate as local edits.
    ///
    /// Accepted: `BOARD_*_ACCEPTED` echoing the payload, then `BOARD_DATA` to
    /// every subscriber. Stale: `BOARD_ERROR STALE_VERSION`, then
    /// `BOARD_DATA_OVERRIDE` so the sender converges.
    pub fn on_remote_update(&self, from: &Arc<P>, kind: UpdateKind, payload: &str) -> Result<u64, ReplicaError> {
        let update = match BoardUpdate::parse(kind, payload) {
            Ok(update) => update,
            Err(e) => {
                send(from, names::BOARD_ERROR, codes::MALFORMED_PAYLOAD);
                return Err(e.into());
            }
        };
        let slot = self.owned_slot(from, &update.descriptor)?;

        let (result, snapshot) = apply_locked(&slot, kind, &update);
        match result {
            Ok(version) => {
                send(from, accepted_event(kind), payload);
                self.publish(&snapshot);
                Ok(version)
            }
            Err(BoardError::StaleVersion { expected, current }) => {
                debug!(
                    "Rejected {:?} from {} on {}: expected {}, at {}",
                    kind, from.id(), update.descriptor, expected, current
                );
                send(from, names::BOARD_ERROR, codes::STALE_VERSION);
                send(from, names::BOARD_DATA_OVERRIDE, &snapshot.to_string());
                Err(ReplicaError::StaleVersion {
                    descriptor: update.descriptor.to_string(),
                    expected,
                    current,
                })
            }
            Err(e) => {
                send(from, names::BOARD_ERROR, codes::MALFORMED_PAYLOAD);
                Err(e.into())
            }
        }
    }

    // ==================== Subscriber side ====================

    /// Handle `BOARD_DATA` (`force = false`) or `BOARD_DATA_OVERRIDE`.
    ///
    /// Snapshots for boards never requested from `from` are ignored, so a
    /// late broadcast cannot resurrect a deleted mirror.
    pub fn on_board_data(&self, from: &Arc<P>, payload: &str, force: bool) -> Result<Adoption, ReplicaError> {
        let snapshot: Snapshot = payload.parse()?;
        let descriptor = snapshot.descriptor.clone();
        let version = snapshot.version;

        let adoption = {
            let requested = self.remote_index.read().unwrap_or_else(|e| e.into_inner());
            if !requested.get(from.id()).is_some_and(|boards| boards.contains(&descriptor)) {
                debug!("Ignoring unrequested snapshot of {} from {}", descriptor, from.id());
                return Ok(Adoption::Ignored);
            }
            self.store.adopt(snapshot, from.id(), from, force)
        };
        if adoption.is_adopted() {
            debug!("Adopted {} v{} from {}", descriptor, version, from.id());
            self.events.emit(BoardEvent::Changed { descriptor, version });
        }
        Ok(adoption)
    }

    /// Handle `BOARD_*_ACCEPTED`. The snapshot that follows does the work.
    pub fn on_accepted(&self, from: &Arc<P>, kind: UpdateKind, payload: &str) {
        debug!("{} accepted {:?}: {}", from.id(), kind, payload);
    }

    /// Handle `BOARD_DELETED`: drop the mirror sourced from `from`.
    pub fn on_board_deleted(&self, from: &Arc<P>, payload: &str) -> Result<bool, ReplicaError> {
        let descriptor: BoardDescriptor = payload.parse()?;
        let removed = self.store.remove_mirror_from(&descriptor, from.id());
        self.forget_remote(&descriptor);
        if removed {
            info!("Owner deleted board {}", descriptor);
            self.removed(&descriptor);
        }
        Ok(removed)
    }

    /// Handle `BOARD_ERROR`.
    pub fn on_board_error(&self, from: &Arc<P>, code: &str) {
        warn!("Board error from {}: {}", from.id(), code);
    }

    // ==================== Endpoint loss ====================

    /// Forget an endpoint: its subscriptions, the mirrors it sourced, and the
    /// index link if it was that. Returns the mirrors removed.
    pub fn on_endpoint_lost(&self, id: &str) -> Vec<BoardDescriptor> {
        let dropped = self.subscriptions.drop_endpoint(id);

        {
            let mut index = self.index_link.write().unwrap_or_else(|e| e.into_inner());
            if index.as_ref().is_some_and(|link| link.id() == id) {
                *index = None;
            }
        }

        let sourced = self
            .remote_index
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .unwrap_or_default();

        let mut removed: Vec<_> = sourced
            .into_iter()
            .filter(|descriptor| self.store.remove_mirror_from(descriptor, id))
            .collect();
        removed.sort_by_key(|d| d.to_string());
        for descriptor in &removed {
            self.removed(descriptor);
        }

        if dropped > 0 || !removed.is_empty() {
            info!(
                "Endpoint {} lost: {} subscriptions, {} mirrors dropped",
                id,
                dropped,
                removed.len()
            );
        }
        removed
    }

    // ==================== Heartbeat ====================

    /// Re-send the snapshot of every board that has subscribers.
    /// Returns how many boards were broadcast.
    pub fn heartbeat(&self) -> usize {
        let mut broadcast = 0;
        for descriptor in self.subscriptions.boards() {
            if let Some(snapshot) = self.store.snapshot(&descriptor) {
                self.subscriptions
                    .broadcast(&descriptor, names::BOARD_DATA, &snapshot.to_string());
                broadcast += 1;
            }
        }
        broadcast
    }

    pub fn has_subscribers(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    // ==================== Internals ====================

    fn slot(&self, descriptor: &BoardDescriptor) -> Result<Arc<BoardSlot<P>>, ReplicaError> {
        self.store
            .get(descriptor)
            .ok_or_else(|| ReplicaError::UnknownBoard(descriptor.to_string()))
    }

    /// Parse a descriptor payload naming a board owned here, answering the
    /// requester with `BOARD_ERROR` when it is not.
    fn owned_board(
        &self,
        from: &Arc<P>,
        payload: &str,
    ) -> Result<(BoardDescriptor, Arc<BoardSlot<P>>), ReplicaError> {
        let descriptor: BoardDescriptor = match payload.parse() {
            Ok(descriptor) => descriptor,
            Err(e) => {
                send(from, names::BOARD_ERROR, codes::MALFORMED_PAYLOAD);
                return Err(ReplicaError::Descriptor(e));
            }
        };
        let slot = self.owned_slot(from, &descriptor)?;
        Ok((descriptor, slot))
    }

    fn owned_slot(&self, from: &Arc<P>, descriptor: &BoardDescriptor) -> Result<Arc<BoardSlot<P>>, ReplicaError> {
        let Some(slot) = self.store.get(descriptor) else {
            send(from, names::BOARD_ERROR, codes::BOARD_NOT_FOUND);
            return Err(ReplicaError::UnknownBoard(descriptor.to_string()));
        };
        if slot.is_remote() {
            send(from, names::BOARD_ERROR, codes::NOT_BOARD_OWNER);
            return Err(ReplicaError::NotLocal(descriptor.to_string()));
        }
        Ok(slot)
    }

    /// Push a snapshot to subscribers and tell the surface.
    ///
    /// Snapshots are taken under the board lock but sent after it is released,
    /// so two broadcasts may arrive out of order; mirrors only adopt strictly
    /// newer versions, which absorbs that.
    fn publish(&self, snapshot: &Snapshot) {
        let sent = self.subscriptions.broadcast(
            &snapshot.descriptor,
            names::BOARD_DATA,
            &snapshot.to_string(),
        );
        debug!("{} v{} sent to {} subscribers", snapshot.descriptor, snapshot.version, sent);
        self.events.emit(BoardEvent::Changed {
            descriptor: snapshot.descriptor.clone(),
            version: snapshot.version,
        });
    }

    fn tell_index(&self, event_name: &str, descriptor: &BoardDescriptor) {
        match self.index_link() {
            Some(link) => send(&link, event_name, &descriptor.to_string()),
            None => debug!("Index not connected, {} {} deferred", event_name, descriptor),
        }
    }

    fn announced_boards(&self) -> std::sync::RwLockWriteGuard<'_, HashSet<BoardDescriptor>> {
        self.announced.write().unwrap_or_else(|e| e.into_inner())
    }

    fn forget_remote(&self, descriptor: &BoardDescriptor) {
        let mut index = self.remote_index.write().unwrap_or_else(|e| e.into_inner());
        index.retain(|_, boards| {
            boards.remove(descriptor);
            !boards.is_empty()
        });
    }

    fn removed(&self, descriptor: &BoardDescriptor) {
        {
            let mut selected = self.selected.write().unwrap_or_else(|e| e.into_inner());
            if selected.as_ref() == Some(descriptor) {
                *selected = None;
            }
        }
        self.events.emit(BoardEvent::Removed {
            descriptor: descriptor.clone(),
        });
    }

    /// Epoch millis, bumped past the last id handed out.
    fn next_board_millis(&self) -> u64 {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        let mut last = self.last_board_millis.load(Ordering::SeqCst);
        loop {
            let next = now.max(last + 1);
            match self.last_board_millis.compare_exchange(
                last,
                next,
                Ordering::SeqCst,
                Ordering::SeqCst,
            ) {
                Ok(_) => return next,
                Err(actual) => last = actual,
            }
        }
    }
}

/// Check-and-apply under the board lock, snapshotting in the same section.
fn apply_locked<P>(
    slot: &BoardSlot<P>,
    kind: UpdateKind,
    update: &BoardUpdate,
) -> (Result<u64, BoardError>, Snapshot) {
    let mut board = slot.lock();
    let result = board.apply(kind, update);
    (result, board.snapshot())
}

fn send<P: PeerLink>(link: &Arc<P>, event_name: &str, payload: &str) {
    if let Err(e) = link.emit(event_name, payload) {
        warn!("Failed to send {} to {}: {}", event_name, link.id(), e);
    }
}
