//! Boards held by one peer, keyed by descriptor.
//!
//! The map lock only guards membership. Each board sits behind its own mutex,
//! so mutations on different boards never contend, and a snapshot taken under
//! a board's mutex can never observe half of a mutation.

use super::descriptor::BoardDescriptor;
use super::whiteboard::{Snapshot, Whiteboard};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, RwLock, Weak};

/// Result of offering an incoming snapshot to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Adoption {
    /// First copy of this board
    Created,
    /// Replaced an older mirror
    Replaced,
    /// Not newer than the held mirror
    Ignored,
    /// The board is owned here; snapshots from elsewhere never touch it
    OwnedLocally,
}

impl Adoption {
    pub fn is_adopted(&self) -> bool {
        matches!(self, Self::Created | Self::Replaced)
    }
}

/// One board and, for mirrors, the endpoint it came from.
///
/// The source is a relation only: the store never keeps an endpoint alive.
pub struct BoardSlot<P> {
    board: Mutex<Whiteboard>,
    source: Option<(String, Weak<P>)>,
}

impl<P> BoardSlot<P> {
    fn new(board: Whiteboard, source: Option<&Arc<P>>, source_id: &str) -> Self {
        Self {
            board: Mutex::new(board),
            source: source.map(|link| (source_id.to_string(), Arc::downgrade(link))),
        }
    }

    /// Lock the board. Hold the guard across check-and-apply.
    pub fn lock(&self) -> MutexGuard<'_, Whiteboard> {
        self.board.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn is_remote(&self) -> bool {
        self.lock().is_remote()
    }

    /// Snapshot taken under the board's lock.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().snapshot()
    }

    pub fn source_id(&self) -> Option<&str> {
        self.source.as_ref().map(|(id, _)| id.as_str())
    }

    /// The source endpoint, if it is still alive.
    pub fn source(&self) -> Option<Arc<P>> {
        self.source.as_ref().and_then(|(_, link)| link.upgrade())
    }
}

/// Thread-safe board map. Wrap in `Arc` for shared ownership.
pub struct BoardStore<P> {
    boards: RwLock<HashMap<BoardDescriptor, Arc<BoardSlot<P>>>>,
}

impl<P> Default for BoardStore<P> {
    fn default() -> Self {
        Self {
            boards: RwLock::new(HashMap::new()),
        }
    }
}

impl<P> BoardStore<P> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a locally owned board. Returns false if the descriptor is taken.
    pub fn insert_local(&self, board: Whiteboard) -> bool {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let descriptor = board.descriptor().clone();
        if boards.contains_key(&descriptor) {
            return false;
        }
        boards.insert(descriptor, Arc::new(BoardSlot::new(board, None, "")));
        true
    }

    /// Offer a snapshot received from `source`.
    ///
    /// A mirror is replaced wholesale when this is the first copy, when the
    /// incoming version is strictly newer, or when `force` is set.
    pub fn adopt(&self, snapshot: Snapshot, source_id: &str, source: &Arc<P>, force: bool) -> Adoption {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());

        let outcome = match boards.get(&snapshot.descriptor) {
            None => Adoption::Created,
            Some(slot) => {
                let held = slot.lock();
                if !held.is_remote() {
                    return Adoption::OwnedLocally;
                }
                if force || snapshot.version > held.version() {
                    Adoption::Replaced
                } else {
                    return Adoption::Ignored;
                }
            }
        };

        let descriptor = snapshot.descriptor.clone();
        let slot = BoardSlot::new(Whiteboard::mirror(snapshot), Some(source), source_id);
        boards.insert(descriptor, Arc::new(slot));
        outcome
    }

    pub fn get(&self, descriptor: &BoardDescriptor) -> Option<Arc<BoardSlot<P>>> {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .get(descriptor)
            .cloned()
    }

    pub fn contains(&self, descriptor: &BoardDescriptor) -> bool {
        self.boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .contains_key(descriptor)
    }

    pub fn remove(&self, descriptor: &BoardDescriptor) -> Option<Arc<BoardSlot<P>>> {
        self.boards
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(descriptor)
    }

    /// Remove a mirror only if it still came from `source_id`.
    pub fn remove_mirror_from(&self, descriptor: &BoardDescriptor, source_id: &str) -> bool {
        let mut boards = self.boards.write().unwrap_or_else(|e| e.into_inner());
        let from_source = boards
            .get(descriptor)
            .is_some_and(|slot| slot.source_id() == Some(source_id));
        if from_source {
            boards.remove(descriptor);
        }
        from_source
    }

    pub fn snapshot(&self, descriptor: &BoardDescriptor) -> Option<Snapshot> {
        self.get(descriptor).map(|slot| slot.snapshot())
    }

    /// All descriptors, sorted for stable listings.
    pub fn descriptors(&self) -> Vec<BoardDescriptor> {
        let mut descriptors: Vec<_> = self
            .boards
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .keys()
            .cloned()
            .collect();
        descriptors.sort_by_key(|d| d.to_string());
        descriptors
    }

    pub fn len(&self) -> usize {
        self.boards.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::whiteboard::{BoardError, WhiteboardPath};
    use std::thread;

    struct Link;

    fn desc(s: &str) -> BoardDescriptor {
        s.parse().unwrap()
    }

    fn snapshot(s: &str) -> Snapshot {
        s.parse().unwrap()
    }

    #[test]
    fn test_insert_local_once() {
        let store: BoardStore<Link> = BoardStore::new();
        assert!(store.insert_local(Whiteboard::local(desc("H:9000:b1"))));
        assert!(!store.insert_local(Whiteboard::local(desc("H:9000:b1"))));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_concurrent_mutations_one_winner() {
        let store: Arc<BoardStore<Link>> = Arc::new(BoardStore::new());
        store.insert_local(Whiteboard::local(desc("H:9000:b1")));

        for round in 0..50u64 {
            let handles: Vec<_> = (0..2)
                .map(|t| {
                    let store = Arc::clone(&store);
                    thread::spawn(move || {
                        let slot = store.get(&desc("H:9000:b1")).unwrap();
                        let path = WhiteboardPath::new(&format!("P{}-{}", round, t)).unwrap();
                        slot.lock().add_path(path, round)
                    })
                })
                .collect();

            let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
            let winners = results.iter().filter(|r| r.is_ok()).count();
            assert_eq!(winners, 1, "round {}", round);
            assert!(results
                .iter()
                .any(|r| matches!(r, Err(BoardError::StaleVersion { .. }))));
        }

        let snapshot = store.snapshot(&desc("H:9000:b1")).unwrap();
        assert_eq!(snapshot.version, 50);
        assert_eq!(snapshot.paths.len(), 50);
    }

    #[test]
    fn test_adopt_first_copy() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        let adoption = store.adopt(snapshot("Y:9000:b2%3%P1"), "y", &link, false);

        assert_eq!(adoption, Adoption::Created);
        let slot = store.get(&desc("Y:9000:b2")).unwrap();
        assert!(slot.lock().is_remote());
        assert_eq!(slot.source_id(), Some("y"));
        assert!(slot.source().is_some());
    }

    #[test]
    fn test_adopt_only_newer() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        store.adopt(snapshot("Y:9000:b2%3%P1"), "y", &link, false);

        assert_eq!(
            store.adopt(snapshot("Y:9000:b2%3%Q"), "y", &link, false),
            Adoption::Ignored
        );
        assert_eq!(
            store.adopt(snapshot("Y:9000:b2%2%"), "y", &link, false),
            Adoption::Ignored
        );
        assert_eq!(store.snapshot(&desc("Y:9000:b2")).unwrap().to_string(), "Y:9000:b2%3%P1");

        assert_eq!(
            store.adopt(snapshot("Y:9000:b2%4%P1%P2"), "y", &link, false),
            Adoption::Replaced
        );
        assert_eq!(store.snapshot(&desc("Y:9000:b2")).unwrap().version, 4);
    }

    #[test]
    fn test_override_ignores_version_order() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        store.adopt(snapshot("Y:9000:b2%7%P1%P2"), "y", &link, false);

        assert_eq!(
            store.adopt(snapshot("Y:9000:b2%5%P1"), "y", &link, true),
            Adoption::Replaced
        );
        assert_eq!(store.snapshot(&desc("Y:9000:b2")).unwrap().to_string(), "Y:9000:b2%5%P1");
    }

    #[test]
    fn test_snapshot_never_replaces_local_board() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        store.insert_local(Whiteboard::local(desc("H:9000:b1")));

        assert_eq!(
            store.adopt(snapshot("H:9000:b1%9%P"), "x", &link, true),
            Adoption::OwnedLocally
        );
        assert_eq!(store.snapshot(&desc("H:9000:b1")).unwrap().version, 0);
    }

    #[test]
    fn test_source_is_not_kept_alive() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        store.adopt(snapshot("Y:9000:b2%1%P"), "y", &link, false);
        drop(link);

        let slot = store.get(&desc("Y:9000:b2")).unwrap();
        assert!(slot.source().is_none());
        assert_eq!(slot.source_id(), Some("y"));
    }

    #[test]
    fn test_remove_mirror_from_checks_source() {
        let store = BoardStore::new();
        let link = Arc::new(Link);
        store.adopt(snapshot("Y:9000:b2%1%P"), "y", &link, false);

        assert!(!store.remove_mirror_from(&desc("Y:9000:b2"), "z"));
        assert!(store.remove_mirror_from(&desc("Y:9000:b2"), "y"));
        assert!(store.is_empty());
    }
}
