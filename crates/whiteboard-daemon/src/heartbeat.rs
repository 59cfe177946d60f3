//! Periodic snapshot re-broadcast for boards with subscribers.
//!
//! A subscriber that missed an update, or reconnected, converges on the next
//! beat. The task runs only while some board has subscribers: it stops after
//! a beat that broadcast nothing and is restarted by the next `BOARD_LISTEN`.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error};
use whiteboard_core::{BoardReplica, PeerLink};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

pub struct SnapshotHeartbeat<P> {
    replica: Arc<BoardReplica<P>>,
    interval: Duration,
    running: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<P: PeerLink + 'static> SnapshotHeartbeat<P> {
    pub fn new(replica: Arc<BoardReplica<P>>, interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            replica,
            interval,
            running: AtomicBool::new(false),
            task: Mutex::new(None),
        })
    }

    /// Start the beat unless it is already running.
    pub fn ensure_running(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("Snapshot heartbeat started");
        let heartbeat = Arc::clone(self);
        let handle = tokio::spawn(async move { heartbeat.beat().await });
        *self.task.lock().unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Stop the beat and wait until its task has ended.
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(handle) = task {
            handle.abort();
            if let Err(e) = handle.await {
                if e.is_panic() {
                    error!("Snapshot heartbeat panicked: {}", e);
                }
            }
        }
        self.running.store(false, Ordering::SeqCst);
    }

    async fn beat(&self) {
        loop {
            tokio::time::sleep(self.interval).await;
            if self.replica.heartbeat() > 0 {
                continue;
            }

            self.running.store(false, Ordering::SeqCst);
            // A listener may have arrived between the beat and the store; if so
            // and nobody restarted us, keep going.
            if self.replica.has_subscribers() && !self.running.swap(true, Ordering::SeqCst) {
                continue;
            }
            debug!("Snapshot heartbeat idle, stopping");
            return;
        }
    }
}
