//! Broadcast registry: the set of connected WebSocket peers and the text
//! frame fan-out.
//!
//! Iteration always works on a snapshot of the peer list, so peers may be
//! added or removed concurrently with a broadcast. The parallel variant
//! enqueues onto each peer's writer and returns without waiting; the
//! sequential variant awaits every peer's write in registration order.

use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use may::net::TcpStream;
use may::sync::mpsc;
use tracing::{debug, info, warn};

use super::frame::{close_payload, encode_frame, CLOSE_NORMAL, OP_TEXT};
use super::peer::{Peer, WriteFailure};

type FailureHook = Arc<dyn Fn(u64, &io::Error) + Send + Sync>;

struct RegistryInner {
    peers: RwLock<Vec<Arc<Peer>>>,
    next_id: AtomicU64,
    on_write_failure: RwLock<Option<FailureHook>>,
}

/// Tracks connected peers and fans out text frames.
///
/// Cloning is cheap; clones share the same peer set.
#[derive(Clone)]
pub struct BroadcastRegistry {
    inner: Arc<RegistryInner>,
}

impl Default for BroadcastRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl BroadcastRegistry {
    pub fn new() -> Self {
        BroadcastRegistry {
            inner: Arc::new(RegistryInner {
                peers: RwLock::new(Vec::new()),
                next_id: AtomicU64::new(1),
                on_write_failure: RwLock::new(None),
            }),
        }
    }

    /// Install a hook observing per-peer write failures. The failed peer
    /// has already been removed when the hook runs.
    pub fn set_write_failure_hook<F>(&self, hook: F)
    where
        F: Fn(u64, &io::Error) + Send + Sync + 'static,
    {
        *self.inner.on_write_failure.write().unwrap() = Some(Arc::new(hook));
    }

    /// Register a connection as a broadcast peer, spawning its writer.
    ///
    /// The writer's failure path removes the peer from this registry and
    /// then runs the installed hook, so a broken peer never lingers.
    pub(crate) fn add(&self, stream: &TcpStream) -> io::Result<Arc<Peer>> {
        let id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        let weak: Weak<RegistryInner> = Arc::downgrade(&self.inner);
        let on_failure: WriteFailure = Arc::new(move |peer_id, error| {
            if let Some(inner) = weak.upgrade() {
                inner
                    .peers
                    .write()
                    .unwrap()
                    .retain(|p| p.id() != peer_id);
                let hook = inner.on_write_failure.read().unwrap().clone();
                if let Some(hook) = hook {
                    hook(peer_id, error);
                }
            }
        });
        let peer = Peer::spawn(id, stream, on_failure)?;
        self.inner.peers.write().unwrap().push(Arc::clone(&peer));
        info!(peer = id, peer_count = self.peer_count(), "websocket peer registered");
        Ok(peer)
    }

    /// Remove a peer; its writer exits once the command channel drains.
    pub fn remove(&self, peer_id: u64) {
        let mut peers = self.inner.peers.write().unwrap();
        if let Some(pos) = peers.iter().position(|p| p.id() == peer_id) {
            let peer = peers.remove(pos);
            peer.mark_inactive();
            debug!(peer = peer_id, peer_count = peers.len(), "websocket peer removed");
        }
    }

    fn snapshot(&self) -> Vec<Arc<Peer>> {
        self.inner.peers.read().unwrap().clone()
    }

    /// Fan a text frame out to every live peer without waiting for the
    /// writes to complete.
    ///
    /// The frame is encoded once; every enqueue retains its own reference.
    /// A peer whose writer has already exited is dropped silently (the
    /// channel-closed case); actual socket failures surface through the
    /// write-failure hook from the peer's own writer.
    pub fn broadcast(&self, text: &str) {
        let frame = Arc::new(encode_frame(OP_TEXT, text.as_bytes()));
        for peer in self.snapshot() {
            if !peer.is_active() {
                continue;
            }
            if peer.send_frame(Arc::clone(&frame)).is_err() {
                warn!(peer = peer.id(), "peer channel closed, dropping");
                self.remove(peer.id());
            }
        }
    }

    /// Fan a text frame out, awaiting each peer's write in registration
    /// order. Failed peers are removed before the next peer is written.
    pub fn broadcast_sequential(&self, text: &str) {
        let frame = Arc::new(encode_frame(OP_TEXT, text.as_bytes()));
        for peer in self.snapshot() {
            if !peer.is_active() {
                continue;
            }
            let (ack_tx, ack_rx) = mpsc::channel();
            if peer.send_acked(Arc::clone(&frame), ack_tx).is_err() {
                warn!(peer = peer.id(), "peer channel closed, dropping");
                self.remove(peer.id());
                continue;
            }
            match ack_rx.recv() {
                Ok(Ok(())) => {}
                Ok(Err(_)) | Err(_) => {
                    // Writer already removed itself via the failure path;
                    // make removal idempotent for the channel-loss case.
                    self.remove(peer.id());
                }
            }
        }
    }

    /// Close every peer with a normal-closure frame and clear the set.
    pub fn disconnect(&self) {
        let drained: Vec<Arc<Peer>> = {
            let mut peers = self.inner.peers.write().unwrap();
            std::mem::take(&mut *peers)
        };
        info!(peer_count = drained.len(), "disconnecting all websocket peers");
        for peer in drained {
            if peer.is_active() {
                peer.close(close_payload(CLOSE_NORMAL));
            }
        }
    }

    /// Number of currently registered peers.
    pub fn peer_count(&self) -> usize {
        self.inner.peers.read().unwrap().len()
    }
}
