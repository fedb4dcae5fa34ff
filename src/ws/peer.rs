//! Connected WebSocket peer handles.
//!
//! Each peer owns an outbound command channel drained by a dedicated
//! writer coroutine, which is the only place the socket is written after
//! the upgrade. Broadcast frames arrive as reference-counted buffers, so a
//! fan-out to N peers encodes once and every enqueue holds its own retained
//! reference until the write completes.

use std::io::{self, Write};
use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use may::net::TcpStream;
use may::sync::mpsc;
use tracing::{debug, warn};

use super::frame::{encode_frame, OP_CLOSE};

/// Invoked from a peer's writer coroutine when a socket write fails.
pub(crate) type WriteFailure = Arc<dyn Fn(u64, &io::Error) + Send + Sync>;

pub(crate) enum PeerCommand {
    /// Fire-and-forget frame bytes (shared, reference-counted).
    Frame(Arc<Vec<u8>>),
    /// Frame bytes plus a channel acknowledging the write result.
    AckedFrame(Arc<Vec<u8>>, mpsc::Sender<io::Result<()>>),
    /// Write a close frame with this payload, then shut the socket down.
    CloseWith(Vec<u8>),
}

/// Handle to one connected WebSocket peer.
///
/// The writer coroutine deliberately holds only the shared liveness flag,
/// never the `Peer` itself: once every handle is dropped the command
/// channel closes and the writer drains out on its own.
pub struct Peer {
    id: u64,
    active: Arc<AtomicBool>,
    tx: mpsc::Sender<PeerCommand>,
}

impl Peer {
    /// Create the peer and spawn its writer coroutine on a clone of the
    /// connection's stream. `on_failure` runs inside the writer when a
    /// socket write fails, after the peer has been marked inactive.
    pub(crate) fn spawn(
        id: u64,
        stream: &TcpStream,
        on_failure: WriteFailure,
    ) -> io::Result<Arc<Peer>> {
        let mut write_half = stream.try_clone()?;
        let (tx, rx) = mpsc::channel::<PeerCommand>();
        let active = Arc::new(AtomicBool::new(true));
        let peer = Arc::new(Peer {
            id,
            active: Arc::clone(&active),
            tx,
        });

        may::go!(move || {
            for command in rx.iter() {
                match command {
                    PeerCommand::Frame(bytes) => {
                        if let Err(e) = write_half.write_all(&bytes) {
                            active.store(false, Ordering::SeqCst);
                            warn!(peer = id, error = %e, "peer write failed");
                            on_failure(id, &e);
                            break;
                        }
                    }
                    PeerCommand::AckedFrame(bytes, ack) => {
                        let result = write_half.write_all(&bytes);
                        let failed = result.is_err();
                        if let Err(ref e) = result {
                            active.store(false, Ordering::SeqCst);
                            warn!(peer = id, error = %e, "peer write failed");
                            on_failure(id, e);
                        }
                        let _ = ack.send(result);
                        if failed {
                            break;
                        }
                    }
                    PeerCommand::CloseWith(payload) => {
                        let close = encode_frame(OP_CLOSE, &payload);
                        let _ = write_half.write_all(&close);
                        let _ = write_half.shutdown(Shutdown::Both);
                        active.store(false, Ordering::SeqCst);
                        break;
                    }
                }
            }
            debug!(peer = id, "peer writer exited");
        });

        Ok(peer)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Liveness: false once the channel has closed or a write failed.
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    pub(crate) fn mark_inactive(&self) {
        self.active.store(false, Ordering::SeqCst);
    }

    /// Enqueue a retained frame for the writer; fails when the writer has
    /// already exited (channel closed).
    pub(crate) fn send_frame(&self, bytes: Arc<Vec<u8>>) -> Result<(), ()> {
        self.tx.send(PeerCommand::Frame(bytes)).map_err(|_| ())
    }

    pub(crate) fn send_acked(
        &self,
        bytes: Arc<Vec<u8>>,
        ack: mpsc::Sender<io::Result<()>>,
    ) -> Result<(), ()> {
        self.tx
            .send(PeerCommand::AckedFrame(bytes, ack))
            .map_err(|_| ())
    }

    /// Ask the writer to send a close frame and shut the socket down.
    pub(crate) fn close(&self, close_frame_payload: Vec<u8>) {
        let _ = self.tx.send(PeerCommand::CloseWith(close_frame_payload));
    }
}
