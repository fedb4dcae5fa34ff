//! Per-connection serving loop.
//!
//! One coroutine per connection: requests are assembled, conducted, and
//! answered in arrival order. An upgrade head diverts through the
//! on-upgrade middleware and the RFC 6455 handshake; after a successful
//! handshake the same coroutine becomes the connection's frame reader
//! while a dedicated writer coroutine owns the outbound half.

use std::collections::HashMap;
use std::io::{Read, Write};
use std::sync::Arc;

use may::net::TcpStream;
use tracing::{debug, error, info};

use super::assembler::{AssembleError, AssembledMessage, Assembler};
use super::conductor::conduct;
use super::lifecycle::{ConnectionGuard, ServerInner};
use crate::request::{Request, RequestContext};
use crate::response::Response;
use crate::ws::frame::{encode_frame, parse_frame, OP_CLOSE, OP_PING, OP_PONG};
use crate::ws::handshake::handshake_response;
use crate::ws::{BroadcastRegistry, Peer};

fn write_response(stream: &mut TcpStream, resp: &Response) -> std::io::Result<()> {
    stream.write_all(&resp.to_bytes())
}

enum UpgradeOutcome {
    /// Handshake done, peer registered; the connection is WebSocket now.
    Upgraded(Arc<Peer>),
    /// Middleware refused or the head was invalid; the response has been
    /// written and the connection continues as HTTP.
    StayedHttp,
    /// Transport failure while answering.
    Failed,
}

fn upgrade(stream: &mut TcpStream, shared: &ServerInner, ctx: &RequestContext) -> UpgradeOutcome {
    let req = Request::from_context(ctx, HashMap::new(), String::new());

    let chain = shared.middleware.read().unwrap().clone();
    if let Some(resp) = chain.apply_upgrade(&req) {
        info!(path = %ctx.path, status = resp.status, "websocket upgrade refused by middleware");
        let resp = chain.apply_response(&req, resp);
        return match write_response(stream, &resp) {
            Ok(()) => UpgradeOutcome::StayedHttp,
            Err(_) => UpgradeOutcome::Failed,
        };
    }

    match handshake_response(ctx) {
        Ok(bytes) => {
            if let Err(e) = stream.write_all(&bytes) {
                debug!(error = %e, "handshake write failed");
                return UpgradeOutcome::Failed;
            }
            match shared.registry.add(stream) {
                Ok(peer) => {
                    info!(peer = peer.id(), path = %ctx.path, "websocket upgrade complete");
                    UpgradeOutcome::Upgraded(peer)
                }
                Err(e) => {
                    error!(error = %e, "failed to register websocket peer");
                    UpgradeOutcome::Failed
                }
            }
        }
        Err(reason) => {
            debug!(reason, "invalid websocket upgrade request");
            match write_response(stream, &Response::bad_request(reason)) {
                Ok(()) => UpgradeOutcome::StayedHttp,
                Err(_) => UpgradeOutcome::Failed,
            }
        }
    }
}

/// Frame loop after a completed upgrade: answer pings, echo closes, log
/// and ignore data frames. Exits when the peer closes or the transport
/// fails, deregistering the peer either way.
fn websocket_loop(
    mut stream: TcpStream,
    mut buf: Vec<u8>,
    peer: Arc<Peer>,
    registry: BroadcastRegistry,
) {
    let mut chunk = [0u8; 4096];
    loop {
        while let Some((frame, consumed)) = parse_frame(&buf) {
            buf.drain(..consumed);
            match frame.opcode {
                OP_PING => {
                    let pong = encode_frame(OP_PONG, &frame.payload);
                    if peer.send_frame(Arc::new(pong)).is_err() {
                        registry.remove(peer.id());
                        return;
                    }
                }
                OP_CLOSE => {
                    debug!(peer = peer.id(), "close frame received");
                    peer.close(frame.payload);
                    registry.remove(peer.id());
                    return;
                }
                OP_PONG => {}
                other => {
                    debug!(peer = peer.id(), opcode = other, "inbound frame ignored");
                }
            }
        }
        match stream.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => buf.extend_from_slice(&chunk[..n]),
            Err(e) => {
                debug!(peer = peer.id(), error = %e, "websocket read failed");
                break;
            }
        }
    }
    peer.mark_inactive();
    registry.remove(peer.id());
}

/// Serve one accepted connection until it closes or upgrades.
pub(crate) fn serve_connection(
    mut stream: TcpStream,
    shared: Arc<ServerInner>,
    mut guard: ConnectionGuard,
) {
    let mut assembler = Assembler::new();
    loop {
        match assembler.next_message(&mut stream) {
            Ok(None) => break,
            Ok(Some(AssembledMessage::Request(ctx))) => {
                let close_after = ctx.wants_close();
                let resp = conduct(&shared, ctx);
                if write_response(&mut stream, &resp).is_err() {
                    break;
                }
                if close_after {
                    break;
                }
            }
            Ok(Some(AssembledMessage::Upgrade(ctx))) => {
                match upgrade(&mut stream, &shared, &ctx) {
                    UpgradeOutcome::Upgraded(peer) => {
                        // From here on the peer's writer owns shutdown; the
                        // lifecycle must not cut the socket out from under
                        // an in-flight close frame.
                        guard.release();
                        let buffered = assembler.take_buffered();
                        websocket_loop(stream, buffered, peer, shared.registry.clone());
                        return;
                    }
                    UpgradeOutcome::StayedHttp => continue,
                    UpgradeOutcome::Failed => break,
                }
            }
            Err(AssembleError::Malformed(reason)) => {
                debug!(reason = %reason, "malformed request");
                let _ = write_response(&mut stream, &Response::bad_request(reason));
                break;
            }
            Err(AssembleError::Io(e)) => {
                debug!(error = %e, "connection read failed");
                break;
            }
        }
    }
}
