//! # WebSocket Module
//!
//! The upgrade path and the broadcast fabric: RFC 6455 handshake helpers,
//! the frame codec, per-peer writer coroutines, and the registry that fans
//! text frames out to every connected peer.
//!
//! Inbound data frames are not routed to application handlers in this
//! core; the per-connection frame loop answers pings, echoes closes, and
//! logs everything else. Outbound traffic is the broadcast registry's job.

pub mod frame;
pub mod handshake;
mod peer;
mod registry;

pub use peer::Peer;
pub use registry::BroadcastRegistry;
