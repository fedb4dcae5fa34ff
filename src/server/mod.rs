//! # Server Module
//!
//! The serving side of the crate: the byte-stream assembler, the per-request
//! conductor, the per-connection coroutine, and the [`Server`] lifecycle
//! facade that the embedding application configures and starts.
//!
//! ## Architecture
//!
//! ```text
//! bytes → Assembler → Conductor → (on-request middleware) → Route Tree
//!       → Handler | FileServant | ZipServant → (on-response middleware)
//!       → socket
//! ```
//!
//! Upgrade requests divert at the conductor: on-upgrade middleware, then
//! the RFC 6455 handshake and registration with the broadcast registry;
//! subsequent frames are handled by the connection's frame loop.
//!
//! One accept coroutine feeds one coroutine per connection; a connection
//! is only ever touched from its own coroutine. Responses are materialized
//! in full and written in dispatch order.

mod assembler;
mod conductor;
mod connection;
mod lifecycle;

pub use lifecycle::Server;
