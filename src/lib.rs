//! # portico
//!
//! A small, embeddable HTTP/1.1 server library for host processes that
//! want a local control API: declare REST routes, serve files from disk or
//! from an in-memory zip archive, upgrade selected requests to WebSocket,
//! and broadcast text frames to every connected peer.
//!
//! ```no_run
//! use portico::{Response, Server};
//! use serde_json::json;
//!
//! let server = Server::new();
//! server
//!     .get("/hello", |_req| {
//!         Response::json(200, &json!({ "message": "Hello, World!" }))
//!     })
//!     .unwrap()
//!     .get("/v/:name", |req| {
//!         Response::text(200, format!("Hello, {}", req.path_param("name").unwrap_or("?")))
//!     })
//!     .unwrap();
//! let port = server.start(0).unwrap();
//! println!("listening on {port}");
//! server.stop().unwrap();
//! ```
//!
//! Serving is coroutine-based on the `may` runtime: one accept coroutine,
//! one coroutine per connection, one per registered handler. Handlers may
//! block on coroutine-aware I/O without stalling a worker thread.

pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod request;
pub mod response;
pub mod router;
pub mod runtime_config;
pub mod server;
pub mod static_files;
pub mod ws;
pub mod zip_files;

pub use error::Error;
pub use middleware::{CorsConfig, Middleware};
pub use request::Request;
pub use response::Response;
pub use runtime_config::RuntimeConfig;
pub use server::Server;
pub use static_files::FileServant;
pub use ws::BroadcastRegistry;
pub use zip_files::ZipServant;
