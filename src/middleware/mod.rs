//! # Middleware Module
//!
//! Interceptors installed at the three defined dispatch points:
//! on-request (may short-circuit), on-response (maps the response), and
//! on-websocket-upgrade (may refuse the handshake). See
//! [`core::MiddlewareChain`] for the invocation contract and
//! [`cors::CorsConfig`] for the CORS interceptor shipped with the crate.

mod core;
mod cors;

pub use self::core::{Middleware, MiddlewareChain, OnRequestFn, OnResponseFn, OnUpgradeFn};
pub(crate) use self::core::panic_reason;
pub use self::cors::CorsConfig;
