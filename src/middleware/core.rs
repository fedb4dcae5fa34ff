//! Interceptor chain for the dispatch pipeline.
//!
//! Three interceptor kinds, modeled as a sum type rather than a trait
//! hierarchy so the conductor can pattern-match at each dispatch point:
//!
//! - on-request: observes the finalized request and may short-circuit
//!   dispatch by returning a response;
//! - on-response: maps `(request, response)` to a possibly modified
//!   response, each seeing the previous interceptor's output;
//! - on-upgrade: runs before the WebSocket handshake and may refuse it by
//!   returning the response to send instead.
//!
//! Interceptors run in registration order. One that panics produces a 500
//! carrying the panic message and aborts the rest of the chain.

use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use tracing::error;

use crate::request::Request;
use crate::response::Response;

/// Boxed on-request interceptor.
pub type OnRequestFn = dyn Fn(&Request) -> Option<Response> + Send + Sync;
/// Boxed on-response interceptor.
pub type OnResponseFn = dyn Fn(&Request, Response) -> Response + Send + Sync;
/// Boxed on-upgrade interceptor.
pub type OnUpgradeFn = dyn Fn(&Request) -> Option<Response> + Send + Sync;

/// A registered interceptor, tagged by dispatch point.
#[derive(Clone)]
pub enum Middleware {
    OnRequest(Arc<OnRequestFn>),
    OnResponse(Arc<OnResponseFn>),
    OnUpgrade(Arc<OnUpgradeFn>),
}

impl Middleware {
    pub fn on_request<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
        Middleware::OnRequest(Arc::new(f))
    }

    pub fn on_response<F>(f: F) -> Self
    where
        F: Fn(&Request, Response) -> Response + Send + Sync + 'static,
    {
        Middleware::OnResponse(Arc::new(f))
    }

    pub fn on_upgrade<F>(f: F) -> Self
    where
        F: Fn(&Request) -> Option<Response> + Send + Sync + 'static,
    {
        Middleware::OnUpgrade(Arc::new(f))
    }
}

impl fmt::Debug for Middleware {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Middleware::OnRequest(_) => f.write_str("Middleware::OnRequest"),
            Middleware::OnResponse(_) => f.write_str("Middleware::OnResponse"),
            Middleware::OnUpgrade(_) => f.write_str("Middleware::OnUpgrade"),
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_reason(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic".to_string()
    }
}

/// The ordered interceptor list.
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    entries: Vec<Middleware>,
}

impl MiddlewareChain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, mw: Middleware) {
        self.entries.push(mw);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Run the on-request interceptors; the first `Some` short-circuits.
    ///
    /// A panic aborts the chain with a 500 carrying the panic message.
    pub fn apply_request(&self, req: &Request) -> Option<Response> {
        for mw in &self.entries {
            if let Middleware::OnRequest(f) = mw {
                match catch_unwind(AssertUnwindSafe(|| f(req))) {
                    Ok(Some(resp)) => return Some(resp),
                    Ok(None) => {}
                    Err(payload) => {
                        let reason = panic_reason(payload);
                        error!(reason = %reason, "on-request middleware panicked");
                        return Some(Response::internal_error(reason));
                    }
                }
            }
        }
        None
    }

    /// Run the on-response interceptors, each seeing the previous output.
    pub fn apply_response(&self, req: &Request, mut resp: Response) -> Response {
        for mw in &self.entries {
            if let Middleware::OnResponse(f) = mw {
                match catch_unwind(AssertUnwindSafe(|| f(req, resp.clone()))) {
                    Ok(next) => resp = next,
                    Err(payload) => {
                        let reason = panic_reason(payload);
                        error!(reason = %reason, "on-response middleware panicked");
                        return Response::internal_error(reason);
                    }
                }
            }
        }
        resp
    }

    /// Run the on-upgrade interceptors; the first `Some` refuses the
    /// handshake and is sent instead.
    pub fn apply_upgrade(&self, req: &Request) -> Option<Response> {
        for mw in &self.entries {
            if let Middleware::OnUpgrade(f) = mw {
                match catch_unwind(AssertUnwindSafe(|| f(req))) {
                    Ok(Some(resp)) => return Some(resp),
                    Ok(None) => {}
                    Err(payload) => {
                        let reason = panic_reason(payload);
                        error!(reason = %reason, "on-upgrade middleware panicked");
                        return Some(Response::internal_error(reason));
                    }
                }
            }
        }
        None
    }
}
