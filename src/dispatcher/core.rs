use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Instant;

use may::coroutine;
use may::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::middleware::panic_reason;
use crate::request::Request;
use crate::response::Response;
use crate::runtime_config::RuntimeConfig;

/// One unit of work for a handler coroutine: the immutable request plus
/// the channel the response is sent back on.
pub struct HandlerJob {
    pub request: Request,
    pub reply_tx: mpsc::Sender<Response>,
}

/// Channel sender feeding a handler coroutine.
pub type HandlerSender = mpsc::Sender<HandlerJob>;

/// Dispatcher that routes resolved requests to handler coroutines.
///
/// Every registered handler runs in its own coroutine, consuming jobs from
/// an mpsc channel and replying on a per-request channel. Because handlers
/// live on coroutines, a handler performing coroutine-aware I/O suspends
/// cooperatively; a plain synchronous handler is simply the degenerate
/// case. Panics are caught and converted into 500 responses so one failing
/// handler cannot take the server down.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<String, HandlerSender>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler under the given name, spawning its coroutine.
    ///
    /// Replacing an existing name drops the old sender, which closes the
    /// old coroutine's channel and lets it exit.
    ///
    /// # Safety
    ///
    /// Calls `may::coroutine::Builder::spawn`, which is unsafe by the `may`
    /// runtime's contract: the caller must ensure the coroutine does not
    /// outlive resources it borrows (the handler closure is `'static`
    /// here) and that the runtime is configured with a sufficient stack
    /// size for the handler's call depth.
    pub unsafe fn register_handler<F>(&mut self, name: &str, config: &RuntimeConfig, handler_fn: F)
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        let (tx, rx) = mpsc::channel::<HandlerJob>();
        let name = name.to_string();
        let coroutine_name = name.clone();
        let stack_size = config.stack_size;

        if let Some(old) = self.handlers.remove(&name) {
            drop(old);
            warn!(handler = %name, "replaced existing handler; old coroutine will exit");
        }

        let spawn_result = coroutine::Builder::new()
            .stack_size(stack_size)
            .spawn(move || {
                debug!(handler = %coroutine_name, stack_size, "handler coroutine start");
                for job in rx.iter() {
                    let HandlerJob { request, reply_tx } = job;
                    let started = Instant::now();
                    match catch_unwind(AssertUnwindSafe(|| handler_fn(&request))) {
                        Ok(response) => {
                            debug!(
                                handler = %coroutine_name,
                                status = response.status,
                                latency_us = started.elapsed().as_micros() as u64,
                                "handler complete"
                            );
                            let _ = reply_tx.send(response);
                        }
                        Err(payload) => {
                            let reason = panic_reason(payload);
                            let backtrace = std::backtrace::Backtrace::capture();
                            error!(
                                handler = %coroutine_name,
                                reason = %reason,
                                backtrace = %backtrace,
                                "handler panicked"
                            );
                            let _ = reply_tx.send(Response::internal_error(reason));
                        }
                    }
                }
            });

        match spawn_result {
            Ok(_) => {
                info!(handler = %name, total_handlers = self.handlers.len() + 1, "handler registered");
                self.handlers.insert(name, tx);
            }
            Err(e) => {
                error!(handler = %name, error = %e, "failed to spawn handler coroutine");
            }
        }
    }

    /// Send a request to the named handler and wait for its response.
    ///
    /// The wait suspends the calling coroutine, so a slow handler never
    /// blocks a worker thread. Returns `None` when no handler is
    /// registered under the name.
    pub fn dispatch(&self, name: &str, request: Request) -> Option<Response> {
        let tx = match self.handlers.get(name) {
            Some(tx) => tx,
            None => {
                error!(handler = %name, "handler not registered");
                return None;
            }
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        let method = request.method.clone();
        let path = request.path.clone();
        if tx.send(HandlerJob { request, reply_tx }).is_err() {
            error!(handler = %name, "handler channel closed");
            return Some(Response::internal_error("handler unavailable"));
        }
        match reply_rx.recv() {
            Ok(response) => {
                debug!(handler = %name, method = %method, path = %path, status = response.status, "dispatch complete");
                Some(response)
            }
            Err(e) => {
                error!(handler = %name, error = %e, "handler reply channel closed");
                Some(Response::internal_error("handler unavailable"))
            }
        }
    }

    /// Whether a handler is registered under the name.
    pub fn has_handler(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestContext;
    use http::Method;
    use serde_json::Value;
    use std::collections::HashMap;

    fn request(path: &str) -> Request {
        let ctx = RequestContext {
            method: Method::GET,
            uri: path.to_string(),
            path: path.to_string(),
            query_params: HashMap::new(),
            headers: HashMap::new(),
            body: Vec::new(),
            declared_length: None,
        };
        Request::from_context(&ctx, HashMap::new(), String::new())
    }

    fn dispatcher() -> Dispatcher {
        may::config().set_stack_size(0x8000);
        Dispatcher::new()
    }

    #[test]
    fn test_dispatch_roundtrip() {
        let mut d = dispatcher();
        unsafe {
            d.register_handler("echo_path", &RuntimeConfig::default(), |req| {
                Response::text(200, req.path.clone())
            });
        }
        let resp = d.dispatch("echo_path", request("/somewhere")).unwrap();
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"/somewhere");
    }

    #[test]
    fn test_unregistered_handler_is_none() {
        let d = dispatcher();
        assert!(d.dispatch("missing", request("/x")).is_none());
        assert!(!d.has_handler("missing"));
    }

    #[test]
    fn test_panicking_handler_yields_500_with_reason() {
        let mut d = dispatcher();
        unsafe {
            d.register_handler("broken", &RuntimeConfig::default(), |_req| {
                panic!("kaboom")
            });
        }
        let resp = d.dispatch("broken", request("/x")).unwrap();
        assert_eq!(resp.status, 500);
        let v: Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(v["reason"], "kaboom");
    }

    #[test]
    fn test_replacing_a_handler_keeps_dispatching() {
        let mut d = dispatcher();
        unsafe {
            d.register_handler("h", &RuntimeConfig::default(), |_req| {
                Response::text(200, "old")
            });
            d.register_handler("h", &RuntimeConfig::default(), |_req| {
                Response::text(200, "new")
            });
        }
        let resp = d.dispatch("h", request("/x")).unwrap();
        assert_eq!(resp.body, b"new");
    }
}
