//! Server lifecycle: bind, accept, orderly shutdown.
//!
//! State machine: IDLE → STARTING → {STARTED | START_ERROR}; from STARTED
//! or START_ERROR through STOPPING back to IDLE. `start` is only legal
//! from IDLE or START_ERROR, `stop` only from STARTED or START_ERROR;
//! anything else is reported to the caller synchronously.

use std::collections::HashMap;
use std::net::Shutdown;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use http::Method;
use may::coroutine::JoinHandle;
use may::net::{TcpListener, TcpStream};
use tracing::{error, info, warn};

use super::connection::serve_connection;
use crate::dispatcher::Dispatcher;
use crate::error::Error;
use crate::middleware::{Middleware, MiddlewareChain};
use crate::request::Request;
use crate::response::Response;
use crate::router::RouteTree;
use crate::runtime_config::RuntimeConfig;
use crate::static_files::FileServant;
use crate::ws::BroadcastRegistry;
use crate::zip_files::ZipServant;

/// Open connections, tracked so shutdown can close their sockets and let
/// the per-connection coroutines unwind on their own.
pub(crate) struct ConnectionTable {
    streams: Mutex<HashMap<u64, TcpStream>>,
    next_id: AtomicU64,
}

impl ConnectionTable {
    fn new() -> Self {
        ConnectionTable {
            streams: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    fn insert(&self, stream: TcpStream) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.streams.lock().unwrap().insert(id, stream);
        id
    }

    fn remove(&self, id: u64) {
        self.streams.lock().unwrap().remove(&id);
    }

    fn shutdown_all(&self) {
        let drained: Vec<TcpStream> = {
            let mut streams = self.streams.lock().unwrap();
            streams.drain().map(|(_, s)| s).collect()
        };
        for stream in drained {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }
}

/// Removes a connection's table entry when the connection ends, or earlier
/// when the connection upgrades to WebSocket (teardown is the broadcast
/// registry's job from that point on).
pub(crate) struct ConnectionGuard {
    table: Arc<ConnectionTable>,
    id: Option<u64>,
}

impl ConnectionGuard {
    pub(crate) fn release(&mut self) {
        if let Some(id) = self.id.take() {
            self.table.remove(id);
        }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.release();
    }
}

struct Running {
    port: u16,
    accept: JoinHandle<()>,
    connections: Arc<ConnectionTable>,
}

enum LifecycleState {
    Idle,
    Starting,
    Started(Running),
    StartError,
    Stopping,
}

/// Shared server state: the route tree, interceptor chain, dispatcher,
/// and broadcast registry, composed the same way for every connection.
pub(crate) struct ServerInner {
    pub(crate) tree: RwLock<RouteTree>,
    pub(crate) middleware: RwLock<MiddlewareChain>,
    pub(crate) dispatcher: RwLock<Dispatcher>,
    pub(crate) registry: BroadcastRegistry,
    pub(crate) config: RuntimeConfig,
    state: Mutex<LifecycleState>,
}

/// An embeddable HTTP/1.1 + WebSocket server.
///
/// Created empty, configured with routes, servants and middleware, then
/// started on a port (0 picks any free port). The route tree is treated
/// as immutable once the server has started; declare everything first.
///
/// ```no_run
/// use portico::{Response, Server};
/// use serde_json::json;
///
/// let server = Server::new();
/// server
///     .get("/hello", |_req| {
///         Response::json(200, &json!({ "message": "Hello, World!" }))
///     })
///     .unwrap();
/// let port = server.start(0).unwrap();
/// server.broadcast("ready");
/// server.stop().unwrap();
/// # let _ = port;
/// ```
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Default for Server {
    fn default() -> Self {
        Self::new()
    }
}

impl Server {
    /// An empty server with the default runtime configuration.
    pub fn new() -> Self {
        Self::with_config(RuntimeConfig::from_env())
    }

    /// An empty server with an explicit runtime configuration.
    pub fn with_config(config: RuntimeConfig) -> Self {
        Server {
            inner: Arc::new(ServerInner {
                tree: RwLock::new(RouteTree::new()),
                middleware: RwLock::new(MiddlewareChain::new()),
                dispatcher: RwLock::new(Dispatcher::new()),
                registry: BroadcastRegistry::new(),
                config,
                state: Mutex::new(LifecycleState::Idle),
            }),
        }
    }

    /// Declare a route: `method` on `path` handled by `handler`.
    ///
    /// Path segments are '/'-separated; a literal segment matches
    /// case-insensitively and a `:name` segment captures one non-empty
    /// segment as a path parameter.
    pub fn route<F>(&self, method: Method, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        let name = format!("{method} {path}");
        self.inner
            .tree
            .write()
            .unwrap()
            .register(path, method, &name)?;
        let mut dispatcher = self.inner.dispatcher.write().unwrap();
        // Safety: the handler is 'static and the runtime stack size comes
        // from this server's configuration.
        unsafe {
            dispatcher.register_handler(&name, &self.inner.config, handler);
        }
        Ok(self)
    }

    pub fn get<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::GET, path, handler)
    }

    pub fn post<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::POST, path, handler)
    }

    pub fn put<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::PUT, path, handler)
    }

    pub fn delete<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::DELETE, path, handler)
    }

    pub fn patch<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::PATCH, path, handler)
    }

    pub fn head<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::HEAD, path, handler)
    }

    pub fn options<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::OPTIONS, path, handler)
    }

    pub fn trace<F>(&self, path: &str, handler: F) -> Result<&Self, Error>
    where
        F: Fn(&Request) -> Response + Send + 'static,
    {
        self.route(Method::TRACE, path, handler)
    }

    /// Attach a directory-backed static servant at `path`.
    pub fn file(&self, path: &str, directory: impl Into<PathBuf>) -> Result<&Self, Error> {
        self.inner
            .tree
            .write()
            .unwrap()
            .register_file(path, FileServant::new(directory))?;
        Ok(self)
    }

    /// Attach an archive-backed static servant at `path`. The archive is
    /// decoded once, here; a malformed archive fails the registration.
    pub fn zip(&self, path: &str, archive: &[u8]) -> Result<&Self, Error> {
        let servant = ZipServant::from_bytes(archive)?;
        self.inner
            .tree
            .write()
            .unwrap()
            .register_zip(path, servant)?;
        Ok(self)
    }

    /// Install an interceptor; its kind decides the dispatch point.
    pub fn middleware(&self, mw: Middleware) -> &Self {
        self.inner.middleware.write().unwrap().push(mw);
        self
    }

    /// Bind and start serving. Returns the actual bound port (useful with
    /// port 0). Legal only from IDLE or START_ERROR.
    pub fn start(&self, port: u16) -> Result<u16, Error> {
        {
            let mut state = self.inner.state.lock().unwrap();
            match *state {
                LifecycleState::Idle | LifecycleState::StartError => {
                    *state = LifecycleState::Starting;
                }
                _ => return Err(Error::Lifecycle("server is not idle")),
            }
        }

        self.inner.config.apply();

        let listener = match TcpListener::bind(("127.0.0.1", port)) {
            Ok(l) => l,
            Err(e) => {
                error!(port, error = %e, "bind failed");
                *self.inner.state.lock().unwrap() = LifecycleState::StartError;
                return Err(Error::Io(e));
            }
        };
        let actual_port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(e) => {
                *self.inner.state.lock().unwrap() = LifecycleState::StartError;
                return Err(Error::Io(e));
            }
        };

        let connections = Arc::new(ConnectionTable::new());
        let accept_inner = Arc::clone(&self.inner);
        let accept_connections = Arc::clone(&connections);
        let accept = may::go!(move || {
            accept_loop(listener, accept_inner, accept_connections);
        });

        *self.inner.state.lock().unwrap() = LifecycleState::Started(Running {
            port: actual_port,
            accept,
            connections,
        });
        info!(port = actual_port, "server started");
        Ok(actual_port)
    }

    /// Orderly shutdown: disconnect WebSocket peers, stop accepting, close
    /// open connections. Legal only from STARTED or START_ERROR.
    pub fn stop(&self) -> Result<(), Error> {
        let running = {
            let mut state = self.inner.state.lock().unwrap();
            match std::mem::replace(&mut *state, LifecycleState::Stopping) {
                LifecycleState::Started(running) => Some(running),
                LifecycleState::StartError => None,
                previous => {
                    *state = previous;
                    return Err(Error::Lifecycle(
                        "server is not started nor failed to start",
                    ));
                }
            }
        };

        self.inner.registry.disconnect();

        if let Some(running) = running {
            // Safety: cancelling the accept coroutine unwinds it at its
            // blocking accept; the listener is dropped during unwind.
            unsafe {
                running.accept.coroutine().cancel();
            }
            let _ = running.accept.join();
            running.connections.shutdown_all();
            info!(port = running.port, "server stopped");
        }

        *self.inner.state.lock().unwrap() = LifecycleState::Idle;
        Ok(())
    }

    /// The bound port while the server is running.
    pub fn port(&self) -> Option<u16> {
        match &*self.inner.state.lock().unwrap() {
            LifecycleState::Started(running) => Some(running.port),
            _ => None,
        }
    }

    /// Fan a text frame out to all connected WebSocket peers without
    /// waiting for the writes to complete.
    pub fn broadcast(&self, text: &str) {
        self.inner.registry.broadcast(text);
    }

    /// Fan a text frame out, awaiting each peer's write in registration
    /// order.
    pub fn broadcast_sequential(&self, text: &str) {
        self.inner.registry.broadcast_sequential(text);
    }

    /// The broadcast registry, for peer inspection and failure hooks.
    pub fn broadcast_registry(&self) -> BroadcastRegistry {
        self.inner.registry.clone()
    }

    /// Print all registered routes to stdout.
    ///
    /// Useful for verifying the declared route set before starting.
    pub fn dump_routes(&self) {
        let patterns = self.inner.tree.read().unwrap().route_patterns();
        println!("[routes] count={}", patterns.len());
        for pattern in patterns {
            println!("[route] {pattern}");
        }
    }
}

fn accept_loop(
    listener: TcpListener,
    inner: Arc<ServerInner>,
    connections: Arc<ConnectionTable>,
) {
    for incoming in listener.incoming() {
        match incoming {
            Ok(stream) => {
                let id = match stream.try_clone() {
                    Ok(clone) => Some(connections.insert(clone)),
                    Err(e) => {
                        warn!(error = %e, "could not track connection");
                        None
                    }
                };
                let guard = ConnectionGuard {
                    table: Arc::clone(&connections),
                    id,
                };
                let conn_inner = Arc::clone(&inner);
                may::go!(move || {
                    serve_connection(stream, conn_inner, guard);
                });
            }
            Err(e) => {
                warn!(error = %e, "accept failed");
            }
        }
    }
}
