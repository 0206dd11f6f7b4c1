//! Dispatch server.
//!
//! [`DispatchServer`] owns the TCP listener and the ordered list of
//! registered [`RequestHandler`]s. The listener starts lazily with the first
//! registration and lives until [`DispatchServer::stop`].
//!
//! # Port selection
//!
//! 1. bind address is loopback or unspecified, per [`ListenScope`]
//! 2. with `use_fixed_port`, the configured port is tried first
//! 3. otherwise (or if that fails) up to five OS-assigned free ports are tried
//! 4. if nothing bound and the scope was `Any`, step 3 is repeated on loopback
//!
//! # Request flow
//!
//! Each accepted connection is served on its own task, so the accept loop
//! is ready for the next connection before the current one is processed.
//! Non-GET requests get `405`. The path and query are URL-decoded, leading
//! slashes are trimmed, and the first handler whose route matches
//! processes the request; no match gives `404`. Handler errors and panics
//! are logged and answered with `500`.

use futures::FutureExt;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use std::convert::Infallible;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use vigate_common::{GateError, ListenScope, Result, ServerConfig};

use crate::handler::{HandlerResponse, HyperResponse, IncomingRequest, RequestHandler};

/// Free-port candidates tried per bind address.
const PORT_ATTEMPTS: usize = 5;

type HandlerList = RwLock<Vec<Arc<dyn RequestHandler>>>;

enum ServerState {
    Uninitialized,
    Listening {
        addr: SocketAddr,
        shutdown: oneshot::Sender<()>,
        task: JoinHandle<()>,
    },
    Stopped,
}

/// HTTP listener that routes requests to registered handlers.
pub struct DispatchServer {
    config: ServerConfig,
    handlers: Arc<HandlerList>,
    state: Mutex<ServerState>,
}

impl DispatchServer {
    /// Creates a server that has not bound any socket yet.
    ///
    /// # Arguments
    ///
    /// * `config` - Listen scope and port preference used when the first
    ///   handler is registered
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            handlers: Arc::new(RwLock::new(Vec::new())),
            state: Mutex::new(ServerState::Uninitialized),
        }
    }

    /// Appends `handler` to the routing list, starting the listener on the
    /// first call. Must be called from within a Tokio runtime.
    ///
    /// Handlers are tried in registration order; the first match wins.
    ///
    /// # Errors
    ///
    /// - [`GateError::Stopped`] after [`DispatchServer::stop`]
    /// - [`GateError::Bind`] if no port could be bound or no runtime is
    ///   available
    pub fn register(&self, handler: Arc<dyn RequestHandler>) -> Result<()> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            ServerState::Stopped => return Err(GateError::Stopped),
            ServerState::Uninitialized => *state = self.start()?,
            ServerState::Listening { .. } => {}
        }

        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(handler);
        Ok(())
    }

    /// Removes every handler registered for `path`. Returns whether any was
    /// removed.
    pub fn unregister(&self, path: &str) -> bool {
        let path = path.trim_start_matches('/');
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = handlers.len();
        handlers.retain(|handler| !handler.route().path().eq_ignore_ascii_case(path));
        let removed = handlers.len() != before;
        if removed {
            tracing::info!(url = path, "Handler unregistered");
        }
        removed
    }

    /// Number of registered handlers.
    pub fn handler_count(&self) -> usize {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Address the listener is bound to, once started.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        match *self.state.lock().unwrap_or_else(PoisonError::into_inner) {
            ServerState::Listening { addr, .. } => Some(addr),
            _ => None,
        }
    }

    /// Bound port, or `None` before the first registration and after
    /// [`DispatchServer::stop`].
    pub fn port(&self) -> Option<u16> {
        self.local_addr().map(|addr| addr.port())
    }

    pub fn is_listening(&self) -> bool {
        self.local_addr().is_some()
    }

    /// Stops accepting connections. The server cannot be restarted.
    pub fn stop(&self) {
        let previous = std::mem::replace(
            &mut *self.state.lock().unwrap_or_else(PoisonError::into_inner),
            ServerState::Stopped,
        );
        if let ServerState::Listening {
            addr,
            shutdown,
            task,
        } = previous
        {
            if shutdown.send(()).is_err() {
                task.abort();
            }
            tracing::info!(%addr, "Dispatch server stopped");
        }
    }

    fn start(&self) -> Result<ServerState> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| GateError::Bind(format!("No Tokio runtime: {}", e)))?;

        let listener = bind_listener(&self.config)?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let listener = {
            let _guard = runtime.enter();
            TcpListener::from_std(listener)?
        };

        let (shutdown, stop_signal) = oneshot::channel();
        let task = runtime.spawn(accept_loop(
            listener,
            Arc::clone(&self.handlers),
            stop_signal,
        ));

        tracing::info!(%addr, "Dispatch server listening");
        Ok(ServerState::Listening {
            addr,
            shutdown,
            task,
        })
    }
}

impl Drop for DispatchServer {
    fn drop(&mut self) {
        self.stop();
    }
}

fn bind_listener(config: &ServerConfig) -> Result<std::net::TcpListener> {
    let ip = config.listen.ip();

    if config.use_fixed_port {
        match std::net::TcpListener::bind((ip, config.port)) {
            Ok(listener) => return Ok(listener),
            Err(e) => tracing::warn!(
                port = config.port,
                error = %e,
                "Configured port unavailable, falling back to a free port"
            ),
        }
    }

    if let Some(listener) = bind_free_port(ip) {
        return Ok(listener);
    }

    if config.listen == ListenScope::Any {
        tracing::warn!("Could not bind on all interfaces, falling back to loopback");
        if let Some(listener) = bind_free_port(ListenScope::Local.ip()) {
            return Ok(listener);
        }
    }

    Err(GateError::Bind(format!(
        "No port could be bound on {} after {} attempts",
        ip, PORT_ATTEMPTS
    )))
}

fn bind_free_port(ip: IpAddr) -> Option<std::net::TcpListener> {
    for attempt in 1..=PORT_ATTEMPTS {
        let port = match free_port() {
            Ok(port) => port,
            Err(e) => {
                tracing::debug!(attempt, error = %e, "Could not obtain a free port");
                continue;
            }
        };
        match std::net::TcpListener::bind((ip, port)) {
            Ok(listener) => return Some(listener),
            Err(e) => tracing::debug!(attempt, port, error = %e, "Bind attempt failed"),
        }
    }
    None
}

/// Asks the OS for a currently unused port.
fn free_port() -> std::io::Result<u16> {
    let scratch = std::net::TcpListener::bind((Ipv4Addr::LOCALHOST, 0))?;
    Ok(scratch.local_addr()?.port())
}

async fn accept_loop(
    listener: TcpListener,
    handlers: Arc<HandlerList>,
    mut stop_signal: oneshot::Receiver<()>,
) {
    loop {
        let accepted = tokio::select! {
            _ = &mut stop_signal => break,
            accepted = listener.accept() => accepted,
        };

        let (stream, peer) = match accepted {
            Ok(connection) => connection,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to accept connection");
                tokio::time::sleep(Duration::from_millis(10)).await;
                continue;
            }
        };

        let handlers = Arc::clone(&handlers);
        tokio::spawn(async move {
            let service = service_fn(move |req: Request<Incoming>| {
                let handlers = Arc::clone(&handlers);
                async move { Ok::<_, Infallible>(dispatch(&handlers, req).await) }
            });

            if let Err(err) = http1::Builder::new()
                .serve_connection(TokioIo::new(stream), service)
                .await
            {
                tracing::debug!(%peer, error = %err, "Connection closed with error");
            }
        });
    }
}

/// Routes one request to the first matching handler.
pub(crate) async fn dispatch<B>(handlers: &HandlerList, req: Request<B>) -> HyperResponse {
    if req.method() != Method::GET {
        return HandlerResponse::status(StatusCode::METHOD_NOT_ALLOWED).into_http();
    }

    let (parts, _body) = req.into_parts();
    let target = parts
        .uri
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");

    let outcome = AssertUnwindSafe(route_request(handlers, target, &parts.headers))
        .catch_unwind()
        .await;

    let response = match outcome {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            tracing::error!(uri = target, error = %e, "Request failed");
            HandlerResponse::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
        Err(_) => {
            tracing::error!(uri = target, "Request handler panicked");
            HandlerResponse::status(StatusCode::INTERNAL_SERVER_ERROR)
        }
    };
    response.into_http()
}

async fn route_request(
    handlers: &HandlerList,
    target: &str,
    headers: &HeaderMap,
) -> Result<HandlerResponse> {
    let decoded = urlencoding::decode(target)
        .map_err(|e| GateError::InvalidRequest(format!("Bad URL encoding: {}", e)))?;
    let path = decoded.trim_start_matches('/');

    let handler = handlers
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .iter()
        .find(|handler| handler.matches(path))
        .cloned();

    match handler {
        Some(handler) => {
            let request = IncomingRequest {
                target: path.to_string(),
                headers: headers.clone(),
            };
            handler.process(&request).await
        }
        None => {
            tracing::debug!(path, "No handler matched");
            Ok(HandlerResponse::status(StatusCode::NOT_FOUND))
        }
    }
}
