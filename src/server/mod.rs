//! Async TCP server using Tokio.
//!
//! Accepts TCP connections, parses HTTP/1.1 requests, and hands each one to a
//! shared [`Dispatcher`]. Connections are persistent (keep-alive) by default.
//! [`Server::run_with_shutdown`] stops accepting when a signal fires and gives
//! in-flight connections a grace period to finish.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::dispatcher::Dispatcher;
use crate::http::{
    StatusCode,
    request::{Request, RequestError},
    response::Response,
};

/// Errors produced by the server.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },
}

/// Default cap on a buffered request, headers plus body (8 MiB).
pub const DEFAULT_MAX_REQUEST_SIZE: usize = 8 * 1024 * 1024;

/// Initial read buffer capacity per connection.
const INITIAL_BUF_SIZE: usize = 4096;

/// The waygate HTTP server.
///
/// # Examples
///
/// ```rust,no_run
/// use std::time::Duration;
///
/// use waygate::config::{Config, ErrorConfig};
/// use waygate::context::Context;
/// use waygate::dispatcher::Dispatcher;
/// use waygate::http::Method;
/// use waygate::server::{Server, shutdown_signal};
/// use waygate::service::ServiceRegistry;
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let mut config = Config::new();
///     config.add("/hello", Method::Get, "hello")?;
///     let mut services = ServiceRegistry::new();
///     services.register("hello", |ctx: &mut Context<'_>| {
///         ctx.set_body("Hello!");
///         Ok(())
///     })?;
///     let dispatcher = Dispatcher::build(config, services, ErrorConfig::new())?;
///
///     let server = Server::bind("127.0.0.1:8080").await?;
///     server
///         .run_with_shutdown(dispatcher, shutdown_signal(), Duration::from_secs(5))
///         .await?;
///     Ok(())
/// }
/// ```
pub struct Server {
    listener: TcpListener,
    local_addr: SocketAddr,
    max_request_size: usize,
}

impl Server {
    /// Binds the server to the given TCP address.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Bind`] if the address cannot be bound
    /// (e.g. port already in use, insufficient permissions).
    pub async fn bind(addr: impl AsRef<str>) -> Result<Self, ServerError> {
        let addr = addr.as_ref();
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| ServerError::Bind {
                addr: addr.to_owned(),
                source: e,
            })?;
        let local_addr = listener.local_addr()?;
        Ok(Self {
            listener,
            local_addr,
            max_request_size: DEFAULT_MAX_REQUEST_SIZE,
        })
    }

    /// Returns the local address the server is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Caps how many bytes one request may occupy before it is answered with
    /// `413 Payload Too Large`.
    #[must_use]
    pub fn max_request_size(mut self, bytes: usize) -> Self {
        self.max_request_size = bytes;
        self
    }

    /// Serves requests with `dispatcher` until the process is terminated.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run(self, dispatcher: Dispatcher) -> Result<(), ServerError> {
        self.run_with_shutdown(dispatcher, std::future::pending(), Duration::ZERO)
            .await
    }

    /// Serves requests until `shutdown` resolves, then drains.
    ///
    /// Once `shutdown` fires, no new connections are accepted, idle keep-alive
    /// connections are closed, and requests already being handled finish. Any
    /// connection still open after `grace` is aborted.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Io`] if the TCP listener itself fails.
    pub async fn run_with_shutdown<S>(
        self,
        dispatcher: Dispatcher,
        shutdown: S,
        grace: Duration,
    ) -> Result<(), ServerError>
    where
        S: Future<Output = ()>,
    {
        let dispatcher = Arc::new(dispatcher);
        let (stop_tx, stop_rx) = watch::channel(false);
        let mut connections = JoinSet::new();
        tokio::pin!(shutdown);

        info!(address = %self.local_addr, "waygate listening");

        loop {
            tokio::select! {
                () = &mut shutdown => break,
                accepted = self.listener.accept() => {
                    let (stream, peer_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            error!(error = %e, "failed to accept connection");
                            continue;
                        }
                    };

                    debug!(peer = %peer_addr, "connection accepted");
                    let connection = Connection {
                        peer_addr,
                        dispatcher: Arc::clone(&dispatcher),
                        max_request_size: self.max_request_size,
                        stop: stop_rx.clone(),
                    };

                    connections.spawn(async move {
                        if let Err(e) = connection.serve(stream).await {
                            warn!(peer = %peer_addr, error = %e, "connection closed with error");
                        }
                    });
                }
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        }

        drop(self.listener);
        info!(in_flight = connections.len(), "shutting down");
        let _ = stop_tx.send(true);

        let drained = tokio::time::timeout(grace, async {
            while connections.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(
                aborted = connections.len(),
                "grace period elapsed, aborting connections"
            );
            connections.shutdown().await;
        }

        info!("server stopped");
        Ok(())
    }
}

/// Resolves on Ctrl-C, or on SIGTERM where signals exist.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl-C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("received Ctrl-C"),
        () = terminate => info!("received SIGTERM"),
    }
}

// Everything one connection task needs.
struct Connection {
    peer_addr: SocketAddr,
    dispatcher: Arc<Dispatcher>,
    max_request_size: usize,
    stop: watch::Receiver<bool>,
}

impl Connection {
    /// Handles a single TCP connection over its lifetime.
    ///
    /// HTTP/1.1 connections are persistent by default: we loop, reading one
    /// request per iteration, until the peer closes the connection, signals
    /// `Connection: close`, or the server starts shutting down.
    async fn serve(mut self, mut stream: TcpStream) -> Result<(), std::io::Error> {
        let peer_addr = self.peer_addr;
        let mut buf = BytesMut::with_capacity(INITIAL_BUF_SIZE);
        // False while `buf` may already hold a pipelined request.
        let mut need_read = true;

        loop {
            if buf.is_empty() && *self.stop.borrow() {
                break;
            }

            if need_read {
                let bytes_read = tokio::select! {
                    read = stream.read_buf(&mut buf) => read?,
                    _ = self.stop.changed(), if buf.is_empty() => {
                        debug!(peer = %peer_addr, "closing idle connection for shutdown");
                        break;
                    }
                };

                if bytes_read == 0 {
                    debug!(peer = %peer_addr, "connection closed by peer");
                    break;
                }
            }
            need_read = true;

            if buf.len() > self.max_request_size {
                warn!(peer = %peer_addr, "request too large — sending 413");
                let response = Response::new(StatusCode::PayloadTooLarge)
                    .body("Request entity too large")
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }

            let (mut request, body_offset) = match Request::parse(&buf) {
                Ok(pair) => pair,
                Err(RequestError::Incomplete) => continue,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "bad request — sending 400");
                    let response = Response::new(StatusCode::BadRequest)
                        .body(format!("Bad Request: {e}"))
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    break;
                }
            };

            // Only Content-Length framing is supported.
            if request.headers().contains("transfer-encoding") {
                warn!(peer = %peer_addr, "chunked request body — sending 501");
                let response = Response::new(StatusCode::NotImplemented)
                    .body("Transfer-Encoding is not supported")
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
            let content_length = match request.headers().get("content-length") {
                None => 0,
                Some(_) => match request.content_length() {
                    Some(len) => len,
                    None => {
                        warn!(peer = %peer_addr, "invalid Content-Length — sending 400");
                        let response = Response::new(StatusCode::BadRequest)
                            .body("Bad Request: invalid Content-Length")
                            .keep_alive(false);
                        stream.write_all(&response.into_bytes()).await?;
                        break;
                    }
                },
            };

            let total_needed = match body_offset.checked_add(content_length) {
                Some(total) if total <= self.max_request_size => total,
                _ => {
                    warn!(
                        peer = %peer_addr,
                        content_length,
                        "declared body too large — sending 413"
                    );
                    let response = Response::new(StatusCode::PayloadTooLarge)
                        .body("Request entity too large")
                        .keep_alive(false);
                    stream.write_all(&response.into_bytes()).await?;
                    break;
                }
            };

            // Wait for the full body to arrive.
            if buf.len() < total_needed {
                continue;
            }
            request.truncate_body(content_length);

            let keep_alive = request.is_keep_alive() && !*self.stop.borrow();

            debug!(
                peer = %peer_addr,
                method = %request.method(),
                path = %request.path(),
                "dispatching request"
            );

            let response = self.dispatcher.handle(&request).keep_alive(keep_alive);
            stream.write_all(&response.into_bytes()).await?;
            stream.flush().await?;

            let _ = buf.split_to(total_needed);
            need_read = buf.is_empty();

            if !keep_alive {
                debug!(peer = %peer_addr, "Connection: close — shutting down");
                break;
            }
        }

        Ok(())
    }
}
