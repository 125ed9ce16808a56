//! HTTP server with bounded graceful shutdown.
//!
//! # Responsibilities
//! - Bind the listener and run the accept loop as its own task
//! - Race the accept loop against the shutdown trigger
//! - Drain in-flight connections within `shutdown_timeout`, then force-close
//! - Publish the lifecycle state (Starting → Serving → Draining → Stopped)

use std::future::Future;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use hyper_util::{rt::TokioExecutor, server::conn::auto};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::task::{JoinError, JoinSet};
use tokio::time::{timeout_at, Instant};

use crate::config::ServerConfig;
use crate::lifecycle::connection;
use crate::lifecycle::shutdown::Trigger;
use crate::lifecycle::signals::Termination;

/// Lifecycle of a [`Server`]. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ServerState {
    Starting,
    Serving,
    Draining,
    Stopped,
}

impl std::fmt::Display for ServerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ServerState::Starting => "starting",
            ServerState::Serving => "serving",
            ServerState::Draining => "draining",
            ServerState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Error type for server operations. Every variant is terminal.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handlers: {0}")]
    Signal(#[source] io::Error),

    /// The listener failed while serving.
    #[error("server error: {0}")]
    Serve(#[source] io::Error),

    /// Draining did not finish in time; remaining connections were force-closed.
    #[error("graceful shutdown error: connections still open after {timeout:?}, {aborted} force-closed")]
    ShutdownTimedOut { timeout: Duration, aborted: usize },

    /// Draining did not finish in time and force-closing failed too.
    #[error("force close error: {0}")]
    ForceClose(String),
}

impl ServerError {
    /// True when shutdown was degraded by the drain deadline.
    pub fn is_timeout(&self) -> bool {
        matches!(self, ServerError::ShutdownTimedOut { .. } | ServerError::ForceClose(_))
    }
}

/// Source of accepted connections.
pub trait Listener: Send + 'static {
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    fn accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, SocketAddr)>> + Send;

    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Listener for TcpListener {
    type Io = TcpStream;

    async fn accept(&mut self) -> io::Result<(TcpStream, SocketAddr)> {
        TcpListener::accept(self).await
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// HTTP server owning the listener and every accepted connection.
pub struct Server {
    router: Router,
    config: ServerConfig,
    state: watch::Sender<ServerState>,
}

impl Server {
    pub fn new(router: Router, config: &ServerConfig) -> Self {
        let (state, _) = watch::channel(ServerState::Starting);
        Self {
            router,
            config: config.clone(),
            state,
        }
    }

    /// Observe lifecycle transitions.
    pub fn state(&self) -> watch::Receiver<ServerState> {
        self.state.subscribe()
    }

    /// Bind `0.0.0.0:port` and serve until SIGINT/SIGTERM or a listener failure.
    ///
    /// A signal followed by a clean drain returns `Ok(())`.
    pub async fn start(self, port: u16) -> Result<(), ServerError> {
        let listener = TcpListener::bind(("0.0.0.0", port))
            .await
            .map_err(|source| ServerError::Bind { port, source })?;
        let termination = Termination::install().map_err(ServerError::Signal)?;

        self.run(listener, async move { Trigger::Signal(termination.recv().await) })
            .await
    }

    /// Serve on `listener` until `shutdown` resolves or the listener fails.
    pub async fn run<L, F>(self, listener: L, shutdown: F) -> Result<(), ServerError>
    where
        L: Listener,
        F: Future<Output = Trigger> + Send,
    {
        let addr = listener.local_addr().ok();
        let (stop_tx, stop_rx) = watch::channel(false);
        let open = Arc::new(AtomicUsize::new(0));

        let acceptor = Acceptor {
            listener,
            router: self.router.clone(),
            builder: connection::builder(&self.config),
            idle_timeout: self.config.idle_timeout,
            stop: stop_rx,
            open: Arc::clone(&open),
        };
        let mut serving = tokio::spawn(acceptor.run());
        self.state.send_replace(ServerState::Serving);
        tracing::info!(address = ?addr, "HTTP server listening");

        tokio::pin!(shutdown);
        let finished_early = tokio::select! {
            finished = &mut serving => Some(finished),
            trigger = &mut shutdown => {
                tracing::info!(signal = %trigger, "shutdown signal received");
                None
            }
        };

        self.state.send_replace(ServerState::Draining);
        let deadline = Instant::now() + self.config.shutdown_timeout;
        stop_tx.send_replace(true);

        let outcome = match finished_early {
            Some(finished) => AcceptOutcome::from_join(finished),
            None => match timeout_at(deadline, &mut serving).await {
                Ok(finished) => AcceptOutcome::from_join(finished),
                Err(_) => {
                    // The accept loop still owns every connection; aborting it
                    // aborts them too.
                    let aborted = open.load(Ordering::SeqCst);
                    tracing::error!(
                        timeout = ?self.config.shutdown_timeout,
                        remaining = aborted,
                        "accept loop missed the shutdown deadline, forcing close"
                    );
                    serving.abort();
                    let _ = serving.await;
                    self.state.send_replace(ServerState::Stopped);
                    return Err(ServerError::ShutdownTimedOut {
                        timeout: self.config.shutdown_timeout,
                        aborted,
                    });
                }
            },
        };
        let AcceptOutcome {
            mut connections,
            error: listener_error,
        } = outcome;

        if let Some(e) = &listener_error {
            tracing::error!(error = %e, "listener failed, draining connections");
        }

        let drained = timeout_at(deadline, drain(&mut connections)).await.is_ok();
        let result = if drained {
            Ok(())
        } else {
            tracing::error!(
                timeout = ?self.config.shutdown_timeout,
                remaining = connections.len(),
                "graceful shutdown failed, forcing close"
            );
            force_close(connections, self.config.shutdown_timeout).await
        };

        self.state.send_replace(ServerState::Stopped);

        match listener_error {
            Some(e) => Err(ServerError::Serve(e)),
            None => {
                if result.is_ok() {
                    tracing::info!("server stopped gracefully");
                }
                result
            }
        }
    }
}

/// The accept loop and the connections it spawned.
struct Acceptor<L> {
    listener: L,
    router: Router,
    builder: auto::Builder<TokioExecutor>,
    idle_timeout: Duration,
    stop: watch::Receiver<bool>,
    open: Arc<AtomicUsize>,
}

/// Counts a connection task as open until it finishes or is aborted.
struct OpenConnection(Arc<AtomicUsize>);

impl OpenConnection {
    fn new(open: &Arc<AtomicUsize>) -> Self {
        open.fetch_add(1, Ordering::SeqCst);
        Self(Arc::clone(open))
    }
}

impl Drop for OpenConnection {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

struct AcceptOutcome {
    connections: JoinSet<()>,
    error: Option<io::Error>,
}

impl AcceptOutcome {
    fn from_join(joined: Result<AcceptOutcome, JoinError>) -> Self {
        joined.unwrap_or_else(|e| AcceptOutcome {
            connections: JoinSet::new(),
            error: Some(io::Error::other(format!("accept loop aborted: {e}"))),
        })
    }
}

impl<L: Listener> Acceptor<L> {
    async fn run(mut self) -> AcceptOutcome {
        let mut connections = JoinSet::new();
        let mut stop = self.stop.clone();

        let error = loop {
            tokio::select! {
                _ = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) } => break None,
                accepted = self.listener.accept() => match accepted {
                    Ok((stream, peer)) => self.spawn(&mut connections, stream, peer),
                    Err(e) if connection::is_transient(&e) => {
                        tracing::debug!(error = %e, "accept failed, continuing");
                        // Back off briefly when out of descriptors.
                        if matches!(e.raw_os_error(), Some(23) | Some(24)) {
                            tokio::time::sleep(Duration::from_millis(50)).await;
                        }
                    }
                    Err(e) => break Some(e),
                },
                Some(_) = connections.join_next(), if !connections.is_empty() => {}
            }
        };

        // Dropping the listener here stops new connections from queueing.
        drop(self.listener);
        AcceptOutcome { connections, error }
    }

    fn spawn(&self, connections: &mut JoinSet<()>, stream: L::Io, peer: SocketAddr) {
        tracing::debug!(peer_addr = %peer, active = connections.len() + 1, "connection accepted");
        let open = OpenConnection::new(&self.open);
        let serving = connection::serve(
            stream,
            peer,
            self.router.clone(),
            self.builder.clone(),
            self.idle_timeout,
            self.stop.clone(),
        );
        connections.spawn(async move {
            let _open = open;
            serving.await
        });
    }
}

async fn drain(connections: &mut JoinSet<()>) {
    while let Some(joined) = connections.join_next().await {
        if let Err(e) = joined {
            if e.is_panic() {
                tracing::warn!(error = %e, "connection task panicked");
            }
        }
    }
}

async fn force_close(mut connections: JoinSet<()>, timeout: Duration) -> Result<(), ServerError> {
    let aborted = connections.len();
    connections.abort_all();

    let mut panicked = 0usize;
    while let Some(joined) = connections.join_next().await {
        if matches!(&joined, Err(e) if e.is_panic()) {
            panicked += 1;
        }
    }

    if panicked > 0 {
        return Err(ServerError::ForceClose(format!(
            "{panicked} of {aborted} connection task(s) panicked while closing"
        )));
    }
    Err(ServerError::ShutdownTimedOut { timeout, aborted })
}
