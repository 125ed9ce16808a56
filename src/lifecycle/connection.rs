//! Per-connection serving.
//!
//! # Responsibilities
//! - Generate unique connection IDs for tracing
//! - Serve HTTP/1.1 and HTTP/2 on one accepted stream
//! - Close idle keep-alive connections
//! - Finish gracefully when the server starts draining
//!
//! # Design Decisions
//! - Each connection is its own task, owned by the server's `JoinSet`;
//!   aborting the task is the forced close
//! - Graceful close lets in-flight requests finish but accepts no new ones

use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::{body::Body, Router};
use hyper::{body::Incoming, Request};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto,
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::watch;
use tower::ServiceExt;
use tracing::Instrument;

use crate::config::ServerConfig;

/// Global atomic counter for connection IDs.
/// Using relaxed ordering is sufficient since we only need uniqueness, not synchronization.
static CONNECTION_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Generate a new unique connection ID.
    pub fn new() -> Self {
        Self(CONNECTION_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the raw ID value.
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Request activity on one connection, used for the idle timeout.
#[derive(Debug, Clone)]
pub struct Activity {
    in_flight: Arc<AtomicUsize>,
    last_seen: Arc<Mutex<Instant>>,
}

impl Activity {
    pub fn new() -> Self {
        Self {
            in_flight: Arc::new(AtomicUsize::new(0)),
            last_seen: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Mark a request as started. Dropping the guard marks it finished.
    pub fn begin(&self) -> ActivityGuard {
        self.in_flight.fetch_add(1, Ordering::SeqCst);
        self.touch();
        ActivityGuard {
            activity: self.clone(),
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// True when nothing is running and nothing has happened for `limit`.
    pub fn is_idle_for(&self, limit: Duration) -> bool {
        self.in_flight() == 0 && self.last_seen().elapsed() >= limit
    }

    fn touch(&self) {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner()) = Instant::now();
    }

    fn last_seen(&self) -> Instant {
        *self.last_seen.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for Activity {
    fn default() -> Self {
        Self::new()
    }
}

/// Guard for one in-flight request.
#[derive(Debug)]
pub struct ActivityGuard {
    activity: Activity,
}

impl Drop for ActivityGuard {
    fn drop(&mut self) {
        self.activity.touch();
        self.activity.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Protocol settings shared by every connection.
pub fn builder(config: &ServerConfig) -> auto::Builder<TokioExecutor> {
    let mut builder = auto::Builder::new(TokioExecutor::new());
    if !config.read_timeout.is_zero() {
        builder
            .http1()
            .timer(TokioTimer::new())
            .header_read_timeout(config.read_timeout);
    }
    builder
}

/// Accept errors that concern one client rather than the listener.
pub fn is_transient(err: &io::Error) -> bool {
    if matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
            | io::ErrorKind::WouldBlock
            | io::ErrorKind::TimedOut
    ) {
        return true;
    }
    // ENFILE / EMFILE: out of descriptors, recovers once connections close.
    cfg!(unix) && matches!(err.raw_os_error(), Some(23) | Some(24))
}

/// Serve one connection until it ends, goes idle, or the server drains.
pub async fn serve<I>(
    stream: I,
    peer: SocketAddr,
    router: Router,
    builder: auto::Builder<TokioExecutor>,
    idle_timeout: Duration,
    mut stop: watch::Receiver<bool>,
) where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let id = ConnectionId::new();
    let span = tracing::debug_span!("connection", id = %id, peer = %peer);

    async move {
        let activity = Activity::new();
        let requests = activity.clone();
        let service = hyper::service::service_fn(move |request: Request<Incoming>| {
            let guard = requests.begin();
            let router = router.clone();
            async move {
                let response = router.oneshot(request.map(Body::new)).await;
                drop(guard);
                response
            }
        });

        let conn = builder.serve_connection_with_upgrades(TokioIo::new(stream), service);
        tokio::pin!(conn);

        let idle_check_every = (idle_timeout / 4).clamp(Duration::from_millis(10), Duration::from_secs(5));
        let mut idle_check = tokio::time::interval(idle_check_every);
        let idle_enabled = !idle_timeout.is_zero();
        let mut closing = false;

        loop {
            tokio::select! {
                result = conn.as_mut() => {
                    if let Err(e) = result {
                        tracing::debug!(error = %e, "connection ended with error");
                    }
                    break;
                }
                _ = async { stop.wait_for(|stopped| *stopped).await.map(|_| ()) }, if !closing => {
                    tracing::trace!(in_flight = activity.in_flight(), "draining connection");
                    closing = true;
                    conn.as_mut().graceful_shutdown();
                }
                _ = idle_check.tick(), if idle_enabled && !closing => {
                    if activity.is_idle_for(idle_timeout) {
                        tracing::trace!("closing idle connection");
                        closing = true;
                        conn.as_mut().graceful_shutdown();
                    }
                }
            }
        }

        tracing::trace!("connection closed");
    }
    .instrument(span)
    .await
}
