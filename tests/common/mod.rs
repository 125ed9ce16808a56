//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use shared_infra::config::{Config, ServerConfig};
use shared_infra::database::{Transaction, TransactionSource};
use shared_infra::error::{Error, ErrorKind};
use shared_infra::http::router;
use shared_infra::lifecycle::{Listener, Server, ServerError, ServerState, Shutdown};
use tokio::io::DuplexStream;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Operations recorded by [`FakeSource`], in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    Begin(u64),
    Exec(u64, String),
    Commit(u64),
    Rollback(u64),
    Abandon(u64),
}

/// In-memory transaction source with switchable failures.
#[derive(Clone, Default)]
pub struct FakeSource {
    log: Arc<Mutex<Vec<Op>>>,
    next_id: Arc<AtomicU64>,
    pub fail_begin: Arc<AtomicBool>,
    pub fail_commit: Arc<AtomicBool>,
    pub fail_rollback: Arc<AtomicBool>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ops(&self) -> Vec<Op> {
        self.log.lock().unwrap().clone()
    }

    /// Operations without transaction ids, for single-transaction tests.
    pub fn names(&self) -> Vec<&'static str> {
        self.ops()
            .iter()
            .map(|op| match op {
                Op::Begin(_) => "begin",
                Op::Exec(..) => "exec",
                Op::Commit(_) => "commit",
                Op::Rollback(_) => "rollback",
                Op::Abandon(_) => "abandon",
            })
            .collect()
    }

    fn record(&self, op: Op) {
        self.log.lock().unwrap().push(op);
    }
}

impl TransactionSource for FakeSource {
    type Transaction = FakeTx;

    async fn begin(&self) -> Result<FakeTx, Error> {
        if self.fail_begin.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Database, "pool exhausted"));
        }
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.record(Op::Begin(id));
        Ok(FakeTx {
            id,
            source: self.clone(),
        })
    }
}

/// Transaction handed out by [`FakeSource`].
pub struct FakeTx {
    id: u64,
    source: FakeSource,
}

impl FakeTx {
    pub fn id(&self) -> u64 {
        self.id
    }

    pub async fn execute(&mut self, statement: &str) -> Result<(), Error> {
        tokio::task::yield_now().await;
        self.source.record(Op::Exec(self.id, statement.to_string()));
        Ok(())
    }
}

impl Transaction for FakeTx {
    async fn commit(self) -> Result<(), Error> {
        if self.source.fail_commit.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Database, "connection lost during commit"));
        }
        self.source.record(Op::Commit(self.id));
        Ok(())
    }

    async fn rollback(self) -> Result<(), Error> {
        if self.source.fail_rollback.load(Ordering::SeqCst) {
            return Err(Error::new(ErrorKind::Database, "connection lost during rollback"));
        }
        self.source.record(Op::Rollback(self.id));
        Ok(())
    }

    fn abandon(self) {
        self.source.record(Op::Abandon(self.id));
    }
}

/// A server running on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub shutdown: Shutdown,
    pub state: watch::Receiver<ServerState>,
    pub handle: JoinHandle<Result<(), ServerError>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    /// Trigger shutdown and wait for `run` to return.
    pub async fn stop(self) -> Result<(), ServerError> {
        self.shutdown.trigger();
        tokio::time::timeout(Duration::from_secs(10), self.handle)
            .await
            .expect("server did not stop")
            .expect("server task panicked")
    }
}

/// Start a server with `api` mounted under the API prefix.
pub async fn spawn_server(api: Router, server: ServerConfig) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let mut config = Config::default();
    config.server = server;
    let app = router::build(&config, None, api);

    let shutdown = Shutdown::new();
    let server = Server::new(app, &config.server);
    let state = server.state();
    let handle = tokio::spawn(server.run(listener, shutdown.requested()));

    TestServer {
        addr,
        shutdown,
        state,
        handle,
    }
}

/// Server timeouts with a short drain deadline.
pub fn server_config(shutdown_timeout: Duration) -> ServerConfig {
    ServerConfig {
        shutdown_timeout,
        ..ServerConfig::default()
    }
}

/// Listener that replays a fixed sequence of accept results.
///
/// Once the sequence is exhausted it either waits forever or keeps failing
/// with one OS error.
pub struct ScriptedListener {
    steps: VecDeque<io::Result<DuplexStream>>,
    exhausted: Option<i32>,
}

impl ScriptedListener {
    pub fn new(steps: impl IntoIterator<Item = io::Result<DuplexStream>>) -> Self {
        Self {
            steps: steps.into_iter().collect(),
            exhausted: None,
        }
    }

    /// Fail every accept after the scripted steps with `raw_os_error`.
    pub fn then_fail_with(mut self, raw_os_error: i32) -> Self {
        self.exhausted = Some(raw_os_error);
        self
    }
}

impl Listener for ScriptedListener {
    type Io = DuplexStream;

    async fn accept(&mut self) -> io::Result<(DuplexStream, SocketAddr)> {
        match (self.steps.pop_front(), self.exhausted) {
            (Some(step), _) => step.map(|io| (io, SocketAddr::from(([127, 0, 0, 1], 40000)))),
            (None, Some(code)) => Err(io::Error::from_raw_os_error(code)),
            (None, None) => std::future::pending().await,
        }
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        Ok(SocketAddr::from(([127, 0, 0, 1], 0)))
    }
}

/// Send `GET /health` over an in-memory connection and return the raw response head.
pub async fn get_health(client: &mut DuplexStream) -> String {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    client
        .write_all(b"GET /health HTTP/1.1\r\nhost: test\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 4096];
    let n = client.read(&mut buf).await.unwrap();
    String::from_utf8_lossy(&buf[..n]).into_owned()
}
