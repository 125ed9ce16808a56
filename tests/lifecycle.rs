//! Server lifecycle over real sockets.

mod common;

use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{routing::get, Router};
use common::{get_health, server_config, spawn_server, ScriptedListener};
use serde_json::Value;
use shared_infra::config::{Config, ServerConfig};
use shared_infra::http::router;
use shared_infra::lifecycle::{Server, ServerError, ServerState, Shutdown, Trigger};
use tokio::io::AsyncReadExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::Notify;

/// `/slow` signals `entered` once the handler runs, then sleeps for `delay`.
fn slow_api(delay: Duration, entered: Arc<Notify>) -> Router {
    Router::new().route(
        "/slow",
        get(move || {
            let entered = Arc::clone(&entered);
            async move {
                entered.notify_one();
                tokio::time::sleep(delay).await;
                "done"
            }
        }),
    )
}

#[tokio::test]
async fn health_endpoint_over_the_wire() {
    let server = spawn_server(Router::new(), ServerConfig::default()).await;

    let response = reqwest::get(server.url("/health")).await.unwrap();
    assert_eq!(response.status(), 200);
    assert!(response.headers().contains_key("x-request-id"));
    let body: Value = response.json().await.unwrap();
    assert_eq!(body, serde_json::json!({ "status": "ok" }));

    assert!(server.stop().await.is_ok());
}

#[tokio::test]
async fn idle_server_stops_immediately() {
    let server = spawn_server(Router::new(), server_config(Duration::from_secs(30))).await;
    let mut state = server.state.clone();
    state.wait_for(|s| *s == ServerState::Serving).await.unwrap();

    let started = Instant::now();
    assert!(server.stop().await.is_ok());
    assert!(started.elapsed() < Duration::from_secs(1));
    assert_eq!(*state.borrow(), ServerState::Stopped);
}

#[tokio::test]
async fn in_flight_request_completes_during_drain() {
    let entered = Arc::new(Notify::new());
    let api = slow_api(Duration::from_millis(300), Arc::clone(&entered));
    let server = spawn_server(api, server_config(Duration::from_secs(5))).await;

    let request = tokio::spawn(reqwest::get(server.url("/api/v1/slow")));
    entered.notified().await;

    let stopped = tokio::spawn(server.stop());
    let response = request.await.unwrap().unwrap();
    assert_eq!(response.status(), 200);
    assert_eq!(response.text().await.unwrap(), "done");

    assert!(stopped.await.unwrap().is_ok());
}

#[tokio::test]
async fn drain_deadline_force_closes_connections() {
    let timeout = Duration::from_millis(200);
    let entered = Arc::new(Notify::new());
    let api = slow_api(Duration::from_secs(5), Arc::clone(&entered));
    let server = spawn_server(api, server_config(timeout)).await;

    let request = tokio::spawn(reqwest::get(server.url("/api/v1/slow")));
    entered.notified().await;

    let started = Instant::now();
    let err = server.stop().await.unwrap_err();
    let elapsed = started.elapsed();

    assert!(err.is_timeout());
    match err {
        ServerError::ShutdownTimedOut { timeout: t, aborted } => {
            assert_eq!(t, timeout);
            assert_eq!(aborted, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(elapsed >= timeout);
    assert!(elapsed < Duration::from_secs(2), "took {elapsed:?}");

    // The client sees its connection dropped rather than a response.
    assert!(request.await.unwrap().is_err());
}

#[tokio::test]
async fn listener_closes_after_shutdown() {
    let server = spawn_server(Router::new(), ServerConfig::default()).await;
    let addr = server.addr;

    assert!(server.stop().await.is_ok());
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn idle_connections_are_closed() {
    let config = ServerConfig {
        idle_timeout: Duration::from_millis(200),
        ..ServerConfig::default()
    };
    let server = spawn_server(Router::new(), config).await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(3), stream.read(&mut buf))
        .await
        .expect("idle connection was not closed");
    assert_eq!(read.unwrap(), 0);

    assert!(server.stop().await.is_ok());
}

#[tokio::test]
async fn start_reports_bind_failure() {
    let taken = TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();

    let server = Server::new(Router::new(), &ServerConfig::default());
    let err = server.start(port).await.unwrap_err();

    assert!(matches!(err, ServerError::Bind { port: p, .. } if p == port));
    assert!(err.to_string().starts_with(&format!("failed to bind port {port}")));
}

fn scripted_server(config: &ServerConfig) -> Server {
    let mut app_config = Config::default();
    app_config.server = config.clone();
    Server::new(router::build(&app_config, None, Router::new()), config)
}

#[tokio::test]
async fn fatal_accept_error_is_reported_after_drain() {
    let (mut client, conn) = tokio::io::duplex(4096);
    let listener = ScriptedListener::new([
        Err(io::Error::from(io::ErrorKind::ConnectionReset)),
        Ok(conn),
        Err(io::Error::other("listener closed")),
    ]);

    let server = scripted_server(&ServerConfig::default());
    let state = server.state();
    let result = tokio::time::timeout(
        Duration::from_secs(5),
        server.run(listener, std::future::pending::<Trigger>()),
    )
    .await
    .expect("server did not stop after the listener failed");

    match result {
        Err(ServerError::Serve(e)) => assert_eq!(e.to_string(), "listener closed"),
        other => panic!("unexpected result: {other:?}"),
    }
    assert_eq!(*state.borrow(), ServerState::Stopped);

    // The accepted connection was drained and closed.
    let mut buf = [0u8; 16];
    let read = tokio::time::timeout(Duration::from_secs(3), client.read(&mut buf))
        .await
        .expect("connection was not closed");
    assert_eq!(read.unwrap(), 0);
}

// Out of descriptors (EMFILE) keeps the accept loop backing off, so it
// cannot observe the stop request before a 10ms deadline.
#[cfg(unix)]
#[tokio::test(start_paused = true)]
async fn accept_loop_past_deadline_is_a_timeout() {
    let (mut client, conn) = tokio::io::duplex(4096);
    let listener = ScriptedListener::new([Ok(conn)]).then_fail_with(24);

    let timeout = Duration::from_millis(10);
    let server = scripted_server(&server_config(timeout));
    let state = server.state();
    let shutdown = Shutdown::new();
    let handle = tokio::spawn(server.run(listener, shutdown.requested()));

    let head = get_health(&mut client).await;
    assert!(head.starts_with("HTTP/1.1 200"), "{head}");

    shutdown.trigger();
    let err = handle.await.unwrap().unwrap_err();
    match err {
        ServerError::ShutdownTimedOut { timeout: t, aborted } => {
            assert_eq!(t, timeout);
            assert_eq!(aborted, 1);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(*state.borrow(), ServerState::Stopped);

    let mut buf = [0u8; 16];
    assert_eq!(client.read(&mut buf).await.unwrap(), 0);
}
