//! Shared utilities for integration tests.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use broken_pipe::backend::OutcomeReport;
use broken_pipe::config::ReproConfig;
use broken_pipe::net::Listener;
use broken_pipe::{BackendServer, BackendSettings, ProxyServer, ProxySettings, Shutdown};

/// Backend settings small enough for tests.
#[allow(dead_code)]
pub fn backend_settings(delay: Duration, payload_bytes: u64) -> BackendSettings {
    BackendSettings {
        delay,
        payload_bytes,
        chunk_bytes: 64 * 1024,
        chunk_interval: None,
        read_timeout: Duration::from_secs(10),
        write_timeout: Duration::from_secs(30),
        max_connections: 64,
        drain_timeout: Duration::from_secs(1),
    }
}

/// Proxy settings pointing at `upstream` with the same timeout for every phase.
#[allow(dead_code)]
pub fn proxy_settings(upstream: SocketAddr, timeout: Duration) -> ProxySettings {
    ProxySettings {
        upstream: format!("http://{upstream}").parse().unwrap(),
        connect_timeout: Duration::from_secs(1),
        read_timeout: timeout,
        send_timeout: timeout,
    }
}

pub struct RunningBackend {
    pub addr: SocketAddr,
    pub outcomes: broadcast::Receiver<OutcomeReport>,
    pub shutdown: Shutdown,
}

/// Start a backend on an ephemeral port.
pub async fn start_backend(settings: BackendSettings) -> RunningBackend {
    let listener = Listener::bind("127.0.0.1:0", settings.max_connections)
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();

    let server = BackendServer::new(settings);
    let outcomes = server.outcomes();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, server_shutdown).await;
    });

    RunningBackend {
        addr,
        outcomes,
        shutdown,
    }
}

#[allow(dead_code)]
pub struct RunningProxy {
    pub addr: SocketAddr,
    pub config_updates: mpsc::UnboundedSender<ReproConfig>,
    pub shutdown: Shutdown,
}

/// Start an edge proxy on an ephemeral port.
#[allow(dead_code)]
pub async fn start_proxy(settings: ProxySettings) -> RunningProxy {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let server = ProxyServer::new(settings).unwrap();
    let (config_updates, updates_rx) = mpsc::unbounded_channel();
    let shutdown = Shutdown::new();
    let server_shutdown = shutdown.subscribe();

    tokio::spawn(async move {
        let _ = server.run(listener, updates_rx, server_shutdown).await;
    });

    RunningProxy {
        addr,
        config_updates,
        shutdown,
    }
}

/// A client that never reuses connections, like the proxy itself.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .pool_max_idle_per_host(0)
        .no_proxy()
        .build()
        .unwrap()
}

/// Wait for the next backend outcome.
pub async fn next_outcome(outcomes: &mut broadcast::Receiver<OutcomeReport>) -> OutcomeReport {
    tokio::time::timeout(Duration::from_secs(10), outcomes.recv())
        .await
        .expect("no outcome recorded")
        .unwrap()
}

#[allow(dead_code)]
/// Assert that nothing else gets recorded for a while.
pub async fn assert_no_more_outcomes(outcomes: &mut broadcast::Receiver<OutcomeReport>) {
    tokio::time::sleep(Duration::from_millis(300)).await;
    assert!(
        matches!(
            outcomes.try_recv(),
            Err(broadcast::error::TryRecvError::Empty)
        ),
        "more than one outcome recorded for a single request"
    );
}
