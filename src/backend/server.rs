//! Backend HTTP server.
//!
//! # Responsibilities
//! - Accept connections through the bounded [`Listener`]
//! - Serve each connection with hyper, enforcing the header read timeout
//! - Log connection-level failures (broken pipe, reset, incomplete message)
//! - Drain in-flight connections on shutdown
//!
//! `axum::serve` hides per-connection errors, so connections are driven
//! here directly with hyper-util's auto builder.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{routing::get, Router};
use hyper_util::{
    rt::{TokioExecutor, TokioIo, TokioTimer},
    server::conn::auto::Builder,
    service::TowerToHyperService,
};
use tokio::net::TcpStream;
use tokio::sync::{broadcast, watch};
use tracing::Instrument;

use crate::backend::handler::{serve_payload, BackendState};
use crate::backend::outcome::{OutcomeRecorder, OutcomeReport};
use crate::backend::BackendSettings;
use crate::http::with_common_layers;
use crate::net::{ConnectionGuard, ConnectionPermit, ConnectionTracker, Listener, ListenerError};

/// The slow backend server.
pub struct BackendServer {
    router: Router,
    settings: BackendSettings,
    recorder: OutcomeRecorder,
}

impl BackendServer {
    /// Create a new backend server with the given settings.
    pub fn new(settings: BackendSettings) -> Self {
        let recorder = OutcomeRecorder::default();
        let state = BackendState {
            settings: settings.clone(),
            recorder: recorder.clone(),
        };

        Self {
            router: Self::build_router(state),
            settings,
            recorder,
        }
    }

    fn build_router(state: BackendState) -> Router {
        with_common_layers(Router::new().route("/", get(serve_payload)).with_state(state))
    }

    /// Subscribe to the terminal outcome of every request.
    pub fn outcomes(&self) -> broadcast::Receiver<OutcomeReport> {
        self.recorder.subscribe()
    }

    pub fn settings(&self) -> &BackendSettings {
        &self.settings
    }

    /// Accept connections until `shutdown` fires, then drain.
    pub async fn run(
        self,
        listener: Listener,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), ListenerError> {
        let local_addr = listener.local_addr().map_err(ListenerError::Bind)?;
        tracing::info!(
            address = %local_addr,
            delay = ?self.settings.delay,
            payload_bytes = self.settings.payload_bytes,
            "server is running"
        );

        let mut builder = Builder::new(TokioExecutor::new());
        // A peer's EOF must not cancel the handler; a vanished peer only
        // shows up when the body is written.
        builder
            .http1()
            .half_close(true)
            .timer(TokioTimer::new())
            .header_read_timeout(self.settings.read_timeout);
        let builder = Arc::new(builder);

        let tracker = ConnectionTracker::new();

        loop {
            let accepted = tokio::select! {
                accepted = listener.accept() => accepted,
                _ = shutdown.recv() => break,
            };

            let (stream, peer, permit) = match accepted {
                Ok(conn) => conn,
                Err(ListenerError::Accept(e)) => {
                    tracing::warn!(error = %e, "Accept failed");
                    continue;
                }
                Err(e) => return Err(e),
            };

            let guard = tracker.track();
            let span = tracing::info_span!("conn", id = %guard.id(), peer = %peer);
            tokio::spawn(
                serve_connection(
                    Arc::clone(&builder),
                    self.router.clone(),
                    stream,
                    peer,
                    guard,
                    permit,
                    tracker.drain_receiver(),
                )
                .instrument(span),
            );
        }

        tracing::info!(
            active_connections = tracker.active_count(),
            "Shutdown requested, draining connections"
        );
        tracker.begin_drain();
        if tokio::time::timeout(self.settings.drain_timeout, tracker.wait_for_idle())
            .await
            .is_err()
        {
            tracing::warn!(
                remaining = tracker.active_count(),
                "Drain timeout elapsed, dropping connections"
            );
        }

        tracing::info!("Backend server stopped");
        Ok(())
    }
}

async fn serve_connection(
    builder: Arc<Builder<TokioExecutor>>,
    router: Router,
    stream: TcpStream,
    peer: SocketAddr,
    guard: ConnectionGuard,
    _permit: ConnectionPermit,
    mut draining: watch::Receiver<bool>,
) {
    let io = TokioIo::new(stream);
    let conn = builder.serve_connection(io, TowerToHyperService::new(router));
    tokio::pin!(conn);

    let result = tokio::select! {
        res = conn.as_mut() => res,
        _ = draining.changed() => {
            conn.as_mut().graceful_shutdown();
            conn.as_mut().await
        }
    };

    // Request-level outcomes are recorded by the handler; this is the
    // socket-level view of the same failure.
    if let Err(err) = result {
        tracing::debug!(
            connection_id = %guard.id(),
            peer = %peer,
            error = %err,
            "connection closed with error"
        );
    }
}
