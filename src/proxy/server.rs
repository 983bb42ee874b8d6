//! Edge proxy HTTP server.
//!
//! # Responsibilities
//! - Create the Axum router that forwards every path and method
//! - Wire up middleware (tracing, request ID)
//! - Swap the upstream when a new configuration arrives
//! - Shut down gracefully

use std::net::SocketAddr;
use std::sync::Arc;

use arc_swap::ArcSwap;
use axum::{routing::any, Router};
use tokio::net::TcpListener;
use tokio::sync::{broadcast, mpsc};

use crate::config::ReproConfig;
use crate::http::with_common_layers;
use crate::proxy::forward::{forward, ForwardError, Upstream};
use crate::proxy::ProxySettings;

/// Application state injected into the forwarder.
#[derive(Clone)]
pub struct ProxyState {
    pub upstream: Arc<ArcSwap<Upstream>>,
}

/// Replaces the proxy's upstream at runtime.
#[derive(Clone)]
pub struct ReloadHandle {
    upstream: Arc<ArcSwap<Upstream>>,
}

impl ReloadHandle {
    /// Swap in new settings. In-flight requests keep the old upstream.
    pub fn apply(&self, settings: ProxySettings) -> Result<(), ForwardError> {
        let upstream = Upstream::new(settings)?;
        tracing::info!(
            upstream = %upstream.settings().upstream,
            connect_timeout = ?upstream.settings().connect_timeout,
            read_timeout = ?upstream.settings().read_timeout,
            send_timeout = ?upstream.settings().send_timeout,
            "Proxy configuration applied"
        );
        self.upstream.store(Arc::new(upstream));
        Ok(())
    }

    /// Apply the proxy section of a reloaded configuration.
    ///
    /// Invalid updates are logged and the current upstream is kept.
    pub fn apply_config(&self, config: &ReproConfig) {
        let result = ProxySettings::from_config(&config.proxy)
            .map_err(|e| e.to_string())
            .and_then(|settings| self.apply(settings).map_err(|e| e.to_string()));

        if let Err(e) = result {
            tracing::error!(error = %e, "Rejected proxy configuration, keeping current upstream");
        }
    }

    pub fn current(&self) -> Arc<Upstream> {
        self.upstream.load_full()
    }
}

/// HTTP server for the edge proxy.
pub struct ProxyServer {
    router: Router,
    upstream: Arc<ArcSwap<Upstream>>,
}

impl ProxyServer {
    /// Create a new proxy server with the given settings.
    pub fn new(settings: ProxySettings) -> Result<Self, ForwardError> {
        let upstream = Arc::new(ArcSwap::from_pointee(Upstream::new(settings)?));
        let state = ProxyState {
            upstream: Arc::clone(&upstream),
        };

        Ok(Self {
            router: Self::build_router(state),
            upstream,
        })
    }

    fn build_router(state: ProxyState) -> Router {
        with_common_layers(
            Router::new()
                .route("/{*path}", any(forward))
                .route("/", any(forward))
                .with_state(state),
        )
    }

    pub fn reload_handle(&self) -> ReloadHandle {
        ReloadHandle {
            upstream: Arc::clone(&self.upstream),
        }
    }

    /// Run the server, accepting connections on the given listener.
    ///
    /// Configurations received on `config_updates` are applied as they
    /// arrive; the server stops when `shutdown` fires.
    pub async fn run(
        self,
        listener: TcpListener,
        mut config_updates: mpsc::UnboundedReceiver<ReproConfig>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        {
            let current = self.upstream.load();
            tracing::info!(
                address = %addr,
                upstream = %current.settings().upstream,
                read_timeout = ?current.settings().read_timeout,
                "Edge proxy starting"
            );
        }

        let reload = self.reload_handle();
        tokio::spawn(async move {
            while let Some(config) = config_updates.recv().await {
                reload.apply_config(&config);
            }
        });

        let app = self
            .router
            .into_make_service_with_connect_info::<SocketAddr>();

        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("Edge proxy stopped");
        Ok(())
    }
}
