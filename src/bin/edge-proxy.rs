//! `edge-proxy`: the reverse proxy in front of the backend.
//!
//! Forwards every request to one upstream with connect, read and send
//! timeouts. With `--watch`, edits to the config file are applied without
//! a restart.

use std::error::Error;
use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

use broken_pipe::config::watcher::ConfigWatcher;
use broken_pipe::config::{load_config, validation::validate_config, ConfigError, ReproConfig};
use broken_pipe::observability::{logging, metrics};
use broken_pipe::{lifecycle, ProxyServer, ProxySettings, Shutdown};

#[derive(Parser)]
#[command(name = "edge-proxy")]
#[command(about = "Reverse proxy with short upstream timeouts", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen address, overriding the configured one.
    #[arg(short, long)]
    listen: Option<String>,

    /// Upstream URL, overriding the configured one.
    #[arg(short, long)]
    upstream: Option<String>,

    /// Reload the proxy section when the config file changes.
    #[arg(short, long, requires = "config")]
    watch: bool,
}

impl Cli {
    fn load(&self) -> Result<ReproConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ReproConfig::default(),
        };

        if let Some(listen) = &self.listen {
            config.proxy.bind_address = listen.clone();
        }
        if let Some(upstream) = &self.upstream {
            config.proxy.upstream = upstream.clone();
        }

        validate_config(&config).map_err(ConfigError::Validation)?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli = Cli::parse();
    let config = cli.load()?;

    logging::init(&config.observability)?;
    tracing::info!("edge-proxy v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    // The watcher must outlive the server.
    let (_watcher, config_updates) = match (&cli.config, cli.watch) {
        (Some(path), true) => {
            let (watcher, updates) = ConfigWatcher::new(path);
            (Some(watcher.run()?), updates)
        }
        _ => {
            let (_, updates) = mpsc::unbounded_channel();
            (None, updates)
        }
    };

    let listener = TcpListener::bind(&config.proxy.bind_address).await?;

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(shutdown.clone());

    let server = ProxyServer::new(ProxySettings::from_config(&config.proxy)?)?;
    server.run(listener, config_updates, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
