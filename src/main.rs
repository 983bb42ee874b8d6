//! `broken-pipe`: the slow backend.
//!
//! Sleeps for the configured delay, then streams a large body. Put it
//! behind a proxy whose read timeout is shorter than the delay to watch
//! the write fail.

use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;

use clap::Parser;

use broken_pipe::config::{load_config, validation::validate_config, ConfigError, ReproConfig};
use broken_pipe::net::Listener;
use broken_pipe::observability::{logging, metrics};
use broken_pipe::{lifecycle, BackendServer, BackendSettings, Shutdown};

#[derive(Parser)]
#[command(name = "broken-pipe")]
#[command(about = "Slow backend that sleeps, then streams a very large body", long_about = None)]
struct Cli {
    /// TOML configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen on 0.0.0.0:<PORT>, overriding the configured bind address.
    #[arg(short, long)]
    port: Option<u16>,

    /// Delay before the response starts, in seconds.
    #[arg(long)]
    delay_secs: Option<u64>,

    /// Total response body size in bytes.
    #[arg(long)]
    payload_bytes: Option<u64>,
}

impl Cli {
    fn load(&self) -> Result<ReproConfig, ConfigError> {
        let mut config = match &self.config {
            Some(path) => load_config(path)?,
            None => ReproConfig::default(),
        };

        if let Some(port) = self.port {
            config.backend.bind_address = SocketAddr::from(([0, 0, 0, 0], port)).to_string();
        }
        if let Some(delay) = self.delay_secs {
            config.backend.delay_secs = delay;
        }
        if let Some(bytes) = self.payload_bytes {
            config.backend.payload_bytes = bytes;
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
    tracing::info!("broken-pipe v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        metrics::init_metrics(config.observability.metrics_address.parse()?)?;
    }

    let listener = Listener::bind(&config.backend.bind_address, config.backend.max_connections).await?;

    let shutdown = Shutdown::new();
    lifecycle::spawn_signal_listener(shutdown.clone());

    let server = BackendServer::new(BackendSettings::from(&config.backend));
    server.run(listener, shutdown.subscribe()).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
