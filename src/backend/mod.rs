//! The slow backend.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (bounded accept loop, hyper connection per socket)
//!     → handler.rs (sleep for the delay, build the payload)
//!     → payload.rs (stream fixed-size chunks until the total is reached)
//!     → outcome.rs (exactly one terminal outcome per request)
//! ```

pub mod handler;
pub mod outcome;
pub mod payload;
pub mod server;

use std::time::Duration;

use crate::config::BackendConfig;

pub use outcome::{Outcome, OutcomeGuard, OutcomeRecorder, OutcomeReport, Phase};
pub use payload::{PayloadError, PayloadPlan};
pub use server::BackendServer;

/// Runtime settings for the backend, derived from [`BackendConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendSettings {
    pub delay: Duration,
    pub payload_bytes: u64,
    pub chunk_bytes: usize,
    pub chunk_interval: Option<Duration>,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub max_connections: usize,
    pub drain_timeout: Duration,
}

impl From<&BackendConfig> for BackendSettings {
    fn from(config: &BackendConfig) -> Self {
        Self {
            delay: Duration::from_secs(config.delay_secs),
            payload_bytes: config.payload_bytes,
            chunk_bytes: config.chunk_bytes,
            chunk_interval: (config.chunk_interval_ms > 0)
                .then(|| Duration::from_millis(config.chunk_interval_ms)),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            write_timeout: Duration::from_secs(config.write_timeout_secs),
            max_connections: config.max_connections,
            drain_timeout: Duration::from_secs(config.drain_timeout_secs),
        }
    }
}

impl Default for BackendSettings {
    fn default() -> Self {
        Self::from(&BackendConfig::default())
    }
}
