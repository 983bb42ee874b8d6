//! The edge proxy.
//!
//! # Data Flow
//! ```text
//! Client request
//!     → server.rs (axum router, request ID, trace)
//!     → forward.rs (pick current upstream, rewrite target)
//!     → headers.rs (hop-by-hop stripping, X-Real-IP / X-Forwarded-*)
//!     → upstream with connect / read / send timeouts
//!     → streamed back with the read timeout between body reads
//! ```

pub mod forward;
pub mod headers;
pub mod server;

use std::time::Duration;

use url::Url;

use crate::config::validation::check_upstream;
use crate::config::{ProxyConfig, ValidationError};

pub use forward::{ForwardError, Upstream};
pub use server::{ProxyServer, ReloadHandle};

/// Runtime settings for the proxy, derived from [`ProxyConfig`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxySettings {
    pub upstream: Url,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub send_timeout: Duration,
}

impl ProxySettings {
    pub fn from_config(config: &ProxyConfig) -> Result<Self, ValidationError> {
        Ok(Self {
            upstream: check_upstream(&config.upstream)?,
            connect_timeout: Duration::from_secs(config.connect_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
            send_timeout: Duration::from_secs(config.send_timeout_secs),
        })
    }
}
