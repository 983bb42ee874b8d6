//! Broken-pipe reproduction: a slow backend behind an edge proxy whose
//! read timeout is shorter than the backend's delay.
//!
//! # Architecture Overview
//!
//! ```text
//!   probe ──▶ edge-proxy ──────────────────────────▶ broken-pipe (backend)
//!             connect / read / send timeouts          sleep, then stream
//!             X-Real-IP, X-Forwarded-For, Host        a 900 MB body
//!
//!   read timeout < delay:
//!     proxy answers 504 and closes the upstream connection;
//!     the backend records one aborted outcome (broken pipe)
//! ```

// Servers
pub mod backend;
pub mod proxy;

// Core subsystems
pub mod config;
pub mod http;
pub mod net;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use backend::{BackendServer, BackendSettings};
pub use config::ReproConfig;
pub use lifecycle::Shutdown;
pub use proxy::{ProxyServer, ProxySettings};
