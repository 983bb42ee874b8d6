//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ReproConfig (validated, immutable)
//!     → converted into BackendSettings / ProxySettings
//!
//! On change (edge proxy with --watch):
//!     watcher.rs detects change
//!     → loader.rs loads new config
//!     → validation.rs validates
//!     → proxy swaps its upstream atomically
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require full reload
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Durations are whole seconds in files; runtime settings use `Duration`

pub mod loader;
pub mod schema;
pub mod validation;
pub mod watcher;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{BackendConfig, LogFormat, ObservabilityConfig, ProxyConfig, ReproConfig};
pub use validation::ValidationError;
