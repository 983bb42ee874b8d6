//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, chunk size > 0)
//! - Validate addresses and the upstream URL
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ReproConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;

use thiserror::Error;
use url::Url;

use crate::config::schema::ReproConfig;

/// A single semantic problem found in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{field}: invalid socket address {value:?}")]
    InvalidAddress { field: &'static str, value: String },

    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    #[error("proxy.upstream: {0}")]
    InvalidUpstream(String),
}

/// Validate a parsed configuration.
pub fn validate_config(config: &ReproConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    check_address(&mut errors, "backend.bind_address", &config.backend.bind_address);
    check_address(&mut errors, "proxy.bind_address", &config.proxy.bind_address);
    if config.observability.metrics_enabled {
        check_address(
            &mut errors,
            "observability.metrics_address",
            &config.observability.metrics_address,
        );
    }

    let backend = &config.backend;
    check_positive(&mut errors, "backend.chunk_bytes", backend.chunk_bytes as u64);
    check_positive(&mut errors, "backend.read_timeout_secs", backend.read_timeout_secs);
    check_positive(&mut errors, "backend.write_timeout_secs", backend.write_timeout_secs);
    check_positive(&mut errors, "backend.max_connections", backend.max_connections as u64);

    let proxy = &config.proxy;
    check_positive(&mut errors, "proxy.connect_timeout_secs", proxy.connect_timeout_secs);
    check_positive(&mut errors, "proxy.read_timeout_secs", proxy.read_timeout_secs);
    check_positive(&mut errors, "proxy.send_timeout_secs", proxy.send_timeout_secs);

    if let Err(e) = check_upstream(&proxy.upstream) {
        errors.push(e);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_address(errors: &mut Vec<ValidationError>, field: &'static str, value: &str) {
    if value.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::InvalidAddress {
            field,
            value: value.to_string(),
        });
    }
}

fn check_positive(errors: &mut Vec<ValidationError>, field: &'static str, value: u64) {
    if value == 0 {
        errors.push(ValidationError::Zero { field });
    }
}

/// The proxy speaks plain HTTP/1.1 to a single upstream; paths are taken
/// from the client request, so the base URL must not carry one.
pub(crate) fn check_upstream(upstream: &str) -> Result<Url, ValidationError> {
    let url = Url::parse(upstream).map_err(|e| ValidationError::InvalidUpstream(e.to_string()))?;

    if url.scheme() != "http" {
        return Err(ValidationError::InvalidUpstream(format!(
            "unsupported scheme {:?}",
            url.scheme()
        )));
    }
    if url.host_str().is_none() {
        return Err(ValidationError::InvalidUpstream("missing host".to_string()));
    }
    if url.path() != "/" || url.query().is_some() {
        return Err(ValidationError::InvalidUpstream(
            "must not carry a path or query".to_string(),
        ));
    }

    Ok(url)
}
