//! Resilience subsystem.
//!
//! # Data Flow
//! ```text
//! Proxy request to upstream:
//!     → connect timeout (connector)
//!     → read timeout on the response head
//!     → timeouts.rs: idle timeout between body reads, both directions
//!
//! Backend response:
//!     → write deadline checked before every chunk
//! ```
//!
//! # Design Decisions
//! - Timeouts are non-negotiable; every upstream phase has a deadline
//! - No retries: a timed-out request is terminal

pub mod timeouts;

pub use timeouts::{idle_timeout, is_timeout, StreamTimeoutError};
