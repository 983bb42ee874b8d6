//! HTTP plumbing shared by both servers.
//!
//! # Data Flow
//! ```text
//! Request
//!     → SetRequestIdLayer (request.rs, UUID v4 unless present)
//!     → TraceLayer
//!     → backend handler | proxy forwarder
//!     → PropagateRequestIdLayer (echo x-request-id on the response)
//! ```

pub mod request;

use axum::Router;
use tower_http::request_id::{PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use request::{request_id, UuidRequestId, X_REQUEST_ID};

/// Wrap `router` with the request ID and tracing middleware.
pub fn with_common_layers(router: Router) -> Router {
    router
        .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::new(X_REQUEST_ID, UuidRequestId))
}
