//! Request forwarding to the upstream.
//!
//! # Responsibilities
//! - Rewrite the request target onto the upstream authority
//! - Enforce connect, read and send timeouts
//! - Stream the upstream body back, aborting on a stalled read
//! - Map upstream failures to 502 / 504
//!
//! # Design Decisions
//! - No pooling: one upstream connection per request, closed with it
//! - A timed-out response head answers 504; a stalled body can only be
//!   cut, since status and headers are already on the wire

use std::io;
use std::net::SocketAddr;
use std::str::FromStr;
use std::time::{Duration, Instant};

use axum::{
    body::{Body, HttpBody},
    extract::{ConnectInfo, State},
    http::{
        uri::{Authority, PathAndQuery, Scheme},
        Request, StatusCode, Uri, Version,
    },
    response::{IntoResponse, Response},
};
use futures_util::stream::StreamExt;
use hyper_util::{
    client::legacy::{connect::HttpConnector, Client},
    rt::TokioExecutor,
};
use thiserror::Error;

use crate::http::request_id;
use crate::observability::metrics;
use crate::proxy::headers::{set_forwarded, strip_hop_by_hop};
use crate::proxy::server::ProxyState;
use crate::proxy::ProxySettings;
use crate::resilience::{idle_timeout, is_timeout, StreamTimeoutError};

#[derive(Debug, Error)]
pub enum ForwardError {
    #[error("invalid upstream target: {0}")]
    InvalidTarget(String),

    #[error("upstream connect timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("upstream connect failed: {0}")]
    Connect(#[source] hyper_util::client::legacy::Error),

    #[error("upstream timed out after {0:?} waiting for the response")]
    ReadTimeout(Duration),

    #[error("client request body stalled for {0:?}")]
    SendTimeout(Duration),

    #[error("upstream request failed: {0}")]
    Upstream(#[source] hyper_util::client::legacy::Error),
}

impl ForwardError {
    pub fn status(&self) -> StatusCode {
        match self {
            ForwardError::ConnectTimeout(_)
            | ForwardError::ReadTimeout(_)
            | ForwardError::SendTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ForwardError::InvalidTarget(_)
            | ForwardError::Connect(_)
            | ForwardError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let status = self.status();
        (status, status.canonical_reason().unwrap_or_default()).into_response()
    }
}

/// One upstream with the timeouts that apply to it.
///
/// Immutable; a reload builds a new one.
#[derive(Debug, Clone)]
pub struct Upstream {
    settings: ProxySettings,
    authority: Authority,
    client: Client<HttpConnector, Body>,
}

impl Upstream {
    pub fn new(settings: ProxySettings) -> Result<Self, ForwardError> {
        let host = settings
            .upstream
            .host_str()
            .ok_or_else(|| ForwardError::InvalidTarget("missing host".to_string()))?;
        let authority = match settings.upstream.port_or_known_default() {
            Some(port) => format!("{host}:{port}"),
            None => host.to_string(),
        };
        let authority = Authority::from_str(&authority)
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))?;

        let mut connector = HttpConnector::new();
        connector.set_connect_timeout(Some(settings.connect_timeout));
        connector.set_nodelay(true);

        let client = Client::builder(TokioExecutor::new())
            .pool_max_idle_per_host(0)
            .build(connector);

        Ok(Self {
            settings,
            authority,
            client,
        })
    }

    pub fn settings(&self) -> &ProxySettings {
        &self.settings
    }

    /// The upstream URI for a client request target.
    pub fn target(&self, uri: &Uri) -> Result<Uri, ForwardError> {
        let path_and_query = uri
            .path_and_query()
            .cloned()
            .unwrap_or_else(|| PathAndQuery::from_static("/"));

        Uri::builder()
            .scheme(Scheme::HTTP)
            .authority(self.authority.clone())
            .path_and_query(path_and_query)
            .build()
            .map_err(|e| ForwardError::InvalidTarget(e.to_string()))
    }

    /// Forward `request` from `client` and relay the response.
    pub async fn forward(
        &self,
        client: SocketAddr,
        request: Request<Body>,
    ) -> Result<Response, ForwardError> {
        let start = Instant::now();
        let request_id = request_id(request.headers());
        let (mut parts, body) = request.into_parts();

        parts.uri = self.target(&parts.uri)?;
        parts.version = Version::HTTP_11;
        strip_hop_by_hop(&mut parts.headers);
        set_forwarded(&mut parts.headers, client.ip());

        // An empty body stays empty so bodiless requests are not sent chunked.
        // A stall surfaces as an I/O timeout in the client error's source chain.
        let body = if body.is_end_stream() {
            body
        } else {
            let sent = idle_timeout(body.into_data_stream(), self.settings.send_timeout).map(
                |item| {
                    item.map_err(|e| match e {
                        StreamTimeoutError::Idle(_) => io::Error::new(io::ErrorKind::TimedOut, e),
                        StreamTimeoutError::Inner(inner) => io::Error::other(inner),
                    })
                },
            );
            Body::from_stream(sent)
        };
        let upstream_request = Request::from_parts(parts, body);

        tracing::debug!(
            request_id = %request_id,
            target = %upstream_request.uri(),
            "Forwarding request"
        );

        // Connect is bounded by the connector; the read timeout starts once
        // the connection could exist.
        let wait = self.settings.connect_timeout + self.settings.read_timeout;
        let response = match tokio::time::timeout(wait, self.client.request(upstream_request)).await
        {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                let err = if e.is_connect() && is_timeout(&e) {
                    ForwardError::ConnectTimeout(self.settings.connect_timeout)
                } else if e.is_connect() {
                    ForwardError::Connect(e)
                } else if is_timeout(&e) {
                    ForwardError::SendTimeout(self.settings.send_timeout)
                } else {
                    ForwardError::Upstream(e)
                };
                tracing::error!(request_id = %request_id, error = %err, "Upstream error");
                metrics::record_proxy_response(err.status().as_u16(), start.elapsed());
                return Err(err);
            }
            Err(_) => {
                let err = ForwardError::ReadTimeout(self.settings.read_timeout);
                tracing::error!(request_id = %request_id, error = %err, "Upstream timed out");
                metrics::record_proxy_response(err.status().as_u16(), start.elapsed());
                return Err(err);
            }
        };

        let status = response.status();
        metrics::record_proxy_response(status.as_u16(), start.elapsed());
        tracing::info!(
            request_id = %request_id,
            status = %status,
            elapsed = ?start.elapsed(),
            "Upstream responded"
        );

        let (mut parts, body) = response.into_parts();
        strip_hop_by_hop(&mut parts.headers);

        let read_timeout = self.settings.read_timeout;
        let relayed = idle_timeout(Body::new(body).into_data_stream(), read_timeout).inspect(
            move |item| {
                if let Err(e) = item {
                    let reason = if e.is_idle() { "read_timeout" } else { "upstream_error" };
                    metrics::record_upstream_abort(reason);
                    tracing::error!(
                        request_id = %request_id,
                        error = %e,
                        "Upstream body failed, aborting client response"
                    );
                }
            },
        );

        Ok(Response::from_parts(parts, Body::from_stream(relayed)))
    }
}

/// Proxy handler: forward everything to the current upstream.
pub async fn forward(
    State(state): State<ProxyState>,
    ConnectInfo(client): ConnectInfo<SocketAddr>,
    request: Request<Body>,
) -> Response {
    let upstream = state.upstream.load_full();
    match upstream.forward(client, request).await {
        Ok(response) => response,
        Err(e) => e.into_response(),
    }
}
