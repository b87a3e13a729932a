//! Response handling and transformation.
//!
//! # Responsibilities
//! - Strip hop-by-hop headers in both directions
//! - Map dispatch failures to gateway status codes
//!
//! # Design Decisions
//! - A worker's response is buffered in full under the request deadline, so a
//!   worker that stalls mid-body still counts as timed out
//! - No worker free within the queue timeout → 503
//! - Worker exceeded the request timeout → 504
//! - Worker unreachable or broke the connection → 502

use axum::{
    body::Body,
    http::{header, HeaderMap, HeaderName, StatusCode},
    response::{IntoResponse, Response},
};

/// Headers that describe a single connection and must not be forwarded.
const HOP_BY_HOP: [HeaderName; 7] = [
    header::CONNECTION,
    header::PROXY_AUTHENTICATE,
    header::PROXY_AUTHORIZATION,
    header::TE,
    header::TRAILER,
    header::TRANSFER_ENCODING,
    header::UPGRADE,
];

pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Headers named in `Connection` are connection-scoped too.
    let named: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in named.iter().chain(HOP_BY_HOP.iter()) {
        headers.remove(name);
    }
    headers.remove("keep-alive");
}

/// Why the arbiter answered instead of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchFailure {
    /// Every worker stayed busy for the whole queue timeout.
    NoWorker,
    /// The worker did not finish within the request timeout.
    Timeout,
    /// The worker could not be reached or sent a broken response.
    Upstream,
}

impl DispatchFailure {
    pub fn status(self) -> StatusCode {
        match self {
            DispatchFailure::NoWorker => StatusCode::SERVICE_UNAVAILABLE,
            DispatchFailure::Timeout => StatusCode::GATEWAY_TIMEOUT,
            DispatchFailure::Upstream => StatusCode::BAD_GATEWAY,
        }
    }

    fn message(self) -> &'static str {
        match self {
            DispatchFailure::NoWorker => "No worker available",
            DispatchFailure::Timeout => "Worker timed out",
            DispatchFailure::Upstream => "Worker request failed",
        }
    }
}

impl IntoResponse for DispatchFailure {
    fn into_response(self) -> Response {
        let mut response = Response::new(Body::from(self.message()));
        *response.status_mut() = self.status();
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn hop_by_hop_headers_are_removed() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONNECTION, HeaderValue::from_static("close, x-trace-hop"));
        headers.insert("x-trace-hop", HeaderValue::from_static("1"));
        headers.insert("keep-alive", HeaderValue::from_static("timeout=5"));
        headers.insert(header::TRANSFER_ENCODING, HeaderValue::from_static("chunked"));
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("application/json"));

        strip_hop_by_hop(&mut headers);

        assert_eq!(headers.len(), 1);
        assert_eq!(headers[header::CONTENT_TYPE], "application/json");
    }

    #[test]
    fn failures_map_to_gateway_statuses() {
        assert_eq!(DispatchFailure::NoWorker.status(), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(DispatchFailure::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(DispatchFailure::Upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            DispatchFailure::Timeout.into_response().status(),
            StatusCode::GATEWAY_TIMEOUT
        );
    }
}
