//! Request identification and forwarding preparation.
//!
//! # Responsibilities
//! - Assign every request an ID (client-supplied `x-request-id` or UUID v4)
//! - Expose the ID to handlers through request extensions
//! - Rewrite the request so a worker sees it as addressed to itself
//!
//! # Design Decisions
//! - The ID is attached before tracing so every span carries it
//! - Forwarding headers (`x-forwarded-for`, `x-forwarded-proto`) are appended, never replaced

use std::fmt;
use std::net::SocketAddr;

use axum::{
    body::Body,
    http::{header::HOST, uri::Authority, uri::Scheme, HeaderValue, Request, Uri},
    middleware::Next,
    response::Response,
};
use uuid::Uuid;

use crate::http::response::strip_hop_by_hop;

pub const X_REQUEST_ID: &str = "x-request-id";
pub const X_FORWARDED_FOR: &str = "x-forwarded-for";
pub const X_FORWARDED_PROTO: &str = "x-forwarded-proto";

/// Correlation ID carried through logs, worker request and client response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(String);

impl RequestId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn from_header(value: &HeaderValue) -> Option<Self> {
        value
            .to_str()
            .ok()
            .map(str::trim)
            .filter(|v| !v.is_empty() && v.len() <= 128)
            .map(|v| Self(v.to_string()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Read the request ID attached by [`request_id_layer`].
pub trait RequestIdExt {
    fn request_id(&self) -> Option<&RequestId>;
}

impl<B> RequestIdExt for Request<B> {
    fn request_id(&self) -> Option<&RequestId> {
        self.extensions().get::<RequestId>()
    }
}

/// Middleware: ensure the request has an ID and echo it on the response.
pub async fn request_id_layer(mut request: Request<Body>, next: Next) -> Response {
    let id = request
        .headers()
        .get(X_REQUEST_ID)
        .and_then(RequestId::from_header)
        .unwrap_or_default();

    if let Ok(value) = HeaderValue::from_str(id.as_str()) {
        request.headers_mut().insert(X_REQUEST_ID, value.clone());
        request.extensions_mut().insert(id);

        let mut response = next.run(request).await;
        response.headers_mut().insert(X_REQUEST_ID, value);
        return response;
    }

    next.run(request).await
}

/// Point `request` at the worker listening on `worker`, preserving path,
/// query, method and body.
pub fn prepare_upstream(request: &mut Request<Body>, worker: SocketAddr, client: SocketAddr) {
    let path_and_query = request
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/")
        .to_string();

    let mut parts = Uri::from_static("/").into_parts();
    parts.scheme = Some(Scheme::HTTP);
    parts.authority = worker.to_string().parse::<Authority>().ok();
    parts.path_and_query = path_and_query.parse().ok();
    if let Ok(uri) = Uri::from_parts(parts) {
        *request.uri_mut() = uri;
    }

    let headers = request.headers_mut();
    strip_hop_by_hop(headers);

    if !headers.contains_key(HOST) {
        if let Ok(value) = HeaderValue::from_str(&worker.to_string()) {
            headers.insert(HOST, value);
        }
    }

    let forwarded = match headers.get(X_FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
        Some(existing) => format!("{existing}, {}", client.ip()),
        None => client.ip().to_string(),
    };
    if let Ok(value) = HeaderValue::from_str(&forwarded) {
        headers.insert(X_FORWARDED_FOR, value);
    }
    if !headers.contains_key(X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO, HeaderValue::from_static("http"));
    }
}
