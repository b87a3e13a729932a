//! Public TCP listener.
//!
//! # Responsibilities
//! - Bind the resolved `host:port` exactly once at startup
//! - Report an occupied port as a distinct, fatal error
//! - Hand the socket to the HTTP server

use std::net::SocketAddr;

use thiserror::Error;
use tokio::net::TcpListener;

/// Error type for listener operations.
#[derive(Debug, Error)]
pub enum ListenerError {
    /// The address string did not parse.
    #[error("invalid listen address {address:?}: {reason}")]
    Address { address: String, reason: String },
    /// Failed to bind to address (usually already in use).
    #[error("failed to bind {address}: {source}")]
    Bind {
        address: String,
        #[source]
        source: std::io::Error,
    },
}

/// A bound listener, not yet serving.
#[derive(Debug)]
pub struct Listener {
    inner: TcpListener,
    local_addr: SocketAddr,
}

impl Listener {
    /// Bind to `address` (`host:port`). No retry: an occupied port is fatal.
    pub async fn bind(address: &str) -> Result<Self, ListenerError> {
        let addr: SocketAddr = address.parse().map_err(|e: std::net::AddrParseError| {
            ListenerError::Address {
                address: address.to_string(),
                reason: e.to_string(),
            }
        })?;

        let inner = TcpListener::bind(addr)
            .await
            .map_err(|source| ListenerError::Bind {
                address: address.to_string(),
                source,
            })?;

        let local_addr = inner.local_addr().map_err(|source| ListenerError::Bind {
            address: address.to_string(),
            source,
        })?;

        tracing::info!(address = %local_addr, "Listener bound");

        Ok(Self { inner, local_addr })
    }

    /// Get the local address this listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn into_inner(self) -> TcpListener {
        self.inner
    }
}
