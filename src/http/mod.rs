//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection on the public listener
//!     → server.rs (Axum setup, middleware)
//!     → request.rs (attach request ID)
//!     → workers::pool (claim one idle worker, wait up to the queue timeout)
//!     → request.rs (rewrite URI and forwarding headers for the worker)
//!     → worker responds within the request timeout, or is condemned
//!     → response.rs (strip hop-by-hop headers, map failures)
//!     → Send to client
//! ```

pub mod request;
pub mod response;
pub mod server;

pub use request::{RequestId, RequestIdExt, X_REQUEST_ID};
pub use response::DispatchFailure;
pub use server::HttpServer;
