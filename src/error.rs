//! Unified error type.

use std::time::Duration;

use crate::method::Method;

/// The error type returned by waypost's fallible operations.
///
/// Application-level errors (404, 501, etc.) are expressed as HTTP
/// [`Response`](crate::Response) values, not as `Error`s. This type surfaces
/// infrastructure failures: a bad route table, binding a port, a dead
/// listener, or a shutdown that blew its deadline.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    /// Two routes claim the same method and path (or overlapping wildcards).
    #[error("route `{method} {path}` conflicts with `{with}`")]
    RouteConflict {
        method: Method,
        path: String,
        with: String,
    },

    #[error("version prefix `{0}` is registered more than once")]
    DuplicateVersion(String),

    #[error("invalid route `{path}`: {reason}")]
    InvalidRoute { path: String, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    /// The accept loop stopped on a non-transient error.
    #[error("listener failed: {0}")]
    Listener(std::io::Error),

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),
}
