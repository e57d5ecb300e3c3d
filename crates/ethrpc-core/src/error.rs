//! Local and transport-level failures.
//!
//! A node-side JSON-RPC error is *not* a `TransportError`: it arrives inside
//! an `Ok(JsonRpcResponse)`. `TransportError::Rpc` exists only for the
//! [`call`](crate::transport::RpcProvider::call) convenience, which folds a
//! protocol error into the error channel.

use thiserror::Error;

use crate::request::JsonRpcError;

/// Errors that can occur while dispatching a request.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Transport failure: connection refused, reset, bad HTTP status, or an
    /// injected failure from a mock.
    #[error("Network error: {0}")]
    Network(String),

    /// Transport I/O did not complete within the configured duration.
    #[error("Request timed out after {ms}ms")]
    Timeout { ms: u64 },

    /// Local admission control rejected the request before any I/O.
    #[error("Rate limit exceeded")]
    RateLimited,

    /// No pooled connection became available in time.
    #[error("Connection pool exhausted after waiting {waited_ms}ms")]
    PoolExhausted { waited_ms: u64 },

    /// The connection pool has been closed.
    #[error("Connection pool closed")]
    PoolClosed,

    /// JSON-RPC protocol-level error returned by the node.
    #[error("RPC error {}: {}", .0.code, .0.message)]
    Rpc(JsonRpcError),

    /// Request could not be serialized or a result could not be deserialized.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An unexpected error.
    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Returns `true` if a higher layer may retry this error after backing off.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Network(_)
                | Self::Timeout { .. }
                | Self::RateLimited
                | Self::PoolExhausted { .. }
        )
    }

    /// Returns `true` for failures that happened on the wire (or were injected
    /// to look like it).
    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout { .. })
    }

    /// Returns `true` if this is a node-side execution error.
    pub fn is_execution_error(&self) -> bool {
        matches!(self, Self::Rpc(_))
    }
}
