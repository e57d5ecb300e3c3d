//! ethrpc-core — JSON-RPC provider core for Ethereum-compatible nodes.
//!
//! # Overview
//!
//! - [`JsonRpcRequest`] / [`JsonRpcResponse`] / [`ErrorKind`] — wire types and
//!   the JSON-RPC 2.0 error model
//! - [`TransportError`] — local and transport failures, one variant per kind
//! - [`Transport`] / [`Connection`] — the byte-level collaborator seam
//! - [`RpcProvider`] — the `request(method, params, id)` contract
//! - [`policy`] module — token bucket admission control
//! - [`pool`] module — bounded connection pool
//! - [`Provider`] — dispatch composed of the three above

pub mod config;
pub mod error;
pub mod policy;
pub mod pool;
pub mod provider;
pub mod request;
pub mod transport;

pub use config::ProviderConfig;
pub use error::TransportError;
pub use policy::{RateLimiter, RateLimiterConfig};
pub use pool::{ConnectionPool, PoolConfig, PooledConnection};
pub use provider::Provider;
pub use request::{ErrorKind, JsonRpcError, JsonRpcRequest, JsonRpcResponse, RpcParam};
pub use transport::{Connection, RpcProvider, Transport};
