//! ethrpc-http — HTTP transport for the ethrpc provider.
//!
//! # Quick start
//! ```rust,no_run
//! use ethrpc_core::{ProviderConfig, RpcProvider};
//! use ethrpc_http::http_provider;
//!
//! # async fn run() -> Result<(), ethrpc_core::TransportError> {
//! let provider = http_provider("https://cloudflare-eth.com", ProviderConfig::default())?;
//! let _block: String = provider.call(provider.next_id(), "eth_blockNumber", serde_json::json!([])).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;

pub use client::{http_provider, HttpConnection, HttpTransport, HttpTransportConfig};
