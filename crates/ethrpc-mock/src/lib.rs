//! ethrpc-mock — a stand-in for [`ethrpc_core::Provider`] in tests.
//!
//! [`MockProvider`] answers `request(method, params, id)` from a table of
//! configured [`MockResponse`]s, counts calls per method, simulates latency
//! and can start failing with a network error after a set number of calls.
//! It implements [`ethrpc_core::RpcProvider`], so code written against that
//! trait can be exercised without a live node.
//!
//! ```rust
//! use ethrpc_core::RpcProvider;
//! use ethrpc_mock::{MockProvider, MockResponse};
//! use serde_json::json;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = MockProvider::new();
//! mock.set_response("eth_chainId", MockResponse::success("0x1"));
//!
//! let resp = mock.request("eth_chainId", json!([]), 1).await.unwrap();
//! assert_eq!(resp.result(), Some(&json!("0x1")));
//! assert_eq!(mock.call_count("eth_chainId"), 1);
//! # }
//! ```

pub mod provider;
pub mod response;

pub use provider::{MockProvider, RecordedRequest, DEFAULT_REQUEST_LOG_LIMIT};
pub use response::{MockOutcome, MockResponse};
