//! HTTP JSON-RPC transport backed by `reqwest`.
//!
//! `reqwest::Client` already keeps its own keep-alive pool; each
//! [`HttpConnection`] is a cheap handle onto it, and the provider's
//! [`ConnectionPool`](ethrpc_core::ConnectionPool) bounds how many requests
//! are in flight against the endpoint at once.
//!
//! A non-2xx status is a network error unless its body is itself a JSON-RPC
//! response, in which case the body is handed up for decoding.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};

use ethrpc_core::{Connection, JsonRpcResponse, Provider, ProviderConfig, Transport, TransportError};

/// Configuration for `HttpTransport`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpTransportConfig {
    /// TCP/TLS connect timeout.
    pub connect_timeout_ms: u64,
    /// Whole-request timeout enforced by the HTTP client itself.
    pub request_timeout_ms: u64,
    /// Idle keep-alive connections kept per host by the HTTP client.
    pub max_idle_per_host: usize,
}

impl Default for HttpTransportConfig {
    fn default() -> Self {
        Self {
            connect_timeout_ms: 10_000,
            request_timeout_ms: 30_000,
            max_idle_per_host: 8,
        }
    }
}

/// Opens [`HttpConnection`]s to one JSON-RPC endpoint.
pub struct HttpTransport {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Create a transport for the given JSON-RPC endpoint URL.
    pub fn new(url: impl Into<String>, config: HttpTransportConfig) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .pool_max_idle_per_host(config.max_idle_per_host)
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            url: url.into(),
            http,
            request_timeout: Duration::from_millis(config.request_timeout_ms),
        })
    }

    /// Create with default configuration.
    pub fn default_for(url: impl Into<String>) -> Result<Self, TransportError> {
        Self::new(url, HttpTransportConfig::default())
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn open(&self) -> Result<Box<dyn Connection>, TransportError> {
        Ok(Box::new(HttpConnection {
            url: self.url.clone(),
            http: self.http.clone(),
            request_timeout: self.request_timeout,
            open: true,
        }))
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// One checked-out handle for POSTing JSON-RPC payloads.
pub struct HttpConnection {
    url: String,
    http: reqwest::Client,
    request_timeout: Duration,
    open: bool,
}

impl HttpConnection {
    fn map_reqwest(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout {
                ms: self.request_timeout.as_millis() as u64,
            }
        } else {
            TransportError::Network(e.to_string())
        }
    }
}

#[async_trait]
impl Connection for HttpConnection {
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
        if !self.open {
            return Err(TransportError::Network("connection closed".into()));
        }

        let resp = self
            .http
            .post(&self.url)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .body(payload.to_vec())
            .send()
            .await
            .map_err(|e| self.map_reqwest(e))?;

        let status = resp.status();
        let body = resp.bytes().await.map_err(|e| self.map_reqwest(e))?;
        if status.is_success() {
            return Ok(body.to_vec());
        }

        // Nodes often pair 4xx/5xx with a JSON-RPC error object; that is a
        // protocol answer, not a transport failure.
        if serde_json::from_slice::<JsonRpcResponse>(&body).is_ok() {
            tracing::debug!(status = status.as_u16(), url = %self.url, "JSON-RPC error under non-success HTTP status");
            return Ok(body.to_vec());
        }
        tracing::debug!(status = status.as_u16(), url = %self.url, "non-success HTTP status");
        Err(TransportError::Network(format!(
            "HTTP {}: {}",
            status.as_u16(),
            String::from_utf8_lossy(&body)
        )))
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.open = false;
        Ok(())
    }
}

/// Build a [`Provider`] that talks HTTP to `url`.
///
/// The HTTP client's own timeout follows `config.request_timeout_ms`.
pub fn http_provider(url: impl Into<String>, config: ProviderConfig) -> Result<Provider, TransportError> {
    let transport = HttpTransport::new(
        url,
        HttpTransportConfig {
            request_timeout_ms: config.request_timeout_ms,
            max_idle_per_host: config.pool.size,
            ..HttpTransportConfig::default()
        },
    )?;
    Ok(Provider::new(Arc::new(transport), config))
}
