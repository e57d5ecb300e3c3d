//! Production request dispatch.
//!
//! ```text
//! request → RateLimiter::try_acquire → ConnectionPool::acquire
//!         → Connection::send → JsonRpcResponse::decode → release
//! ```
//!
//! Nothing here retries. Each failure comes back as its own
//! [`TransportError`] variant so a layer above can pick a policy per kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::error::TransportError;
use crate::policy::RateLimiter;
use crate::pool::ConnectionPool;
use crate::request::{JsonRpcRequest, JsonRpcResponse};
use crate::transport::{RpcProvider, Transport};

/// JSON-RPC provider for a single node endpoint.
///
/// Bookkeeping is split per concern: the limiter has its own lock, the pool
/// its own semaphore and free list. No lock is held while waiting for a
/// pooled connection or during transport I/O, so unrelated requests proceed
/// concurrently.
pub struct Provider {
    transport: Arc<dyn Transport>,
    limiter: RateLimiter,
    pool: ConnectionPool,
    request_timeout: Duration,
    next_id: AtomicU64,
}

impl Provider {
    pub fn new(transport: Arc<dyn Transport>, config: ProviderConfig) -> Self {
        let request_timeout = config.request_timeout();
        Self {
            pool: ConnectionPool::new(Arc::clone(&transport), config.pool),
            limiter: RateLimiter::new(config.rate_limiter),
            transport,
            request_timeout,
            next_id: AtomicU64::new(1),
        }
    }

    /// Create with default configuration.
    pub fn default_for(transport: Arc<dyn Transport>) -> Self {
        Self::new(transport, ProviderConfig::default())
    }

    pub fn url(&self) -> &str {
        self.transport.url()
    }

    /// A fresh request id, unique for this provider.
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.limiter
    }

    pub fn pool(&self) -> &ConnectionPool {
        &self.pool
    }

    /// Close idle connections; later requests fail with `PoolClosed`.
    pub async fn close(&self) -> usize {
        self.pool.close().await
    }
}

#[async_trait]
impl RpcProvider for Provider {
    async fn request(
        &self,
        method: &str,
        params: Value,
        id: u64,
    ) -> Result<JsonRpcResponse, TransportError> {
        if !self.limiter.try_acquire() {
            tracing::warn!(method, id, url = %self.url(), "rate limited, request rejected");
            return Err(TransportError::RateLimited);
        }

        let payload = JsonRpcRequest::new(id, method, params).to_bytes()?;
        let mut conn = self.pool.acquire().await?;

        tracing::debug!(method, id, url = %self.url(), "dispatching request");
        let sent = tokio::time::timeout(self.request_timeout, conn.send(&payload)).await;
        let raw = match sent {
            Ok(Ok(raw)) => raw,
            Ok(Err(e)) => {
                tracing::warn!(method, id, error = %e, url = %self.url(), "transport failure");
                conn.discard().await;
                return Err(e);
            }
            Err(_) => {
                let ms = self.request_timeout.as_millis() as u64;
                tracing::warn!(method, id, timeout_ms = ms, url = %self.url(), "request timed out");
                conn.discard().await;
                return Err(TransportError::Timeout { ms });
            }
        };
        self.pool.release(conn);

        Ok(JsonRpcResponse::decode(&raw, id))
    }
}

impl std::fmt::Debug for Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Provider")
            .field("url", &self.url())
            .field("pool", &self.pool)
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::RateLimiterConfig;
    use crate::pool::PoolConfig;
    use crate::request::ErrorKind;
    use crate::transport::Connection;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    type Script = dyn Fn(&JsonRpcRequest) -> Result<Vec<u8>, TransportError> + Send + Sync;

    /// Transport whose connections answer every request through `script`
    /// after `latency`.
    struct ScriptedTransport {
        script: Arc<Script>,
        latency: Duration,
        opened: AtomicUsize,
        closed: Arc<AtomicUsize>,
    }

    impl ScriptedTransport {
        fn new(
            latency: Duration,
            script: impl Fn(&JsonRpcRequest) -> Result<Vec<u8>, TransportError> + Send + Sync + 'static,
        ) -> Arc<Self> {
            Arc::new(Self {
                script: Arc::new(script),
                latency,
                opened: AtomicUsize::new(0),
                closed: Arc::new(AtomicUsize::new(0)),
            })
        }

        fn echo(latency: Duration, result: Value) -> Arc<Self> {
            Self::new(latency, move |req| {
                Ok(serde_json::to_vec(&JsonRpcResponse::success(result.clone(), req.id)).unwrap())
            })
        }
    }

    struct ScriptedConn {
        script: Arc<Script>,
        latency: Duration,
        closed: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for ScriptedConn {
        async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError> {
            if !self.latency.is_zero() {
                tokio::time::sleep(self.latency).await;
            }
            let req: JsonRpcRequest = serde_json::from_slice(payload)?;
            (self.script)(&req)
        }

        async fn close(&mut self) -> Result<(), TransportError> {
            self.closed.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn open(&self) -> Result<Box<dyn Connection>, TransportError> {
            self.opened.fetch_add(1, Ordering::SeqCst);
            Ok(Box::new(ScriptedConn {
                script: Arc::clone(&self.script),
                latency: self.latency,
                closed: Arc::clone(&self.closed),
            }))
        }

        fn url(&self) -> &str {
            "scripted://node"
        }
    }

    fn config(max_tokens: u32, pool_size: usize) -> ProviderConfig {
        ProviderConfig {
            rate_limiter: RateLimiterConfig {
                max_tokens,
                tokens_per_second: 0.0,
            },
            pool: PoolConfig {
                size: pool_size,
                acquire_timeout_ms: 1_000,
            },
            request_timeout_ms: 1_000,
        }
    }

    #[tokio::test]
    async fn success_round_trip() {
        let transport = ScriptedTransport::echo(Duration::ZERO, json!("0x123abc"));
        let provider = Provider::new(transport, config(100, 2));

        let resp = provider.request("eth_blockNumber", json!([]), 1).await.unwrap();
        assert_eq!(resp.id(), 1);
        assert_eq!(resp.result(), Some(&json!("0x123abc")));
        assert_eq!(provider.pool().in_use(), 0);
        assert_eq!(provider.pool().idle(), 1);
    }

    #[tokio::test]
    async fn request_is_serialized_on_the_wire() {
        let transport = ScriptedTransport::new(Duration::ZERO, |req| {
            assert_eq!(req.jsonrpc, "2.0");
            assert_eq!(req.method, "eth_getBalance");
            assert_eq!(req.params, json!(["0xabc", "latest"]));
            Ok(serde_json::to_vec(&JsonRpcResponse::success("0x0", req.id)).unwrap())
        });
        let provider = Provider::new(transport, config(100, 1));
        let resp = provider
            .request("eth_getBalance", json!(["0xabc", "latest"]), 42)
            .await
            .unwrap();
        assert_eq!(resp.id(), 42);
    }

    #[tokio::test]
    async fn protocol_error_is_not_a_transport_error() {
        let transport = ScriptedTransport::new(Duration::ZERO, |req| {
            Ok(serde_json::to_vec(&JsonRpcResponse::custom_error(
                -32000,
                "insufficient funds",
                req.id,
            ))
            .unwrap())
        });
        let provider = Provider::new(transport, config(100, 1));
        let resp = provider.request("eth_call", json!([]), 3).await.unwrap();
        let err = resp.error_object().unwrap();
        assert_eq!(err.code, -32000);
        assert_eq!(err.message, "insufficient funds");
    }

    #[tokio::test]
    async fn malformed_payload_becomes_parse_error() {
        let transport = ScriptedTransport::new(Duration::ZERO, |_| Ok(b"<html>502</html>".to_vec()));
        let provider = Provider::new(transport, config(100, 1));
        let resp = provider.request("eth_chainId", Value::Null, 8).await.unwrap();
        assert_eq!(resp.id(), 8);
        assert_eq!(resp.error_object().unwrap().kind(), ErrorKind::ParseError);
    }

    #[tokio::test]
    async fn rate_limit_rejects_before_any_io() {
        let transport = ScriptedTransport::echo(Duration::ZERO, json!("0x1"));
        let provider = Provider::new(transport.clone(), config(2, 1));

        provider.request("eth_gasPrice", json!([]), 1).await.unwrap();
        provider.request("eth_gasPrice", json!([]), 2).await.unwrap();
        let err = provider.request("eth_gasPrice", json!([]), 3).await.unwrap_err();
        assert!(matches!(err, TransportError::RateLimited));
        assert_eq!(transport.opened.load(Ordering::SeqCst), 1);
        assert_eq!(provider.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn transport_failure_discards_connection() {
        let transport =
            ScriptedTransport::new(Duration::ZERO, |_| Err(TransportError::Network("reset".into())));
        let provider = Provider::new(transport.clone(), config(100, 1));

        let err = provider.request("eth_getCode", json!([]), 1).await.unwrap_err();
        assert!(matches!(err, TransportError::Network(_)));
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        assert_eq!(provider.pool().in_use(), 0);
        assert_eq!(provider.pool().idle(), 0);
    }

    #[tokio::test]
    async fn slow_transport_times_out_and_releases() {
        let transport = ScriptedTransport::echo(Duration::from_millis(300), json!("0x1"));
        let mut cfg = config(100, 1);
        cfg.request_timeout_ms = 30;
        let provider = Provider::new(transport, cfg);

        let err = provider.request("eth_estimateGas", json!([]), 1).await.unwrap_err();
        assert!(matches!(err, TransportError::Timeout { ms: 30 }));
        assert_eq!(provider.pool().in_use(), 0);
    }

    #[tokio::test]
    async fn cancelled_request_does_not_recycle_connection() {
        let transport = ScriptedTransport::echo(Duration::from_millis(200), json!("0x1"));
        let provider = Provider::new(transport.clone(), config(100, 1));

        let cut = tokio::time::timeout(
            Duration::from_millis(10),
            provider.request("eth_call", json!([]), 1),
        )
        .await;
        assert!(cut.is_err());
        assert_eq!(provider.pool().in_use(), 0);
        assert_eq!(provider.pool().idle(), 0);

        let resp = provider.request("eth_call", json!([]), 2).await.unwrap();
        assert_eq!(resp.id(), 2);
        assert_eq!(transport.opened.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn exhausted_pool_is_reported() {
        let transport = ScriptedTransport::echo(Duration::from_millis(200), json!("0x1"));
        let mut cfg = config(100, 1);
        cfg.pool.acquire_timeout_ms = 20;
        let provider = Arc::new(Provider::new(transport, cfg));

        let slow = {
            let provider = Arc::clone(&provider);
            tokio::spawn(async move { provider.request("eth_call", json!([]), 1).await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let err = provider.request("eth_call", json!([]), 2).await.unwrap_err();
        assert!(matches!(err, TransportError::PoolExhausted { .. }));
        assert!(slow.await.unwrap().is_ok());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_requests_are_not_serialized() {
        let transport = ScriptedTransport::echo(Duration::from_millis(100), json!("0x1"));
        let provider = Arc::new(Provider::new(transport, config(100, 4)));

        let start = Instant::now();
        let tasks: Vec<_> = (0..4)
            .map(|i| {
                let provider = Arc::clone(&provider);
                tokio::spawn(async move { provider.request("eth_blockNumber", json!([]), i).await })
            })
            .collect();
        for task in tasks {
            assert!(task.await.unwrap().unwrap().is_ok());
        }
        assert!(start.elapsed() < Duration::from_millis(350), "took {:?}", start.elapsed());
    }

    #[tokio::test]
    async fn call_deserializes_result() {
        let transport = ScriptedTransport::echo(Duration::ZERO, json!("0x123abc"));
        let provider = Provider::new(transport, config(100, 1));
        let hex: String = provider.call(provider.next_id(), "eth_blockNumber", json!([])).await.unwrap();
        assert_eq!(u64::from_str_radix(hex.trim_start_matches("0x"), 16).unwrap(), 1_194_684);
    }

    #[tokio::test]
    async fn call_surfaces_protocol_error() {
        let transport = ScriptedTransport::new(Duration::ZERO, |req| {
            Ok(serde_json::to_vec(&JsonRpcResponse::error(ErrorKind::MethodNotFound, req.id)).unwrap())
        });
        let provider = Provider::new(transport, config(100, 1));
        let err = provider
            .call::<String>(1, "eth_unknown", json!([]))
            .await
            .unwrap_err();
        assert!(err.is_execution_error());
    }

    #[tokio::test]
    async fn closed_provider_rejects_requests() {
        let transport = ScriptedTransport::echo(Duration::ZERO, json!("0x1"));
        let provider = Provider::new(transport.clone(), config(100, 2));
        provider.request("eth_chainId", json!([]), 1).await.unwrap();

        assert_eq!(provider.close().await, 1);
        assert_eq!(transport.closed.load(Ordering::SeqCst), 1);
        let err = provider.request("eth_chainId", json!([]), 2).await.unwrap_err();
        assert!(matches!(err, TransportError::PoolClosed));
    }

    #[test]
    fn ids_are_monotonic() {
        let transport = ScriptedTransport::echo(Duration::ZERO, json!("0x1"));
        let provider = Provider::default_for(transport);
        let a = provider.next_id();
        let b = provider.next_id();
        assert!(b > a);
    }
}
