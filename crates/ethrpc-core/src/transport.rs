//! Collaborator seams: the byte-level transport below the provider, and the
//! `request` contract shared by [`Provider`](crate::provider::Provider) and
//! test doubles.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::TransportError;
use crate::request::JsonRpcResponse;

/// One established connection to a node.
///
/// A connection is used by one request at a time; the pool guarantees it is
/// never checked out twice.
#[async_trait]
pub trait Connection: Send + 'static {
    /// Send a serialized JSON-RPC request and return the raw response body.
    async fn send(&mut self, payload: &[u8]) -> Result<Vec<u8>, TransportError>;

    /// Tear the connection down. Called for broken connections and on pool close.
    async fn close(&mut self) -> Result<(), TransportError> {
        Ok(())
    }
}

/// Opens connections to a single endpoint.
///
/// # Object Safety
/// The trait is object-safe and can be stored as `Arc<dyn Transport>`.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Establish a new connection.
    async fn open(&self) -> Result<Box<dyn Connection>, TransportError>;

    /// Return the transport's identifier (URL or name).
    fn url(&self) -> &str;
}

/// The request contract every provider implements.
///
/// A returned `Ok` response may still carry a protocol error from the node;
/// `Err` is reserved for local and transport failures. The caller owns the
/// returned response.
#[async_trait]
pub trait RpcProvider: Send + Sync {
    /// Dispatch `method` with `params` under correlation id `id`.
    async fn request(
        &self,
        method: &str,
        params: Value,
        id: u64,
    ) -> Result<JsonRpcResponse, TransportError>;

    /// Convenience: call a method and deserialize the result.
    async fn call<T: DeserializeOwned>(
        &self,
        id: u64,
        method: &str,
        params: Value,
    ) -> Result<T, TransportError>
    where
        Self: Sized,
    {
        let resp = self.request(method, params, id).await?;
        let result = resp.into_result().map_err(TransportError::Rpc)?;
        serde_json::from_value(result).map_err(TransportError::Serialization)
    }
}
