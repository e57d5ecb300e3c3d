//! Response templates.

use std::time::Duration;

use serde_json::Value;

use ethrpc_core::{ErrorKind, JsonRpcError, JsonRpcResponse};

/// What a configured method answers with: a result or an error, never both.
#[derive(Debug, Clone, PartialEq)]
pub enum MockOutcome {
    Result(Value),
    Error(JsonRpcError),
}

/// Template from which a [`JsonRpcResponse`] is built on every matching call.
#[derive(Debug, Clone, PartialEq)]
pub struct MockResponse {
    outcome: MockOutcome,
    delay: Duration,
}

impl MockResponse {
    /// Answer with `result`.
    pub fn success(result: impl Into<Value>) -> Self {
        Self {
            outcome: MockOutcome::Result(result.into()),
            delay: Duration::ZERO,
        }
    }

    /// Answer with a JSON-RPC error object.
    pub fn failure(code: i32, message: impl Into<String>) -> Self {
        Self {
            outcome: MockOutcome::Error(JsonRpcError::new(code, message)),
            delay: Duration::ZERO,
        }
    }

    /// Answer with the canonical error for `kind`.
    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::failure(kind.code(), kind.default_message())
    }

    /// Attach `data` to an error outcome (e.g. revert bytes). No effect on a result.
    pub fn with_error_data(mut self, data: impl Into<Value>) -> Self {
        if let MockOutcome::Error(err) = &mut self.outcome {
            err.data = Some(data.into());
        }
        self
    }

    /// Simulate `ms` milliseconds of latency before answering.
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay = Duration::from_millis(ms);
        self
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    pub fn outcome(&self) -> &MockOutcome {
        &self.outcome
    }

    /// Build the response for request `id`.
    pub fn to_response(&self, id: u64) -> JsonRpcResponse {
        match &self.outcome {
            MockOutcome::Result(v) => JsonRpcResponse::success(v.clone(), id),
            MockOutcome::Error(e) => JsonRpcResponse::from_error(e.clone(), id),
        }
    }
}
