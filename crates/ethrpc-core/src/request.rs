//! JSON-RPC 2.0 wire types and the response/error model.
//!
//! A [`JsonRpcResponse`] always carries exactly one outcome: a `result`
//! value or an `error` object. The invariant is held by the type itself,
//! so a response can only be built through the constructors here or by
//! decoding a well-formed payload. Whoever receives a response owns it.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Protocol version string sent and expected on every message.
pub const JSONRPC_VERSION: &str = "2.0";

/// A single JSON-RPC parameter value.
pub type RpcParam = Value;

/// A JSON-RPC 2.0 request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: String,
    pub method: String,
    pub params: Value,
    pub id: u64,
}

impl JsonRpcRequest {
    /// Create a new JSON-RPC 2.0 request.
    ///
    /// `Value::Null` params are sent as an empty array.
    pub fn new(id: u64, method: impl Into<String>, params: Value) -> Self {
        let params = match params {
            Value::Null => Value::Array(Vec::new()),
            other => other,
        };
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            method: method.into(),
            params,
            id,
        }
    }

    /// Serialize to the bytes handed to a transport connection.
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Canonical JSON-RPC 2.0 error categories plus the Ethereum server range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// `-32700`: the payload was not valid JSON.
    ParseError,
    /// `-32600`: the payload was JSON but not a valid request.
    InvalidRequest,
    /// `-32601`: no such method.
    MethodNotFound,
    /// `-32602`: invalid method parameters.
    InvalidParams,
    /// `-32603`: internal JSON-RPC error.
    InternalError,
    /// `-32000..=-32099`: node-specific errors (e.g. insufficient funds).
    ServerError(i32),
    /// Any code outside the reserved table.
    Other(i32),
}

impl ErrorKind {
    pub const PARSE_ERROR: i32 = -32700;
    pub const INVALID_REQUEST: i32 = -32600;
    pub const METHOD_NOT_FOUND: i32 = -32601;
    pub const INVALID_PARAMS: i32 = -32602;
    pub const INTERNAL_ERROR: i32 = -32603;
    pub const SERVER_ERROR_MIN: i32 = -32099;
    pub const SERVER_ERROR_MAX: i32 = -32000;

    /// The numeric code sent on the wire.
    pub fn code(self) -> i32 {
        match self {
            Self::ParseError => Self::PARSE_ERROR,
            Self::InvalidRequest => Self::INVALID_REQUEST,
            Self::MethodNotFound => Self::METHOD_NOT_FOUND,
            Self::InvalidParams => Self::INVALID_PARAMS,
            Self::InternalError => Self::INTERNAL_ERROR,
            Self::ServerError(code) | Self::Other(code) => code,
        }
    }

    /// Classify an arbitrary error code.
    pub fn from_code(code: i32) -> Self {
        match code {
            Self::PARSE_ERROR => Self::ParseError,
            Self::INVALID_REQUEST => Self::InvalidRequest,
            Self::METHOD_NOT_FOUND => Self::MethodNotFound,
            Self::INVALID_PARAMS => Self::InvalidParams,
            Self::INTERNAL_ERROR => Self::InternalError,
            c if (Self::SERVER_ERROR_MIN..=Self::SERVER_ERROR_MAX).contains(&c) => {
                Self::ServerError(c)
            }
            c => Self::Other(c),
        }
    }

    /// Message used when an error is built from a kind alone.
    pub fn default_message(self) -> &'static str {
        match self {
            Self::ParseError => "Parse error",
            Self::InvalidRequest => "Invalid request",
            Self::MethodNotFound => "Method not found",
            Self::InvalidParams => "Invalid params",
            Self::InternalError => "Internal error",
            Self::ServerError(_) => "Server error",
            Self::Other(_) => "Unknown error",
        }
    }

    /// Returns `true` for node-specific codes in `-32000..=-32099`.
    pub fn is_server_error(self) -> bool {
        matches!(self, Self::ServerError(_))
    }
}

/// A JSON-RPC 2.0 error object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    pub fn from_kind(kind: ErrorKind) -> Self {
        Self::new(kind.code(), kind.default_message())
    }

    pub fn kind(&self) -> ErrorKind {
        ErrorKind::from_code(self.code)
    }
}

impl std::fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JSON-RPC error {}: {}", self.code, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Outcome {
    Result(Value),
    Error(JsonRpcError),
}

/// A JSON-RPC 2.0 response: exactly one of `result` or `error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(into = "RawResponse", try_from = "RawResponse")]
pub struct JsonRpcResponse {
    id: u64,
    outcome: Outcome,
}

impl JsonRpcResponse {
    /// A successful response carrying `result`.
    pub fn success(result: impl Into<Value>, id: u64) -> Self {
        Self {
            id,
            outcome: Outcome::Result(result.into()),
        }
    }

    /// An error response with an explicit code and message.
    pub fn custom_error(code: i32, message: impl Into<String>, id: u64) -> Self {
        Self::from_error(JsonRpcError::new(code, message), id)
    }

    /// An error response using the canonical code and message for `kind`.
    pub fn error(kind: ErrorKind, id: u64) -> Self {
        Self::from_error(JsonRpcError::from_kind(kind), id)
    }

    pub fn from_error(error: JsonRpcError, id: u64) -> Self {
        Self {
            id,
            outcome: Outcome::Error(error),
        }
    }

    /// Correlation id, equal to the id of the request that produced it.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn result(&self) -> Option<&Value> {
        match &self.outcome {
            Outcome::Result(v) => Some(v),
            Outcome::Error(_) => None,
        }
    }

    pub fn error_object(&self) -> Option<&JsonRpcError> {
        match &self.outcome {
            Outcome::Error(e) => Some(e),
            Outcome::Result(_) => None,
        }
    }

    /// Returns `true` if this is a successful response.
    pub fn is_ok(&self) -> bool {
        matches!(self.outcome, Outcome::Result(_))
    }

    /// Unwrap the result value or return the protocol error.
    pub fn into_result(self) -> Result<Value, JsonRpcError> {
        match self.outcome {
            Outcome::Result(v) => Ok(v),
            Outcome::Error(e) => Err(e),
        }
    }

    /// Decode a raw node payload for the request `expected_id`.
    ///
    /// Never fails: a malformed body, a payload with both or neither of
    /// `result`/`error`, or a mismatched id becomes a `-32700` response
    /// tagged with `expected_id`. An error object with a `null` id (the
    /// node could not read the request id) is re-tagged with `expected_id`.
    pub fn decode(bytes: &[u8], expected_id: u64) -> Self {
        match Self::try_decode(bytes, expected_id) {
            Ok(resp) => resp,
            Err(reason) => {
                tracing::warn!(id = expected_id, %reason, "malformed JSON-RPC response");
                Self::custom_error(
                    ErrorKind::PARSE_ERROR,
                    format!("{}: {reason}", ErrorKind::ParseError.default_message()),
                    expected_id,
                )
            }
        }
    }

    fn try_decode(bytes: &[u8], expected_id: u64) -> Result<Self, String> {
        let mut raw: RawResponse = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        if raw.id.is_none() && raw.error.is_some() {
            raw.id = Some(expected_id);
        }
        let resp = Self::try_from(raw)?;
        if resp.id != expected_id {
            return Err(format!(
                "response id {} does not match request id {expected_id}",
                resp.id
            ));
        }
        Ok(resp)
    }
}

fn present<'de, D: Deserializer<'de>>(d: D) -> Result<Option<Value>, D::Error> {
    // A literal `"result": null` is a valid success, unlike an absent field.
    Value::deserialize(d).map(Some)
}

fn default_version() -> String {
    JSONRPC_VERSION.into()
}

#[derive(Serialize, Deserialize)]
struct RawResponse {
    #[serde(default = "default_version")]
    jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none", deserialize_with = "present")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
    #[serde(default)]
    id: Option<u64>,
}

impl TryFrom<RawResponse> for JsonRpcResponse {
    type Error = String;

    fn try_from(raw: RawResponse) -> Result<Self, Self::Error> {
        if raw.jsonrpc != JSONRPC_VERSION {
            return Err(format!("unsupported jsonrpc version {:?}", raw.jsonrpc));
        }
        let id = raw.id.ok_or("missing id")?;
        let outcome = match (raw.result, raw.error) {
            (Some(result), None) => Outcome::Result(result),
            (None, Some(error)) => Outcome::Error(error),
            (Some(_), Some(_)) => return Err("both result and error present".into()),
            (None, None) => return Err("neither result nor error present".into()),
        };
        Ok(Self { id, outcome })
    }
}

impl From<JsonRpcResponse> for RawResponse {
    fn from(resp: JsonRpcResponse) -> Self {
        let (result, error) = match resp.outcome {
            Outcome::Result(v) => (Some(v), None),
            Outcome::Error(e) => (None, Some(e)),
        };
        Self {
            jsonrpc: JSONRPC_VERSION.into(),
            result,
            error,
            id: Some(resp.id),
        }
    }
}
