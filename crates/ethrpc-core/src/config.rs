//! Provider configuration.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::policy::RateLimiterConfig;
use crate::pool::PoolConfig;

/// Configuration for [`Provider`](crate::provider::Provider).
///
/// Every field has a default, so a partial JSON document is valid:
///
/// ```json
/// { "rate_limiter": { "max_tokens": 5, "tokens_per_second": 5.0 },
///   "pool": { "size": 4 },
///   "request_timeout_ms": 10000 }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    pub rate_limiter: RateLimiterConfig,
    pub pool: PoolConfig,
    /// Upper bound on a single transport round-trip.
    pub request_timeout_ms: u64,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            rate_limiter: RateLimiterConfig::default(),
            pool: PoolConfig::default(),
            request_timeout_ms: 30_000,
        }
    }
}

impl ProviderConfig {
    /// Parse a JSON configuration document.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}
