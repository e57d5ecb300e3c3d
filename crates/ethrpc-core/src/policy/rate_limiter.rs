//! Token bucket rate limiter.
//!
//! Tokens accrue at `tokens_per_second` up to `max_tokens`. Refill is lazy:
//! it is computed from the elapsed wall time whenever the bucket is touched.
//! Each admitted request consumes one token; when none is left `try_acquire`
//! returns `false` and the caller decides whether to queue, drop or back off.

use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Rate limiter configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimiterConfig {
    /// Bucket capacity; also the number of tokens at construction.
    pub max_tokens: u32,
    /// Refill rate in tokens per second.
    pub tokens_per_second: f64,
}

impl Default for RateLimiterConfig {
    fn default() -> Self {
        Self {
            max_tokens: 25,
            tokens_per_second: 25.0,
        }
    }
}

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// Thread-safe, non-blocking token bucket.
pub struct RateLimiter {
    config: RateLimiterConfig,
    state: Mutex<BucketState>,
}

impl RateLimiter {
    /// Create a limiter with a full bucket.
    pub fn new(config: RateLimiterConfig) -> Self {
        Self {
            state: Mutex::new(BucketState {
                tokens: f64::from(config.max_tokens),
                last_refill: Instant::now(),
            }),
            config,
        }
    }

    pub fn config(&self) -> &RateLimiterConfig {
        &self.config
    }

    /// Try to take one token.
    ///
    /// Returns `true` if a token was available after refill and consumed.
    /// On `false` only the refill bookkeeping has changed.
    pub fn try_acquire(&self) -> bool {
        let mut state = self.lock();
        self.refill(&mut state);

        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            true
        } else {
            false
        }
    }

    /// Returns currently available tokens.
    pub fn available(&self) -> f64 {
        let mut state = self.lock();
        self.refill(&mut state);
        state.tokens
    }

    /// Estimated wait before one token is available.
    ///
    /// `None` when the bucket is empty and never refills, or refills so
    /// slowly that the wait does not fit in a `Duration`.
    pub fn wait_time(&self) -> Option<Duration> {
        let mut state = self.lock();
        self.refill(&mut state);
        let deficit = 1.0 - state.tokens;
        if deficit <= 0.0 {
            Some(Duration::ZERO)
        } else if self.config.tokens_per_second > 0.0 {
            Duration::try_from_secs_f64(deficit / self.config.tokens_per_second).ok()
        } else {
            None
        }
    }

    fn lock(&self) -> MutexGuard<'_, BucketState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn refill(&self, state: &mut BucketState) {
        let now = Instant::now();
        let elapsed = now.duration_since(state.last_refill).as_secs_f64();
        let new_tokens = elapsed * self.config.tokens_per_second.max(0.0);
        state.tokens = (state.tokens + new_tokens).min(f64::from(self.config.max_tokens));
        state.last_refill = now;
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .field("available", &self.available())
            .finish()
    }
}
