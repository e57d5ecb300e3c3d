//! Admission policy applied before a request consumes any downstream resource.
//!
//! ```text
//! Request → [RateLimiter] → [ConnectionPool] → [Transport]
//! ```

pub mod rate_limiter;

pub use rate_limiter::{RateLimiter, RateLimiterConfig};
