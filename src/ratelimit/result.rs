//! Rate limit check results.

use serde::Serialize;

/// Outcome of a rate limit check.
///
/// Consumed by HTTP middleware to allow or deny the request and to
/// populate the standard throttling response headers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitResult {
    /// Whether the request may proceed.
    pub allowed: bool,
    /// The configured limit for the window.
    pub limit: u32,
    /// Requests left in the window after this check.
    pub remaining: u32,
    /// Advisory unix time (seconds) at which the budget is fully restored.
    pub reset: u64,
    /// Seconds the caller should wait before retrying; zero when allowed.
    pub retry_after: u64,
}

impl RateLimitResult {
    /// An allowed result. `remaining` is clamped to the limit.
    pub fn allowed(limit: u32, remaining: u32, reset: u64) -> Self {
        Self {
            allowed: true,
            limit,
            remaining: remaining.min(limit),
            reset,
            retry_after: 0,
        }
    }

    /// A denied result. `remaining` is always zero.
    pub fn denied(limit: u32, reset: u64, retry_after: u64) -> Self {
        Self {
            allowed: false,
            limit,
            remaining: 0,
            reset,
            retry_after,
        }
    }

    /// The full-budget result used when no identifier dimension applies or
    /// no verdict could be computed.
    pub fn fail_open(limit: u32, reset: u64) -> Self {
        Self::allowed(limit, limit, reset)
    }
}
