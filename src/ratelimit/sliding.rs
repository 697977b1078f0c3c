//! Sliding-window limiter backed by the shared store.
//!
//! This is the primary, distributed-consistency path. Each check runs one
//! atomic batch against the store: purge members that have aged out of the
//! trailing window, count what is left, record the current attempt, and
//! refresh the key's expiry. Any store failure degrades to the
//! process-local fixed-window limiter for that single call.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use tracing::{debug, trace, warn};

use crate::clock::Clock;
use crate::store::{SharedStore, StoreResult};

use super::fallback::FallbackLimiter;
use super::result::RateLimitResult;
use super::rules::RateLimitConfig;

/// Keys linger for this many windows after their last attempt before the
/// store expires them, so idle keys clean themselves up.
const KEY_TTL_WINDOWS: u64 = 2;

/// Rate limiter enforcing an accurate trailing-window count per key.
pub struct SlidingWindowLimiter {
    store: Arc<dyn SharedStore>,
    fallback: FallbackLimiter,
    clock: Arc<dyn Clock>,
}

impl SlidingWindowLimiter {
    pub fn new(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            fallback: FallbackLimiter::new(clock.clone()),
            clock,
        }
    }

    /// Check one attempt against `key`.
    ///
    /// Store faults never surface to the caller: a not-ready handle skips
    /// the round trip entirely, and an operation failure falls back after
    /// the fact. Either way the in-memory limiter supplies the verdict.
    pub async fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        trace!(
            key = %key,
            limit = config.limit,
            window_secs = config.window_secs,
            "Checking rate limit"
        );

        if !self.store.is_ready() {
            debug!(key = %key, "Shared store not ready, using in-memory fallback");
            return self.fallback.check(key, config);
        }

        match self.check_store(key, config).await {
            Ok(result) => result,
            Err(e) => {
                warn!(
                    key = %key,
                    error = %e,
                    "Shared store check failed, using in-memory fallback"
                );
                self.fallback.check(key, config)
            }
        }
    }

    async fn check_store(
        &self,
        key: &str,
        config: &RateLimitConfig,
    ) -> StoreResult<RateLimitResult> {
        let now_ms = self.clock.now_millis();
        let window_ms = config.window_millis();
        let boundary = now_ms - window_ms;
        let reset = (now_ms / 1000) as u64 + config.window_secs;
        let ttl = Duration::from_secs(config.window_secs * KEY_TTL_WINDOWS);

        // One member per attempt; the random suffix keeps two attempts
        // landing on the same millisecond distinct.
        let member = format!("{}:{:08x}", now_ms, rand::thread_rng().gen::<u32>());

        let pre_count = self
            .store
            .record_attempt(key, boundary, &member, now_ms, ttl)
            .await?;

        if pre_count >= u64::from(config.limit) {
            // Over budget. Take the attempt back out so a denied request
            // never permanently consumes a slot.
            self.store.remove_member(key, &member).await?;

            let retry_after = match self.store.oldest_score(key).await? {
                Some(oldest) => {
                    let until_free_ms = oldest + window_ms - now_ms;
                    ((until_free_ms + 999) / 1000).max(1) as u64
                }
                None => 1,
            };

            debug!(
                key = %key,
                limit = config.limit,
                retry_after = retry_after,
                "Rate limit exceeded"
            );

            return Ok(RateLimitResult::denied(config.limit, reset, retry_after));
        }

        let remaining = config.limit - pre_count as u32 - 1;
        Ok(RateLimitResult::allowed(config.limit, remaining, reset))
    }
}
