//! In-memory fallback limiter.
//!
//! Used when the shared store is unreachable. Counts in fixed, aligned
//! windows rather than sliding ones, and keeps state per process: during
//! an outage each instance enforces its own budget, and a client spreading
//! requests across a window boundary can be admitted up to twice the
//! configured limit. That gap is accepted; the fallback exists to bound
//! abuse cheaply until the store returns, not to preserve exact sliding
//! semantics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use tracing::debug;

use crate::clock::Clock;

use super::result::RateLimitResult;
use super::rules::RateLimitConfig;

/// Cleanup sweeps run at most this often.
const SWEEP_INTERVAL_SECS: u64 = 60;
/// Entries whose window started longer ago than this are reaped.
const STALE_AFTER_SECS: u64 = 3600;

/// Counter state for one rate limit key.
#[derive(Debug, Clone)]
struct WindowEntry {
    count: u32,
    /// Unix seconds, aligned down to a multiple of the window length.
    window_start: u64,
}

/// Process-local, fixed-window rate limiter.
pub struct FallbackLimiter {
    entries: DashMap<String, WindowEntry>,
    clock: Arc<dyn Clock>,
    /// Unix seconds of the last cleanup sweep.
    last_sweep: AtomicU64,
}

impl FallbackLimiter {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            last_sweep: AtomicU64::new(0),
        }
    }

    /// Count one attempt against `key` and decide whether it fits the
    /// current fixed window's budget.
    pub fn check(&self, key: &str, config: &RateLimitConfig) -> RateLimitResult {
        self.maybe_sweep();

        let now = self.clock.now_secs();
        let window_start = now - (now % config.window_secs);
        let reset = window_start + config.window_secs;

        let mut entry = self
            .entries
            .entry(key.to_string())
            .or_insert(WindowEntry {
                count: 0,
                window_start,
            });

        if entry.window_start != window_start {
            // The aligned window has advanced; the old count no longer applies.
            *entry = WindowEntry {
                count: 1,
                window_start,
            };
            return RateLimitResult::allowed(config.limit, config.limit - 1, reset);
        }

        entry.count += 1;
        if entry.count <= config.limit {
            RateLimitResult::allowed(config.limit, config.limit - entry.count, reset)
        } else {
            let retry_after = reset.saturating_sub(now).max(1);
            RateLimitResult::denied(config.limit, reset, retry_after)
        }
    }

    /// Number of tracked keys. Primarily useful for tests.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether any keys are currently tracked.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Remove entries whose window started more than an hour ago.
    ///
    /// Gated to run at most once per `SWEEP_INTERVAL_SECS` and triggered
    /// inline from `check`, so memory stays bounded without a background
    /// task.
    fn maybe_sweep(&self) {
        let now = self.clock.now_secs();
        let last = self.last_sweep.load(Ordering::Relaxed);
        if now < last + SWEEP_INTERVAL_SECS {
            return;
        }
        if self
            .last_sweep
            .compare_exchange(last, now, Ordering::SeqCst, Ordering::Relaxed)
            .is_err()
        {
            // Another check claimed this sweep.
            return;
        }

        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now <= entry.window_start + STALE_AFTER_SECS);
        let removed = before.saturating_sub(self.entries.len());
        if removed > 0 {
            debug!(removed = removed, "Swept stale fallback rate limit entries");
        }
    }
}
