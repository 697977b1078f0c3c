//! Rate limiter facade: dimension orchestration and admin operations.
//!
//! `RateLimiter` is the type a backend embeds. A check evaluates every
//! active identifier dimension (user, then IP) through the sliding-window
//! limiter and merges the verdicts into one result; the status, reset and
//! clear operations manage quota state directly in the shared store.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::clock::{Clock, SystemClock};
use crate::store::SharedStore;

use super::key::{IdentifierKind, RateLimitKey, RequestIdentifiers, NAMESPACE_PATTERN};
use super::result::RateLimitResult;
use super::rules::RateLimitConfig;
use super::sliding::SlidingWindowLimiter;

/// The rate limiting entry point shared across a backend's request path.
///
/// Thread-safe; wrap it in an `Arc` and clone the handle into every task
/// that needs it.
pub struct RateLimiter {
    limiter: SlidingWindowLimiter,
    store: Arc<dyn SharedStore>,
    clock: Arc<dyn Clock>,
}

impl RateLimiter {
    /// Create a limiter over the given store, using the system clock.
    pub fn new(store: Arc<dyn SharedStore>) -> Self {
        Self::with_clock(store, Arc::new(SystemClock::new()))
    }

    /// Create a limiter with an explicit clock. Tests use this to drive
    /// window expiry without sleeping.
    pub fn with_clock(store: Arc<dyn SharedStore>, clock: Arc<dyn Clock>) -> Self {
        Self {
            limiter: SlidingWindowLimiter::new(store.clone(), clock.clone()),
            store,
            clock,
        }
    }

    /// Check one request against every active identifier dimension.
    ///
    /// A dimension is active when its config flag is set and the matching
    /// identifier was supplied. With no active dimension the request is
    /// allowed with a full budget: absence of identifiable dimensions
    /// never blocks a request. Otherwise every active dimension is
    /// evaluated (user before IP); a denial from any of them is the
    /// overall verdict, and when all allow, the caller sees the tightest
    /// of the applicable budgets.
    pub async fn check(
        &self,
        category: &str,
        config: &RateLimitConfig,
        identifiers: &RequestIdentifiers,
    ) -> RateLimitResult {
        let mut dimensions = Vec::with_capacity(2);
        if config.track_by_user {
            if let Some(user_id) = &identifiers.user_id {
                dimensions.push(RateLimitKey::new(category, IdentifierKind::User, user_id));
            }
        }
        if config.track_by_ip {
            if let Some(ip) = &identifiers.ip {
                dimensions.push(RateLimitKey::new(category, IdentifierKind::Ip, ip));
            }
        }

        if dimensions.is_empty() {
            debug!(
                category = %category,
                "No active identifier dimensions, allowing request"
            );
            return RateLimitResult::fail_open(config.limit, self.advisory_reset(config));
        }

        let mut verdict: Option<RateLimitResult> = None;
        for key in &dimensions {
            let result = self.limiter.check(&key.storage_key(), config).await;

            if !result.allowed {
                debug!(
                    key = %key,
                    retry_after = result.retry_after,
                    "Request denied by rate limit"
                );
                return result;
            }

            verdict = match verdict {
                Some(best) if best.remaining <= result.remaining => Some(best),
                _ => Some(result),
            };
        }

        // At least one dimension was evaluated, so a verdict exists.
        verdict.unwrap_or_else(|| {
            RateLimitResult::fail_open(config.limit, self.advisory_reset(config))
        })
    }

    /// Inspect a key's current quota without consuming any of it.
    ///
    /// When the store is unreachable this reports an optimistic full
    /// budget rather than guessing from fallback state; the fallback
    /// counter has no peek-without-increment operation.
    pub async fn status(
        &self,
        category: &str,
        config: &RateLimitConfig,
        kind: IdentifierKind,
        value: &str,
    ) -> RateLimitResult {
        let key = RateLimitKey::new(category, kind, value);
        let reset = self.advisory_reset(config);

        if !self.store.is_ready() {
            return RateLimitResult::fail_open(config.limit, reset);
        }

        let boundary = self.clock.now_millis() - config.window_millis();
        match self.store.prune_and_count(&key.storage_key(), boundary).await {
            Ok(count) if count < u64::from(config.limit) => {
                RateLimitResult::allowed(config.limit, config.limit - count as u32, reset)
            }
            Ok(_) => RateLimitResult::denied(config.limit, reset, 0),
            Err(e) => {
                warn!(key = %key, error = %e, "Status lookup failed, reporting full budget");
                RateLimitResult::fail_open(config.limit, reset)
            }
        }
    }

    /// Delete one key's counter outright, restoring its full budget.
    ///
    /// Returns `false` when the store is unreachable; there is no
    /// in-memory reset path.
    pub async fn reset(&self, category: &str, kind: IdentifierKind, value: &str) -> bool {
        let key = RateLimitKey::new(category, kind, value);

        if !self.store.is_ready() {
            warn!(key = %key, "Cannot reset rate limit, store not ready");
            return false;
        }

        match self.store.remove_key(&key.storage_key()).await {
            Ok(()) => {
                info!(key = %key, "Rate limit reset");
                true
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to reset rate limit");
                false
            }
        }
    }

    /// Delete every key in the rate limit namespace.
    ///
    /// Administrative and test use only; must never be reachable by
    /// unprivileged callers.
    pub async fn clear_all(&self) -> bool {
        if !self.store.is_ready() {
            warn!("Cannot clear rate limits, store not ready");
            return false;
        }

        match self.store.remove_matching(NAMESPACE_PATTERN).await {
            Ok(removed) => {
                info!(removed = removed, "Cleared all rate limits");
                true
            }
            Err(e) => {
                warn!(error = %e, "Failed to clear rate limits");
                false
            }
        }
    }

    fn advisory_reset(&self, config: &RateLimitConfig) -> u64 {
        self.clock.now_secs() + config.window_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::store::{MemoryStore, StoreError, StoreResult};
    use async_trait::async_trait;
    use std::time::Duration;

    const START_MS: i64 = 1_700_000_040_000;

    fn limiter() -> (RateLimiter, Arc<ManualClock>, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        let clock = Arc::new(ManualClock::new(START_MS));
        let limiter = RateLimiter::with_clock(store.clone(), clock.clone());
        (limiter, clock, store)
    }

    fn both(user_id: &str, ip: &str) -> RequestIdentifiers {
        RequestIdentifiers {
            user_id: Some(user_id.to_string()),
            ip: Some(ip.to_string()),
        }
    }

    /// Store double that is permanently not ready.
    struct DownStore;

    #[async_trait]
    impl SharedStore for DownStore {
        fn is_ready(&self) -> bool {
            false
        }

        async fn record_attempt(
            &self,
            _key: &str,
            _boundary: i64,
            _member: &str,
            _score: i64,
            _ttl: Duration,
        ) -> StoreResult<u64> {
            Err(StoreError::Unavailable)
        }

        async fn remove_member(&self, _key: &str, _member: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable)
        }

        async fn oldest_score(&self, _key: &str) -> StoreResult<Option<i64>> {
            Err(StoreError::Unavailable)
        }

        async fn prune_and_count(&self, _key: &str, _boundary: i64) -> StoreResult<u64> {
            Err(StoreError::Unavailable)
        }

        async fn remove_key(&self, _key: &str) -> StoreResult<()> {
            Err(StoreError::Unavailable)
        }

        async fn remove_matching(&self, _pattern: &str) -> StoreResult<u64> {
            Err(StoreError::Unavailable)
        }
    }

    #[tokio::test]
    async fn test_no_identifiers_fails_open() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(5, 60);

        let result = limiter
            .check("api", &config, &RequestIdentifiers::default())
            .await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 5);
        assert_eq!(result.reset, (START_MS / 1000) as u64 + 60);
    }

    #[tokio::test]
    async fn test_disabled_dimensions_fail_open() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(5, 60)
            .with_user_tracking(false)
            .with_ip_tracking(false);

        let result = limiter.check("api", &config, &both("u-1", "10.0.0.1")).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 5);
    }

    #[tokio::test]
    async fn test_denial_dominates_allow() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(2, 60);

        // Exhaust the user budget from a different address so the IP
        // dimension stays under its limit.
        for _ in 0..2 {
            assert!(limiter
                .check("api", &config, &both("u-1", "10.0.0.9"))
                .await
                .allowed);
        }

        let result = limiter.check("api", &config, &both("u-1", "10.0.0.1")).await;
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert!(result.retry_after >= 1);
    }

    #[tokio::test]
    async fn test_allow_reports_smallest_remaining() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(5, 60);

        // Two earlier requests from the same address under other users
        // put the IP dimension ahead of u-3's user dimension.
        limiter.check("api", &config, &both("u-1", "10.0.0.1")).await;
        limiter.check("api", &config, &both("u-2", "10.0.0.1")).await;

        let result = limiter.check("api", &config, &both("u-3", "10.0.0.1")).await;
        assert!(result.allowed);
        // User dimension has 4 remaining, IP dimension only 2.
        assert_eq!(result.remaining, 2);
    }

    #[tokio::test]
    async fn test_dimensions_count_independently() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(2, 60);

        // Two different users behind one address exhaust the IP budget
        // without either user budget filling up.
        assert!(limiter
            .check("api", &config, &both("u-1", "10.0.0.1"))
            .await
            .allowed);
        assert!(limiter
            .check("api", &config, &both("u-2", "10.0.0.1"))
            .await
            .allowed);

        let result = limiter.check("api", &config, &both("u-3", "10.0.0.1")).await;
        assert!(!result.allowed);

        // The same user from a fresh address is unaffected.
        assert!(limiter
            .check("api", &config, &both("u-3", "10.0.0.2"))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_user_only_config_ignores_ip() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(1, 60).with_ip_tracking(false);

        assert!(limiter
            .check("api", &config, &both("u-1", "10.0.0.1"))
            .await
            .allowed);

        // Same address, different user: the IP dimension is off, so this
        // is a fresh budget.
        assert!(limiter
            .check("api", &config, &both("u-2", "10.0.0.1"))
            .await
            .allowed);
        assert!(!limiter
            .check("api", &config, &both("u-1", "10.0.0.2"))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_ai_generate_scenario() {
        let (limiter, clock, _store) = limiter();
        let config = RateLimitConfig::new(5, 60).with_user_tracking(false);
        let identifiers = RequestIdentifiers::ip("10.0.0.1");

        for expected_remaining in [4, 3, 2, 1, 0] {
            clock.advance(100);
            let result = limiter.check("ai-generate", &config, &identifiers).await;
            assert!(result.allowed);
            assert_eq!(result.remaining, expected_remaining);
        }

        clock.advance(100);
        let result = limiter.check("ai-generate", &config, &identifiers).await;
        assert!(!result.allowed);
        assert_eq!(result.remaining, 0);
        assert!(result.retry_after >= 1 && result.retry_after <= 60);
    }

    #[tokio::test]
    async fn test_categories_have_separate_budgets() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(1, 60);
        let identifiers = RequestIdentifiers::user("u-1");

        assert!(limiter.check("upload", &config, &identifiers).await.allowed);
        assert!(!limiter.check("upload", &config, &identifiers).await.allowed);
        assert!(limiter.check("export", &config, &identifiers).await.allowed);
    }

    #[tokio::test]
    async fn test_status_does_not_consume_quota() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(2, 60);
        let identifiers = RequestIdentifiers::user("u-1");

        assert!(limiter.check("api", &config, &identifiers).await.allowed);

        for _ in 0..5 {
            let status = limiter
                .status("api", &config, IdentifierKind::User, "u-1")
                .await;
            assert!(status.allowed);
            assert_eq!(status.remaining, 1);
            assert_eq!(status.retry_after, 0);
        }

        // The repeated peeks left the budget untouched.
        let result = limiter.check("api", &config, &identifiers).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn test_status_reports_exhausted_budget() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(1, 60);
        let identifiers = RequestIdentifiers::user("u-1");

        assert!(limiter.check("api", &config, &identifiers).await.allowed);

        let status = limiter
            .status("api", &config, IdentifierKind::User, "u-1")
            .await;
        assert!(!status.allowed);
        assert_eq!(status.remaining, 0);
    }

    #[tokio::test]
    async fn test_status_sees_expired_members_gone() {
        let (limiter, clock, _store) = limiter();
        let config = RateLimitConfig::new(1, 10);
        let identifiers = RequestIdentifiers::user("u-1");

        assert!(limiter.check("api", &config, &identifiers).await.allowed);

        clock.advance_secs(11);
        let status = limiter
            .status("api", &config, IdentifierKind::User, "u-1")
            .await;
        assert!(status.allowed);
        assert_eq!(status.remaining, 1);
    }

    #[tokio::test]
    async fn test_status_optimistic_when_store_down() {
        let clock = Arc::new(ManualClock::new(START_MS));
        let limiter = RateLimiter::with_clock(Arc::new(DownStore), clock);
        let config = RateLimitConfig::new(5, 60);

        let status = limiter
            .status("api", &config, IdentifierKind::Ip, "10.0.0.1")
            .await;
        assert!(status.allowed);
        assert_eq!(status.remaining, 5);
    }

    #[tokio::test]
    async fn test_reset_restores_budget() {
        let (limiter, _clock, _store) = limiter();
        let config = RateLimitConfig::new(1, 60);
        let identifiers = RequestIdentifiers::ip("10.0.0.1");

        assert!(limiter.check("api", &config, &identifiers).await.allowed);
        assert!(!limiter.check("api", &config, &identifiers).await.allowed);

        assert!(limiter.reset("api", IdentifierKind::Ip, "10.0.0.1").await);

        let result = limiter.check("api", &config, &identifiers).await;
        assert!(result.allowed);
        assert_eq!(result.remaining, 0);
    }

    #[tokio::test]
    async fn test_reset_fails_when_store_down() {
        let clock = Arc::new(ManualClock::new(START_MS));
        let limiter = RateLimiter::with_clock(Arc::new(DownStore), clock);

        assert!(!limiter.reset("api", IdentifierKind::User, "u-1").await);
    }

    #[tokio::test]
    async fn test_clear_all_empties_namespace() {
        let (limiter, _clock, store) = limiter();
        let config = RateLimitConfig::new(1, 60);

        limiter.check("api", &config, &both("u-1", "10.0.0.1")).await;
        limiter.check("upload", &config, &both("u-2", "10.0.0.2")).await;
        assert_eq!(store.key_count(), 4);

        assert!(limiter.clear_all().await);
        assert_eq!(store.key_count(), 0);

        // Previously throttled identities get a fresh budget.
        assert!(limiter
            .check("api", &config, &both("u-1", "10.0.0.1"))
            .await
            .allowed);
    }

    #[tokio::test]
    async fn test_clear_all_fails_when_store_down() {
        let clock = Arc::new(ManualClock::new(START_MS));
        let limiter = RateLimiter::with_clock(Arc::new(DownStore), clock);

        assert!(!limiter.clear_all().await);
    }

    #[tokio::test]
    async fn test_check_survives_store_outage() {
        let clock = Arc::new(ManualClock::new(START_MS));
        let limiter = RateLimiter::with_clock(Arc::new(DownStore), clock);
        let config = RateLimitConfig::new(2, 60);
        let identifiers = RequestIdentifiers::user("u-1");

        // The fallback counter still enforces the budget per process.
        assert!(limiter.check("api", &config, &identifiers).await.allowed);
        assert!(limiter.check("api", &config, &identifiers).await.allowed);
        assert!(!limiter.check("api", &config, &identifiers).await.allowed);
    }
}
