//! Shared store abstraction for distributed rate limit state.
//!
//! The limiters talk to the store through the `SharedStore` trait, so the
//! same core runs against Redis in production and against an in-memory
//! implementation in tests and single-process deployments. Both uphold the
//! same atomicity contract for the batched operations.

mod memory;
mod redis;

pub use memory::MemoryStore;
pub use redis::RedisStore;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur in shared store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not ready")]
    Unavailable,
    #[error("store operation failed: {0}")]
    Operation(String),
    #[error("store operation timed out after {0:?}")]
    Timeout(Duration),
}

/// Result type alias for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Interface to the shared ordered-set store backing the sliding window.
///
/// Each rate limit key maps to one ordered collection holding a member per
/// attempted request, scored by its timestamp in epoch milliseconds.
///
/// Implementations must execute `record_attempt` and `prune_and_count` as
/// single atomic units: concurrent checks on the same key must never
/// interleave between the purge and the count, or two callers can both
/// observe a count under the limit and overshoot it.
#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Whether the store can currently serve requests.
    ///
    /// Callers consult this before attempting the primary path instead of
    /// relying on operation errors alone as the failure signal.
    fn is_ready(&self) -> bool;

    /// Atomically purge members scored at or below `boundary`, read the
    /// remaining cardinality, insert `(member, score)`, and refresh the
    /// key's expiry to `ttl`.
    ///
    /// Returns the cardinality as it was before the insert.
    async fn record_attempt(
        &self,
        key: &str,
        boundary: i64,
        member: &str,
        score: i64,
        ttl: Duration,
    ) -> StoreResult<u64>;

    /// Remove a single member from a key's collection.
    async fn remove_member(&self, key: &str, member: &str) -> StoreResult<()>;

    /// Score of the oldest member under `key`, if any.
    async fn oldest_score(&self, key: &str) -> StoreResult<Option<i64>>;

    /// Atomically purge members scored at or below `boundary` and read the
    /// remaining cardinality, without inserting anything.
    async fn prune_and_count(&self, key: &str, boundary: i64) -> StoreResult<u64>;

    /// Delete a key outright.
    async fn remove_key(&self, key: &str) -> StoreResult<()>;

    /// Delete every key matching `pattern`. Returns the number removed.
    async fn remove_matching(&self, pattern: &str) -> StoreResult<u64>;
}
