//! Redis implementation of the shared store.
//!
//! Each rate limit key is a Redis sorted set. The batched operations run
//! as MULTI/EXEC transactions so concurrent checks on the same key cannot
//! interleave between the purge and the count.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError};
use tracing::{debug, info};

use super::{SharedStore, StoreError, StoreResult};

/// Upper bound on any single Redis round trip.
const DEFAULT_OP_TIMEOUT: Duration = Duration::from_secs(2);
/// How long the handle reports not-ready after a failed round trip.
const DEFAULT_FAILURE_COOLDOWN: Duration = Duration::from_secs(5);

/// Shared store backed by Redis.
///
/// The connection manager re-establishes dropped connections on its own.
/// After a failed or timed-out operation the handle reports not-ready for
/// a short cooldown, so checks skip straight to the in-memory fallback
/// instead of queuing behind a dead connection; the next operation after
/// the cooldown probes the connection again.
pub struct RedisStore {
    connection: ConnectionManager,
    op_timeout: Duration,
    failure_cooldown: Duration,
    /// Set on failure; the handle is not ready until this instant passes.
    cooldown_until: Mutex<Option<Instant>>,
}

impl RedisStore {
    /// Connect to Redis and return a ready store handle.
    pub async fn connect(url: &str) -> StoreResult<Self> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::Operation(e.to_string()))?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        info!("Connected to Redis rate limit store");

        Ok(Self {
            connection,
            op_timeout: DEFAULT_OP_TIMEOUT,
            failure_cooldown: DEFAULT_FAILURE_COOLDOWN,
            cooldown_until: Mutex::new(None),
        })
    }

    /// Override the per-operation timeout.
    pub fn with_op_timeout(mut self, timeout: Duration) -> Self {
        self.op_timeout = timeout;
        self
    }

    /// Override how long the handle stays not-ready after a failure.
    pub fn with_failure_cooldown(mut self, cooldown: Duration) -> Self {
        self.failure_cooldown = cooldown;
        self
    }

    fn note_failure(&self) {
        debug!(
            cooldown_secs = self.failure_cooldown.as_secs(),
            "Redis operation failed, backing off from the primary path"
        );
        *self.cooldown_until.lock() = Some(Instant::now() + self.failure_cooldown);
    }

    fn note_success(&self) {
        let mut cooldown = self.cooldown_until.lock();
        if cooldown.is_some() {
            *cooldown = None;
        }
    }

    /// Run one Redis operation under the bounded timeout, folding both the
    /// timeout and the protocol error path into `StoreError` and keeping
    /// the readiness cooldown current.
    async fn run<T, F>(&self, op: F) -> StoreResult<T>
    where
        F: Future<Output = Result<T, RedisError>>,
    {
        match tokio::time::timeout(self.op_timeout, op).await {
            Ok(Ok(value)) => {
                self.note_success();
                Ok(value)
            }
            Ok(Err(e)) => {
                self.note_failure();
                Err(StoreError::Operation(e.to_string()))
            }
            Err(_) => {
                self.note_failure();
                Err(StoreError::Timeout(self.op_timeout))
            }
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    fn is_ready(&self) -> bool {
        match *self.cooldown_until.lock() {
            Some(until) => Instant::now() >= until,
            None => true,
        }
    }

    async fn record_attempt(
        &self,
        key: &str,
        boundary: i64,
        member: &str,
        score: i64,
        ttl: Duration,
    ) -> StoreResult<u64> {
        let mut conn = self.connection.clone();
        let ttl_secs = ttl.as_secs() as i64;

        self.run(async move {
            let (pre_count,): (u64,) = redis::pipe()
                .atomic()
                .zrembyscore(key, "-inf", boundary)
                .ignore()
                .zcard(key)
                .zadd(key, member, score)
                .ignore()
                .expire(key, ttl_secs)
                .ignore()
                .query_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(pre_count)
        })
        .await
    }

    async fn remove_member(&self, key: &str, member: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();

        self.run(async move {
            let _: u64 = conn.zrem(key, member).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn oldest_score(&self, key: &str) -> StoreResult<Option<i64>> {
        let mut conn = self.connection.clone();

        self.run(async move {
            let entries: Vec<(String, i64)> = conn.zrange_withscores(key, 0, 0).await?;
            Ok::<_, RedisError>(entries.first().map(|(_, score)| *score))
        })
        .await
    }

    async fn prune_and_count(&self, key: &str, boundary: i64) -> StoreResult<u64> {
        let mut conn = self.connection.clone();

        self.run(async move {
            let (count,): (u64,) = redis::pipe()
                .atomic()
                .zrembyscore(key, "-inf", boundary)
                .ignore()
                .zcard(key)
                .query_async(&mut conn)
                .await?;
            Ok::<_, RedisError>(count)
        })
        .await
    }

    async fn remove_key(&self, key: &str) -> StoreResult<()> {
        let mut conn = self.connection.clone();

        self.run(async move {
            let _: u64 = conn.del(key).await?;
            Ok::<_, RedisError>(())
        })
        .await
    }

    async fn remove_matching(&self, pattern: &str) -> StoreResult<u64> {
        let mut conn = self.connection.clone();

        self.run(async move {
            let keys: Vec<String> = conn.keys(pattern).await?;
            if keys.is_empty() {
                return Ok::<_, RedisError>(0);
            }
            let removed: u64 = conn.del(keys).await?;
            Ok(removed)
        })
        .await
    }
}
