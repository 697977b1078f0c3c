//! Weir - Redis-backed sliding-window rate limiting
//!
//! This crate implements the request-throttling substrate shared by a
//! multi-instance web backend: a sliding-window counter held in a Redis
//! sorted set, a process-local fixed-window fallback used while the store
//! is unreachable, and orchestration that evaluates per-user and per-IP
//! dimensions and combines their verdicts into one decision. The HTTP
//! middleware that extracts identifiers and renders denials lives in the
//! embedding backend, not here.
//!
//! ```no_run
//! use std::sync::Arc;
//! use weir::ratelimit::{RateLimitCatalog, RateLimiter, RequestIdentifiers};
//! use weir::store::RedisStore;
//!
//! # async fn example() -> weir::Result<()> {
//! let store = Arc::new(RedisStore::connect("redis://127.0.0.1/").await?);
//! let limiter = RateLimiter::new(store);
//! let catalog = RateLimitCatalog::builtin();
//!
//! let config = catalog.get("ai-generate").unwrap();
//! let identifiers = RequestIdentifiers::ip("10.0.0.1");
//! let result = limiter.check("ai-generate", config, &identifiers).await;
//! if !result.allowed {
//!     // Deny the request; retry_after goes into the response headers.
//! }
//! # Ok(())
//! # }
//! ```

pub mod clock;
pub mod error;
pub mod ratelimit;
pub mod store;

pub use error::{Result, WeirError};
pub use ratelimit::{
    RateLimitCatalog, RateLimitConfig, RateLimitResult, RateLimiter, RequestIdentifiers,
};
