//! Rate limiting logic: keys, configuration, limiters and orchestration.

mod fallback;
mod key;
mod limiter;
mod result;
mod rules;
mod sliding;

pub use fallback::FallbackLimiter;
pub use key::{IdentifierKind, RateLimitKey, RequestIdentifiers, NAMESPACE_PATTERN};
pub use limiter::RateLimiter;
pub use result::RateLimitResult;
pub use rules::{RateLimitCatalog, RateLimitConfig};
pub use sliding::SlidingWindowLimiter;
