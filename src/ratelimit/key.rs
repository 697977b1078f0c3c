//! Rate limit key generation and per-request identifiers.

use std::fmt;

/// Namespace prefix shared by every rate limit key in the store.
pub const KEY_NAMESPACE: &str = "rate_limit";
/// Pattern matching every key in the rate limit namespace.
pub const NAMESPACE_PATTERN: &str = "rate_limit:*";

/// The identifier dimension a key counts against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IdentifierKind {
    /// Authenticated user ID.
    User,
    /// Client network address.
    Ip,
}

impl IdentifierKind {
    /// Stable string form used inside storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            IdentifierKind::User => "user",
            IdentifierKind::Ip => "ip",
        }
    }
}

impl fmt::Display for IdentifierKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A key that uniquely identifies one (category, identifier) pair.
///
/// The same logical identity must render to the same storage key on every
/// process instance, so all instances address the same shared-store entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RateLimitKey {
    /// The endpoint category being limited.
    pub category: String,
    /// Which identifier dimension the key counts.
    pub kind: IdentifierKind,
    /// The identifier value itself.
    pub value: String,
}

impl RateLimitKey {
    /// Create a new rate limit key.
    pub fn new(category: &str, kind: IdentifierKind, value: &str) -> Self {
        Self {
            category: category.to_string(),
            kind,
            value: value.to_string(),
        }
    }

    /// Render the storage key: `rate_limit:<category>:<kind>:<value>`.
    ///
    /// The kind segment keeps a user ID and an IP string from colliding
    /// even when their raw values happen to be equal.
    pub fn storage_key(&self) -> String {
        format!(
            "{}:{}:{}:{}",
            KEY_NAMESPACE,
            self.category,
            self.kind.as_str(),
            self.value
        )
    }
}

impl fmt::Display for RateLimitKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.storage_key())
    }
}

/// Per-request identifiers supplied by the calling middleware.
///
/// Either field may be absent: anonymous requests carry no user ID, and
/// some transports expose no usable client address.
#[derive(Debug, Clone, Default)]
pub struct RequestIdentifiers {
    /// Authenticated user ID, if any.
    pub user_id: Option<String>,
    /// Client network address, if known.
    pub ip: Option<String>,
}

impl RequestIdentifiers {
    /// Identifiers carrying only a user ID.
    pub fn user(user_id: impl Into<String>) -> Self {
        Self {
            user_id: Some(user_id.into()),
            ip: None,
        }
    }

    /// Identifiers carrying only a client address.
    pub fn ip(ip: impl Into<String>) -> Self {
        Self {
            user_id: None,
            ip: Some(ip.into()),
        }
    }
}
