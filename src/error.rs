//! Error types for the weir crate.

use thiserror::Error;

use crate::store::StoreError;

/// Main error type for weir operations.
///
/// Only configuration-load paths return this. Store faults at check time
/// degrade to the in-memory fallback instead of propagating; see the
/// `ratelimit` module.
#[derive(Error, Debug)]
pub enum WeirError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Shared store errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for weir operations.
pub type Result<T> = std::result::Result<T, WeirError>;
