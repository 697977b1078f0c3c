//! Time sources for window calculations.
//!
//! All window math is epoch arithmetic, so the limiters take their notion
//! of "now" from a `Clock` rather than calling the system time directly.
//! Tests substitute a manually advanced clock instead of sleeping.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Milliseconds since the UNIX epoch.
    fn now_millis(&self) -> i64;

    /// Seconds since the UNIX epoch.
    fn now_secs(&self) -> u64 {
        (self.now_millis() / 1000) as u64
    }
}

/// Clock backed by the actual system time.
#[derive(Clone, Default)]
pub struct SystemClock;

impl SystemClock {
    pub fn new() -> Self {
        Self
    }
}

impl Clock for SystemClock {
    fn now_millis(&self) -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is before UNIX epoch")
            .as_millis() as i64
    }
}

/// Manually controlled clock for tests.
#[derive(Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at the given epoch milliseconds.
    pub fn new(start_millis: i64) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(start_millis)),
        }
    }

    /// Move the clock forward by the given number of milliseconds.
    pub fn advance(&self, millis: i64) {
        self.millis.fetch_add(millis, Ordering::SeqCst);
    }

    /// Move the clock forward by the given number of seconds.
    pub fn advance_secs(&self, secs: i64) {
        self.advance(secs * 1000);
    }

    /// Set the clock to an absolute epoch millisecond value.
    pub fn set_millis(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}
