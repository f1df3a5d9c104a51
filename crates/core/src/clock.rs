//! Injectable wall-clock time source.
//!
//! Rate-limit window math and token expiry are functions of "now"; injecting
//! the clock lets tests drive those code paths without real sleeps.

use crate::types::Timestamp;

/// Wall-clock time source.
pub trait Clock: Send + Sync {
    /// Current UTC time.
    fn now(&self) -> Timestamp;
}

/// Production clock backed by the system time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now()
    }
}
