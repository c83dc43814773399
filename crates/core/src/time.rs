//! Injected wall-clock time.
//!
//! Every scheduling decision takes its notion of "now" from a [`Clock`]
//! handle instead of reading the system clock directly, so tests can pin
//! or step time deterministically.

use std::sync::atomic::{AtomicI64, Ordering};

/// Unix timestamp, seconds since epoch.
pub type Timestamp = i64;

/// Source of the current wall-clock time.
pub trait Clock: Send + Sync {
    /// Current time as seconds since the Unix epoch.
    fn now(&self) -> Timestamp;
}

/// Real wall-clock time via `chrono`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Timestamp {
        chrono::Utc::now().timestamp()
    }
}

/// A clock whose time is set by hand. Used in tests and tooling.
#[derive(Debug)]
pub struct ManualClock {
    now: AtomicI64,
}

impl ManualClock {
    pub fn new(now: Timestamp) -> Self {
        Self { now: AtomicI64::new(now) }
    }

    /// Move the clock to an absolute time.
    pub fn set(&self, now: Timestamp) {
        self.now.store(now, Ordering::Relaxed);
    }

    /// Advance the clock by `secs`.
    pub fn advance(&self, secs: i64) {
        self.now.fetch_add(secs, Ordering::Relaxed);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Timestamp {
        self.now.load(Ordering::Relaxed)
    }
}
