// SPDX-License-Identifier: MIT

//! Clock abstraction.
//!
//! The staleness engine compares file mtimes and the `$(shell)` function
//! enforces a 5-second watchdog timeout (spec §5); both need a notion of
//! "now" that tests can control precisely. Production code uses
//! [`SystemClock`]; tests use [`FakeClock`], which only advances when told
//! to, so a retry-backoff or timeout test never depends on wall-clock
//! timing.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Abstracts over "what time is it" so timing-sensitive logic is testable.
pub trait Clock: Send + Sync {
    /// Current wall-clock time.
    fn now(&self) -> SystemTime;

    /// Convenience: milliseconds since the Unix epoch.
    fn now_ms(&self) -> u64 {
        self.now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO)
            .as_millis() as u64
    }
}

/// The real clock, backed by [`SystemTime::now`].
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> SystemTime {
        SystemTime::now()
    }
}

/// A controllable clock for deterministic tests.
///
/// Starts at the Unix epoch plus one day (so subtraction against `0` never
/// underflows) and only advances via [`FakeClock::advance`].
#[derive(Debug)]
pub struct FakeClock {
    millis: AtomicU64,
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeClock {
    pub fn new() -> Self {
        Self {
            millis: AtomicU64::new(Duration::from_secs(86_400).as_millis() as u64),
        }
    }

    pub fn advance(&self, by: Duration) {
        self.millis.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn set_ms(&self, ms: u64) {
        self.millis.store(ms, Ordering::SeqCst);
    }
}

impl Clock for FakeClock {
    fn now(&self) -> SystemTime {
        UNIX_EPOCH + Duration::from_millis(self.millis.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
