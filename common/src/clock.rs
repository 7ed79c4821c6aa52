//! Injected time source (design note: "Global singletons → injected
//! services... time provider"). Production code uses [`SystemClock`];
//! tests inject [`TestClock`] to make the C9 mode-detection window and the
//! C8 bucket-rollover logic deterministic.

use crate::types::Ts;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A source of the current time, abstracted so tests never depend on wall-clock timing.
pub trait Clock: Send + Sync {
    /// Current time.
    fn now(&self) -> Ts;
}

/// Wall-clock time via `SystemTime`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Ts {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        Ts::from_nanos(nanos)
    }
}

/// A manually-advanced clock for deterministic tests.
#[derive(Debug, Default)]
pub struct TestClock {
    nanos: AtomicU64,
}

impl TestClock {
    /// Construct a test clock starting at the given nanosecond timestamp.
    #[must_use]
    pub fn new(start_nanos: u64) -> Self {
        Self {
            nanos: AtomicU64::new(start_nanos),
        }
    }

    /// Advance the clock by `delta_nanos`.
    pub fn advance(&self, delta_nanos: u64) {
        self.nanos.fetch_add(delta_nanos, Ordering::SeqCst);
    }

    /// Set the clock to an absolute nanosecond timestamp.
    pub fn set(&self, nanos: u64) {
        self.nanos.store(nanos, Ordering::SeqCst);
    }
}

impl Clock for TestClock {
    fn now(&self) -> Ts {
        Ts::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_advances_monotonically() {
        let clock = TestClock::new(1_000);
        assert_eq!(clock.now(), Ts::from_nanos(1_000));
        clock.advance(500);
        assert_eq!(clock.now(), Ts::from_nanos(1_500));
    }
}
