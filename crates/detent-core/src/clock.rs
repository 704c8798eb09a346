//! Monotonic microsecond time sources.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Source of monotonic timestamps in microseconds.
pub trait Clock: Send + Sync {
    fn now_us(&self) -> u64;
}

/// Wall-independent clock backed by [`Instant`].
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Clock advanced by hand. Used by simulations and tests to replay edge
/// timings exactly.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_us: u64) -> Self {
        Self {
            now: AtomicU64::new(start_us),
        }
    }

    pub fn set(&self, us: u64) {
        self.now.store(us, Ordering::Release);
    }

    pub fn advance(&self, us: u64) {
        self.now.fetch_add(us, Ordering::AcqRel);
    }
}

impl Clock for ManualClock {
    #[inline]
    fn now_us(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(500);
        assert_eq!(clock.now_us(), 500);
        clock.advance(1_500);
        assert_eq!(clock.now_us(), 2_000);
        clock.set(10);
        assert_eq!(clock.now_us(), 10);
    }

    #[test]
    fn test_monotonic_clock_never_goes_back() {
        let clock = MonotonicClock::new();
        let a = clock.now_us();
        let b = clock.now_us();
        assert!(b >= a);
    }
}
