//! Elapsed-time counters.

use core::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use lazy_static::lazy_static;

/// A monotonic microsecond counter.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

lazy_static! {
    static ref BOOT_INSTANT: Instant = Instant::now();
}

/// Host wall clock, counted from the first time any kernel read it.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        u64::try_from(BOOT_INSTANT.elapsed().as_micros()).unwrap_or(u64::MAX)
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    micros: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn advance(&self, micros: u64) {
        self.micros.fetch_add(micros, Ordering::SeqCst);
    }

    /// Move the clock forward to `micros`; earlier values are ignored.
    pub fn set(&self, micros: u64) {
        self.micros.fetch_max(micros, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        self.micros.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_never_goes_backwards() {
        let clock = ManualClock::new();
        clock.advance(500);
        clock.set(200);
        assert_eq!(clock.now(), 500);
        clock.set(900);
        assert_eq!(clock.now(), 900);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let first = SystemClock.now();
        let second = SystemClock.now();
        assert!(second >= first);
    }
}
