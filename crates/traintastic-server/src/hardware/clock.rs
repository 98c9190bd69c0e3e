//! Time source for kernel timers
//!
//! Kernels never read the system clock directly; they go through a [`Clock`]
//! so that heartbeat behaviour is testable against a manually advanced
//! [`VirtualClock`].

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Abstraction over monotonic time.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// Real monotonic time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

// ----------------------------------------------------------------------------
// Virtual Clock
// ----------------------------------------------------------------------------

/// Manually advanced clock for deterministic timer tests.
#[derive(Clone)]
pub struct VirtualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl VirtualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    /// Advance virtual time by the given duration.
    pub fn advance(&self, duration: Duration) {
        *self.offset.lock().unwrap() += duration;
    }
}

impl Default for VirtualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for VirtualClock {
    fn now(&self) -> Instant {
        self.base + *self.offset.lock().unwrap()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_clock_advances_only_manually() {
        let clock = VirtualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::from_millis(50));
        assert_eq!(clock.now() - t0, Duration::from_millis(50));
    }
}
