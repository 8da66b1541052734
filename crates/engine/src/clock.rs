//! Clock capability — injectable time for cooldowns, decay, and events.

use std::time::Instant;

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Time source for the engine. Components never read the system clock
/// directly; tests drive a [`ManualClock`] instead.
pub trait Clock: Send + Sync {
    /// Wall clock, for display and persisted timestamps.
    fn now_wall(&self) -> DateTime<Utc>;

    /// Monotonic milliseconds since engine start, for durations and
    /// cooldown arithmetic.
    fn monotonic_ms(&self) -> u64;
}

/// Real time, anchored at construction.
pub struct SystemClock {
    started: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            started: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now_wall(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn monotonic_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

/// Hand-advanced clock for tests.
pub struct ManualClock {
    base_wall: DateTime<Utc>,
    ms: Mutex<u64>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base_wall: Utc::now(),
            ms: Mutex::new(0),
        }
    }

    pub fn advance_ms(&self, ms: u64) {
        *self.ms.lock() += ms;
    }

    pub fn advance_secs(&self, secs: u64) {
        self.advance_ms(secs * 1000);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_wall(&self) -> DateTime<Utc> {
        self.base_wall + Duration::milliseconds(*self.ms.lock() as i64)
    }

    fn monotonic_ms(&self) -> u64 {
        *self.ms.lock()
    }
}
