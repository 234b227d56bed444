//! Time source abstraction so TTL expiry and recency weighting can be tested
//! without sleeping.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use parking_lot::Mutex;
use std::fmt;
use std::time::Duration;

/// Source of wall-clock time
pub trait Clock: Send + Sync + fmt::Debug {
    /// Current time
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and simulations
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    /// Create a clock frozen at `start`
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Create a clock frozen at the current system time
    pub fn starting_now() -> Self {
        Self::new(Utc::now())
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let Ok(delta) = ChronoDuration::from_std(by) else {
            return;
        };
        let mut now = self.now.lock();
        if let Some(next) = now.checked_add_signed(delta) {
            *now = next;
        }
    }

    /// Jump to an absolute instant
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock() = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Seconds elapsed between two instants as a float, never negative
pub fn seconds_between(earlier: DateTime<Utc>, later: DateTime<Utc>) -> f64 {
    let millis = (later - earlier).num_milliseconds();
    (millis.max(0) as f64) / 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_advances() {
        let clock = ManualClock::starting_now();
        let start = clock.now();

        clock.advance(Duration::from_millis(1500));
        assert_eq!(seconds_between(start, clock.now()), 1.5);
    }

    #[test]
    fn test_seconds_between_is_never_negative() {
        let clock = ManualClock::starting_now();
        let start = clock.now();
        clock.advance(Duration::from_secs(10));

        assert_eq!(seconds_between(clock.now(), start), 0.0);
    }
}
