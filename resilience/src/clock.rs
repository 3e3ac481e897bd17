//! Wall-clock abstraction shared by the circuit breaker and alert manager.
//!
//! Breaker recovery and alert windows are measured against a [`Clock`] so
//! tests can drive time explicitly with [`ManualClock`].

use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};

/// Source of "now".
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

/// Clock backed by the system time.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic tests.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    /// Move the clock forward by `by`.
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += to_delta(by);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = to;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(Utc::now())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Convert a std duration into a chrono delta, saturating on overflow.
pub(crate) fn to_delta(duration: Duration) -> TimeDelta {
    TimeDelta::from_std(duration).unwrap_or(TimeDelta::MAX)
}

/// Clock used by unit tests that need to observe when time is read.
#[cfg(test)]
pub(crate) mod observed {
    use std::fmt;
    use std::sync::OnceLock;

    use chrono::{DateTime, Utc};

    use super::Clock;

    type ReadHook = Box<dyn Fn() + Send + Sync>;

    /// Fixed clock that runs a callback on every read.
    pub(crate) struct ObservedClock {
        now: DateTime<Utc>,
        on_read: OnceLock<ReadHook>,
    }

    impl ObservedClock {
        pub(crate) fn new(now: DateTime<Utc>) -> Self {
            Self {
                now,
                on_read: OnceLock::new(),
            }
        }

        /// Install the callback. Only the first call has an effect.
        pub(crate) fn on_read(&self, hook: impl Fn() + Send + Sync + 'static) {
            let _ = self.on_read.set(Box::new(hook));
        }
    }

    impl fmt::Debug for ObservedClock {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.debug_struct("ObservedClock").field("now", &self.now).finish()
        }
    }

    impl Clock for ObservedClock {
        fn now(&self) -> DateTime<Utc> {
            if let Some(hook) = self.on_read.get() {
                hook();
            }
            self.now
        }
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::expect_used, clippy::unwrap_used)]

    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    #[test]
    fn manual_clock_advances_and_jumps() {
        let start = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let clock = ManualClock::new(start);
        assert_eq!(clock.now(), start);

        clock.advance(Duration::from_secs(90));
        assert_eq!(clock.now(), start + TimeDelta::seconds(90));

        let later = Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap();
        clock.set(later);
        assert_eq!(clock.now(), later);
    }

    #[test]
    fn oversized_durations_saturate() {
        assert_eq!(to_delta(Duration::MAX), TimeDelta::MAX);
    }
}
