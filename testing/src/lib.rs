//! # PG Stay Testing
//!
//! Deterministic clocks, the [`ReducerTest`] given/when/then harness and
//! effect assertions shared by the workspace's test suites.
//!
//! ```ignore
//! use pgstay_testing::{ReducerTest, test_clock};
//!
//! ReducerTest::new(BookingReducer)
//!     .with_env(test_environment())
//!     .given_state(state_with_listing())
//!     .when_action(create_booking(false))
//!     .then_state(|s| assert_eq!(s.bookings.len(), 1))
//!     .run();
//! ```

use chrono::{DateTime, Duration, Utc};
use pgstay_core::environment::Clock;
use std::sync::{Arc, RwLock};


pub use reducer_test::{ReducerTest, assertions, resolve_effects};

/// Clock implementations for tests.
pub mod mocks {
    use super::{Arc, Clock, DateTime, Duration, RwLock, Utc};

    /// Clock frozen at one instant.
    ///
    /// ```
    /// use pgstay_testing::mocks::FixedClock;
    /// use pgstay_core::environment::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone, Copy)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Freeze time at `time`
        #[must_use]
        pub const fn new(time: DateTime<Utc>) -> Self {
            Self { time }
        }
    }

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.time
        }
    }

    /// Clock that only moves when a test advances it.
    ///
    /// Clones share the same instant, so a test can keep one clone and hand
    /// the other to an environment.
    #[derive(Debug, Clone)]
    pub struct ManualClock {
        time: Arc<RwLock<DateTime<Utc>>>,
    }

    impl ManualClock {
        /// Start at `time`
        #[must_use]
        pub fn new(time: DateTime<Utc>) -> Self {
            Self {
                time: Arc::new(RwLock::new(time)),
            }
        }

        /// Move the clock forward by `by`.
        pub fn advance(&self, by: Duration) {
            if let Ok(mut time) = self.time.write() {
                *time += by;
            }
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            self.time.read().map_or_else(|poisoned| **poisoned.get_ref(), |time| *time)
        }
    }

    /// 2025-01-01T00:00:00Z, the instant every test suite starts from.
    #[must_use]
    pub fn test_epoch() -> DateTime<Utc> {
        DateTime::from_timestamp(1_735_689_600, 0).unwrap_or_default()
    }

    /// A [`FixedClock`] at [`test_epoch`].
    #[must_use]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(test_epoch())
    }
}

pub use mocks::{FixedClock, ManualClock, test_clock, test_epoch};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clock_starts_at_new_year_2025() {
        assert_eq!(test_clock().now().to_rfc3339(), "2025-01-01T00:00:00+00:00");
    }

    #[test]
    fn manual_clock_advances_all_clones() {
        let clock = ManualClock::new(test_epoch());
        let shared = clock.clone();

        clock.advance(Duration::days(3));

        assert_eq!(shared.now() - test_epoch(), Duration::days(3));
    }
}
