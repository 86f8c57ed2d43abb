//! Deterministic clock for tests.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
    time::Duration,
};

use chrono::{DateTime, TimeZone, Utc};
use messaging_core::Clock;

/// Manually-advanced clock.
///
/// Starts at a fixed epoch so timestamps in assertions are stable. `sleep`
/// advances virtual time immediately and yields once, which keeps code
/// under test moving without real delays.
#[derive(Clone)]
pub struct TestClock {
    epoch_millis: Arc<AtomicI64>,
}

impl TestClock {
    /// Creates a clock starting at 2024-01-01T00:00:00Z.
    pub fn new() -> Self {
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Self::starting_at(start)
    }

    /// Creates a clock starting at the given instant.
    pub fn starting_at(start: DateTime<Utc>) -> Self {
        Self { epoch_millis: Arc::new(AtomicI64::new(start.timestamp_millis())) }
    }

    /// Advances the clock by `duration`.
    pub fn advance(&self, duration: Duration) {
        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        self.epoch_millis.fetch_add(millis, Ordering::AcqRel);
    }
}

impl Default for TestClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for TestClock {
    fn now_utc(&self) -> DateTime<Utc> {
        let millis = self.epoch_millis.load(Ordering::Acquire);
        DateTime::from_timestamp_millis(millis).expect("test clock out of range")
    }

    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + '_>> {
        self.advance(duration);
        Box::pin(tokio::task::yield_now())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advance_moves_time_forward() {
        let clock = TestClock::new();
        let before = clock.now_utc();
        clock.advance(Duration::from_secs(90));
        assert_eq!((clock.now_utc() - before).num_seconds(), 90);
    }
}
