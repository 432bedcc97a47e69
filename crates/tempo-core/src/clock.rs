use std::sync::Mutex;

use chrono::{DateTime, Utc};

/// Time source consumed from the host framework.
///
/// Stores never call `Utc::now()` directly; they ask the injected clock so
/// lease expiry, retry delays and dead-letter timestamps are deterministic
/// under test.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time. The production impl the host hands to the engine.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock pinned to an explicit instant, advanced manually. Test use only.
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Move the clock forward by `seconds`.
    pub fn advance_secs(&self, seconds: i64) {
        let mut now = self.now.lock().unwrap();
        *now += chrono::Duration::seconds(seconds);
    }

    pub fn set(&self, instant: DateTime<Utc>) {
        *self.now.lock().unwrap() = instant;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn fixed_clock_advances() {
        let t0 = Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap();
        let clock = FixedClock::new(t0);
        assert_eq!(clock.now(), t0);
        clock.advance_secs(90);
        assert_eq!(clock.now(), t0 + chrono::Duration::seconds(90));
    }
}
