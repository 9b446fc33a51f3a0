use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, Utc};
use tokio::time::Instant;

/// Source of wall clock time for expiry decisions.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

pub type SharedClock = Arc<dyn Clock>;

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

pub fn system_clock() -> SharedClock {
    Arc::new(SystemClock)
}

/// Clock that only moves when told to. Used by tests.
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Arc<Self> {
        Arc::new(Self { current: Mutex::new(start) })
    }

    pub fn starting_now() -> Arc<Self> {
        Self::new(Utc::now())
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }

    pub fn set(&self, at: DateTime<Utc>) {
        *self.current.lock().unwrap_or_else(|e| e.into_inner()) = at;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Upper bound for every configured or requested lifetime: ten years.
pub const MAX_LIFETIME_SECONDS: u64 = 10 * 365 * 24 * 60 * 60;

/// `secs` as a chrono duration, clamped to [`MAX_LIFETIME_SECONDS`].
pub fn capped_seconds(secs: u64) -> Duration {
    i64::try_from(secs.min(MAX_LIFETIME_SECONDS))
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

/// Same as [`capped_seconds`] for a count of minutes.
pub fn capped_minutes(minutes: u64) -> Duration {
    capped_seconds(minutes.saturating_mul(60))
}

/// `at + by`, saturating at the latest representable instant.
pub fn saturating_add(at: DateTime<Utc>, by: Duration) -> DateTime<Utc> {
    at.checked_add_signed(by).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub fn get_instant() -> Instant {
    Instant::now()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_clock_moves_only_when_advanced() {
        let clock = ManualClock::starting_now();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);
        clock.advance(Duration::minutes(29));
        assert_eq!(clock.now() - t0, Duration::minutes(29));
    }

    #[test]
    fn lifetimes_are_clamped_instead_of_overflowing() {
        assert_eq!(capped_seconds(90), Duration::seconds(90));
        assert_eq!(capped_seconds(u64::MAX), Duration::seconds(MAX_LIFETIME_SECONDS as i64));
        assert_eq!(capped_seconds(10_000_000_000_000_000), capped_seconds(MAX_LIFETIME_SECONDS));
        assert_eq!(capped_minutes(30), Duration::minutes(30));
        assert_eq!(capped_minutes(u64::MAX), capped_seconds(MAX_LIFETIME_SECONDS));

        let now = Utc::now();
        assert_eq!(saturating_add(now, Duration::seconds(1)), now + Duration::seconds(1));
        assert_eq!(saturating_add(DateTime::<Utc>::MAX_UTC, Duration::days(1)), DateTime::<Utc>::MAX_UTC);
    }
}
