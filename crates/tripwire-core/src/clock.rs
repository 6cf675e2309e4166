//! Wall-clock sources for memory expiry, event windows and motion timers.
//!
//! The engine never reads the system time directly. Every world owns a
//! boxed [`Clock`]; production code uses [`SystemClock`] and tests use a
//! [`ManualClock`] whose handle can be cloned and advanced from outside the
//! world.
//!
//! Timestamps are persisted as Unix milliseconds. [`to_millis`] and
//! [`from_millis`] are the only conversion points.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, TimeDelta, Utc};

/// Errors that can occur when converting persisted time values.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// A millisecond timestamp does not map to a representable instant.
    #[error("timestamp {millis}ms is out of range")]
    OutOfRange {
        /// The offending value.
        millis: i64,
    },
}

/// A source of the current time.
pub trait Clock: Send {
    /// The current instant.
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the operating system clock.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to.
///
/// Clones share the same instant, so a test can hand one clone to a world
/// and keep another to drive time forward.
#[derive(Debug, Clone)]
pub struct ManualClock {
    millis: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(to_millis(start))),
        }
    }

    /// Create a clock frozen at the Unix epoch.
    pub fn at_epoch() -> Self {
        Self {
            millis: Arc::new(AtomicI64::new(0)),
        }
    }

    /// Move the clock forward (or backward, for a negative delta).
    pub fn advance(&self, delta: TimeDelta) {
        let step = delta.num_milliseconds();
        let current = self.millis.load(Ordering::SeqCst);
        self.millis
            .store(current.saturating_add(step), Ordering::SeqCst);
    }

    /// Move the clock forward by whole milliseconds.
    pub fn advance_millis(&self, millis: i64) {
        self.advance(TimeDelta::milliseconds(millis));
    }

    /// Jump to an absolute instant.
    pub fn set(&self, instant: DateTime<Utc>) {
        self.millis.store(to_millis(instant), Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at_epoch()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let millis = self.millis.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(millis).unwrap_or_default()
    }
}

/// Convert an instant to Unix milliseconds.
pub fn to_millis(instant: DateTime<Utc>) -> i64 {
    instant.timestamp_millis()
}

/// Convert Unix milliseconds back to an instant.
///
/// # Errors
///
/// Returns [`ClockError::OutOfRange`] if the value is not representable.
pub fn from_millis(millis: i64) -> Result<DateTime<Utc>, ClockError> {
    DateTime::from_timestamp_millis(millis).ok_or(ClockError::OutOfRange { millis })
}

/// `now + delta`, clamped to the representable range instead of overflowing.
pub fn saturating_add(now: DateTime<Utc>, delta: TimeDelta) -> DateTime<Utc> {
    now.checked_add_signed(delta)
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
