//! Ledger clock: the single source of "now" and of day arithmetic.
//!
//! RULE: the payment engine never reads the system time itself.
//! Callers pass `now` in; the ledger gets it from a `Clock`.

use crate::types::SECONDS_PER_DAY;
use chrono::{DateTime, Duration, Months, Utc};
use std::sync::{Arc, Mutex};

pub trait Clock: Send {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time in UTC.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// A clock that only moves when told to. Clones share the same instant,
/// so a test can keep one handle and give another to the ledger.
#[derive(Debug, Clone)]
pub struct FixedClock {
    at: Arc<Mutex<DateTime<Utc>>>,
}

impl FixedClock {
    pub fn new(at: DateTime<Utc>) -> Self {
        Self { at: Arc::new(Mutex::new(at)) }
    }

    pub fn set(&self, at: DateTime<Utc>) {
        let mut guard = self.at.lock().unwrap_or_else(|p| p.into_inner());
        *guard = at;
    }

    pub fn advance_days(&self, days: i64) {
        let mut guard = self.at.lock().unwrap_or_else(|p| p.into_inner());
        *guard += Duration::days(days);
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.at.lock().unwrap_or_else(|p| p.into_inner())
    }
}

/// Whole days from `from` to `to`, floored. Negative when `to` is earlier.
pub fn whole_days_between(from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
    (to - from).num_seconds().div_euclid(SECONDS_PER_DAY)
}

/// `None` when the result falls outside chrono's representable range.
pub fn add_days(at: DateTime<Utc>, days: i64) -> Option<DateTime<Utc>> {
    at.checked_add_signed(Duration::try_days(days)?)
}

/// Same day-of-month next month, clamped to the month's last day.
pub fn add_one_month(at: DateTime<Utc>) -> Option<DateTime<Utc>> {
    at.checked_add_months(Months::new(1))
        .or_else(|| add_days(at, 30))
}
