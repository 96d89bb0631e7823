//! Time source abstraction.
//!
//! Services take a `Clock` so that timestamps (and the `MMYY` segment of invoice
//! numbers) are deterministic under test. Use `FixedClock` from
//! `stockgate-testing` in tests.

use chrono::{DateTime, Utc};

/// Source of the current time.
pub trait Clock: Send + Sync {
    /// Current time in UTC.
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
