//! # Stockgate Testing
//!
//! Test support shared by the `stockgate-postgres` and `stockgate-web` test suites.
//!
//! - [`mocks::FixedClock`]: deterministic time, so invoice numbers carry a known
//!   `MMYY` segment
//! - [`TestDatabase`]: a throwaway `PostgreSQL` container with migrations applied and
//!   an inventory table the ledger can discover
//!
//! ## Example
//!
//! ```ignore
//! use stockgate_testing::{TestDatabase, DEMO_FRANCHISEE};
//!
//! #[tokio::test]
//! async fn start_installation() {
//!     let db = TestDatabase::start().await;
//!     let mapping = db.create_inventory_table().await;
//!     db.set_stock(DEMO_FRANCHISEE, 25.0).await;
//!     // build an InstallationService over db.pool() and `mapping`
//! }
//! ```

use chrono::{DateTime, Utc};
use stockgate_core::Clock;

pub mod database;

pub use database::{DEMO_FRANCHISEE, INVENTORY_TABLE, TestDatabase};
pub use mocks::{FixedClock, test_clock};

/// Mock implementations of environment traits.
pub mod mocks {
    use super::{Clock, DateTime, Utc};

    /// Clock that always returns the same instant.
    ///
    /// # Example
    ///
    /// ```
    /// use stockgate_testing::mocks::FixedClock;
    /// use stockgate_core::Clock;
    /// use chrono::Utc;
    ///
    /// let clock = FixedClock::new(Utc::now());
    /// assert_eq!(clock.now(), clock.now());
    /// ```
    #[derive(Debug, Clone)]
    pub struct FixedClock {
        time: DateTime<Utc>,
    }

    impl FixedClock {
        /// Clock frozen at `time`.
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

    /// Clock frozen at 2025-03-15 10:00:00 UTC (invoice `MMYY` = `0325`).
    ///
    /// # Panics
    ///
    /// Panics if the hardcoded timestamp fails to parse, which cannot happen.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn test_clock() -> FixedClock {
        FixedClock::new(
            DateTime::parse_from_rfc3339("2025-03-15T10:00:00Z")
                .expect("hardcoded timestamp should always parse")
                .with_timezone(&Utc),
        )
    }
}

/// Install a `tracing` subscriber that honours `RUST_LOG`, once per process.
///
/// Later calls are no-ops, so every test may call it.
pub fn init_test_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_clock_never_moves() {
        let clock = test_clock();
        assert_eq!(clock.now(), clock.now());
        assert_eq!(clock.now().format("%m%y").to_string(), "0325");
    }
}
