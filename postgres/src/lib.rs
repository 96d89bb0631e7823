//! `PostgreSQL` implementation of the stock ledger, installation state machine and
//! invoice sequence allocator.
//!
//! All mutual exclusion is delegated to the database:
//!
//! - **Row locks** (`SELECT … FOR UPDATE`) serialize work on one inventory row or
//!   one installation
//! - **Guarded updates** (`… WHERE stock >= $amount`) keep stock non-negative under
//!   any interleaving of deductions
//! - **Advisory locks** (`pg_advisory_xact_lock`) serialize sequence allocation per
//!   franchise, backed by unique constraints and a bounded retry loop
//!
//! Every multi-step operation runs in one transaction and rolls back on any error,
//! so a rejected request never leaves partial state behind.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use stockgate_postgres::{InstallationService, SchemaGateway, StockLedger};
//!
//! # async fn example(pool: sqlx::PgPool) -> Result<(), Box<dyn std::error::Error>> {
//! stockgate_postgres::migrate(&pool).await?;
//!
//! let gateway = Arc::new(SchemaGateway::new(pool.clone()));
//! gateway.preload(&["installations", "invoices"]).await?;
//! let mapping = StockLedger::detect_mapping(&pool).await?;
//!
//! let installations = InstallationService::new(pool, gateway, mapping);
//! let started = installations.start("MAXTT-DEMO-001").await?;
//! println!("installation {} started", started.installation_id);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod gateway;
pub mod installations;
pub mod invoices;
pub mod ledger;

pub use gateway::SchemaGateway;
pub use installations::InstallationService;
pub use invoices::{InvoiceAllocator, IsolationLevel};
pub use ledger::StockLedger;

use stockgate_core::{CoreError, Result};

/// Table the installation state machine owns.
pub const INSTALLATIONS_TABLE: &str = "installations";

/// Table the invoice allocator writes to.
pub const INVOICES_TABLE: &str = "invoices";

/// Create the `installations` and `invoices` tables if they do not exist.
///
/// The inventory table is provisioned elsewhere and is never migrated here.
///
/// # Errors
///
/// Returns [`CoreError::Database`] if a migration fails.
pub async fn migrate(pool: &sqlx::PgPool) -> Result<()> {
    sqlx::migrate!("./migrations")
        .run(pool)
        .await
        .map_err(|e| CoreError::Database(format!("Migration failed: {e}")))?;
    Ok(())
}
