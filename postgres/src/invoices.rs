//! Invoice creation with per-franchise sequence allocation.
//!
//! Each allocation runs in one transaction:
//!
//! 1. `pg_advisory_xact_lock(key)` serializes allocators for the same franchise
//! 2. the franchise's existing invoice numbers and customer codes are scanned and
//!    the next sequence is `max + 1`
//! 3. the row is inserted inside a savepoint; a unique violation rolls back only
//!    the savepoint and the next sequence is tried
//!
//! The advisory lock is cooperative, so writers that bypass it (or rows another
//! franchise owns that happen to share a prefix) still collide on the unique
//! constraints, which step 3 absorbs. Attempts are bounded; a serialization
//! failure restarts the whole transaction and draws from the same budget.

use crate::error::{db_err, settle};
use crate::gateway::SchemaGateway;
use crate::INVOICES_TABLE;
use sqlx::postgres::PgRow;
use sqlx::{Connection, PgConnection, PgPool, Row};
use std::fmt;
use std::sync::Arc;
use stockgate_core::sequence::{advisory_lock_key, next_sequence, DEFAULT_MAX_ATTEMPTS};
use stockgate_core::{
    Clock, CoreError, DocumentNumbers, Invoice, InvoiceDraft, Result, SystemClock,
};

/// Transaction isolation used for allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IsolationLevel {
    /// Default `PostgreSQL` isolation; the advisory lock provides ordering.
    #[default]
    ReadCommitted,
    /// Full serializability; conflicts surface as SQLSTATE 40001 and are retried.
    Serializable,
}

impl IsolationLevel {
    /// Parse `read_committed` or `serializable` (case-insensitive, `-` or `_`).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for any other value.
    pub fn parse(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "read_committed" => Ok(Self::ReadCommitted),
            "serializable" => Ok(Self::Serializable),
            other => Err(CoreError::InvalidInput(format!(
                "unknown isolation level {other:?}"
            ))),
        }
    }

    /// SQL spelling for `SET TRANSACTION ISOLATION LEVEL`.
    #[must_use]
    pub const fn as_sql(&self) -> &'static str {
        match self {
            Self::ReadCommitted => "READ COMMITTED",
            Self::Serializable => "SERIALIZABLE",
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

/// Attempts shared by insert retries and transaction restarts.
#[derive(Debug)]
struct AttemptBudget {
    max: u32,
    used: u32,
}

impl AttemptBudget {
    const fn new(max: u32) -> Self {
        Self { max, used: 0 }
    }

    /// Consume one attempt; `false` once the budget is spent.
    const fn take(&mut self) -> bool {
        if self.used < self.max {
            self.used += 1;
            true
        } else {
            false
        }
    }

    fn exhausted(&self, franchisee_code: &str) -> CoreError {
        CoreError::SequenceRetriesExhausted {
            franchisee_code: franchisee_code.to_string(),
            attempts: self.used,
        }
    }
}

/// Numbers and inserts invoices.
#[derive(Clone)]
pub struct InvoiceAllocator {
    pool: PgPool,
    gateway: Arc<SchemaGateway>,
    clock: Arc<dyn Clock>,
    max_attempts: u32,
    isolation: IsolationLevel,
}

impl InvoiceAllocator {
    /// Create an allocator with five attempts, READ COMMITTED and the system clock.
    #[must_use]
    pub fn new(pool: PgPool, gateway: Arc<SchemaGateway>) -> Self {
        Self {
            pool,
            gateway,
            clock: Arc::new(SystemClock),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            isolation: IsolationLevel::default(),
        }
    }

    /// Override the attempt budget. Values below one are raised to one.
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Override the isolation level.
    #[must_use]
    pub const fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    /// Override the time source (drives the `MMYY` segment).
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Allocate the next sequence for the draft's franchise and insert the invoice.
    ///
    /// The returned identifiers are the ones the committed row holds.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] if the franchise code cannot be embedded in a
    ///   document number
    /// - [`CoreError::SequenceRetriesExhausted`] if every attempt collided
    /// - [`CoreError::SequenceOverflow`] if the next sequence exceeds four digits
    /// - [`CoreError::NoMatchingColumns`] if the invoices table has none of the
    ///   numbering columns
    /// - [`CoreError::Database`] on any other storage failure
    #[tracing::instrument(skip(self, draft), fields(franchisee_code = %draft.franchisee_code), name = "invoice_create")]
    pub async fn create_invoice(&self, draft: &InvoiceDraft) -> Result<Invoice> {
        draft.validate()?;
        let code = draft.franchisee_code.as_str();
        let mut budget = AttemptBudget::new(self.max_attempts);

        loop {
            if !budget.take() {
                return Err(budget.exhausted(code));
            }

            let mut tx = self
                .pool
                .begin()
                .await
                .map_err(db_err("Failed to begin transaction"))?;
            let result = self.allocate(&mut tx, draft, &mut budget).await;

            match settle(tx, result).await {
                Ok(invoice) => {
                    metrics::counter!("invoices.created").increment(1);
                    tracing::info!(
                        invoice_number = %invoice.invoice_number,
                        customer_code = %invoice.customer_code,
                        attempts = budget.used,
                        "Invoice created"
                    );
                    return Ok(invoice);
                }
                Err(err) if err.is_serialization_failure() => {
                    metrics::counter!("invoices.sequence_retries", "cause" => "serialization")
                        .increment(1);
                    tracing::warn!(error = %err, attempts = budget.used, "Allocation restarted");
                }
                Err(err) => {
                    tracing::warn!(error = %err, code = err.code(), "Invoice creation failed");
                    return Err(err);
                }
            }
        }
    }

    /// One allocation transaction. The caller has already taken the attempt
    /// covering the first insert.
    async fn allocate(
        &self,
        conn: &mut PgConnection,
        draft: &InvoiceDraft,
        budget: &mut AttemptBudget,
    ) -> Result<Invoice> {
        let code = draft.franchisee_code.as_str();

        if self.isolation == IsolationLevel::Serializable {
            sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
                .execute(&mut *conn)
                .await
                .map_err(db_err("Failed to set isolation level"))?;
        }

        sqlx::query("SELECT pg_advisory_xact_lock($1)")
            .bind(advisory_lock_key(code))
            .execute(&mut *conn)
            .await
            .map_err(db_err("Failed to acquire sequence lock"))?;

        let existing: Vec<(Option<String>, Option<String>)> = sqlx::query_as(
            "SELECT invoice_number, customer_code FROM invoices WHERE franchisee_code = $1",
        )
        .bind(code)
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("Failed to scan existing invoices"))?;

        let mut sequence = next_sequence(
            code,
            existing.iter().filter_map(|(number, _)| number.as_deref()),
            existing.iter().filter_map(|(_, customer)| customer.as_deref()),
        );
        let issued_at = self.clock.now();
        let mut first = true;

        loop {
            if !first && !budget.take() {
                return Err(budget.exhausted(code));
            }
            first = false;

            let numbers = DocumentNumbers::render(code, sequence, issued_at)?;
            let candidate = draft
                .pass_through_fields()
                .with("franchisee_code", code)
                .with("invoice_number", numbers.invoice_number.as_str())
                .with("customer_code", numbers.customer_code.as_str())
                .with("created_at", issued_at);

            let mut savepoint = Connection::begin(&mut *conn)
                .await
                .map_err(db_err("Failed to open savepoint"))?;
            let inserted = self
                .gateway
                .write_row(&mut savepoint, INVOICES_TABLE, &candidate)
                .await;

            match settle(savepoint, inserted).await {
                Ok(row) => return invoice_from_row(&row, code, &numbers),
                Err(CoreError::UniqueViolation { constraint }) => {
                    metrics::counter!("invoices.sequence_retries", "cause" => "duplicate")
                        .increment(1);
                    tracing::debug!(
                        sequence,
                        constraint = constraint.as_deref().unwrap_or("unknown"),
                        "Sequence taken, trying next"
                    );
                    sequence = sequence.saturating_add(1);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

fn invoice_from_row(row: &PgRow, code: &str, numbers: &DocumentNumbers) -> Result<Invoice> {
    let decode = db_err("Malformed invoice row");
    let id = match row.try_get::<Option<i64>, _>("id") {
        Ok(id) => id,
        Err(sqlx::Error::ColumnNotFound(_)) => None,
        Err(e) => return Err(decode(e)),
    };
    Ok(Invoice {
        id,
        franchisee_code: code.to_string(),
        invoice_number: row.try_get("invoice_number").map_err(&decode)?,
        customer_code: row.try_get("customer_code").map_err(&decode)?,
        sequence: numbers.sequence,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn isolation_level_parses_common_spellings() {
        assert_eq!(
            IsolationLevel::parse("read_committed").unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            IsolationLevel::parse(" Read-Committed ").unwrap(),
            IsolationLevel::ReadCommitted
        );
        assert_eq!(
            IsolationLevel::parse("SERIALIZABLE").unwrap(),
            IsolationLevel::Serializable
        );
        assert!(matches!(
            IsolationLevel::parse("snapshot"),
            Err(CoreError::InvalidInput(_))
        ));
    }

    #[test]
    fn isolation_level_renders_sql() {
        assert_eq!(IsolationLevel::default().as_sql(), "READ COMMITTED");
        assert_eq!(IsolationLevel::Serializable.to_string(), "SERIALIZABLE");
    }

    #[test]
    fn budget_runs_out_after_max_attempts() {
        let mut budget = AttemptBudget::new(2);
        assert!(budget.take());
        assert!(budget.take());
        assert!(!budget.take());
        assert_eq!(
            budget.exhausted("MAXTT-DEMO-001"),
            CoreError::SequenceRetriesExhausted {
                franchisee_code: "MAXTT-DEMO-001".into(),
                attempts: 2,
            }
        );
    }
}
