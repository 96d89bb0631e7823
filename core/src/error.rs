//! Error taxonomy shared by every layer.
//!
//! Each variant belongs to one [`ErrorKind`] and carries a stable machine-readable
//! [`code`](CoreError::code). The web layer maps kinds to HTTP statuses; the
//! codes are part of the external contract and must not change.

use crate::installation::{InstallationId, InstallationStatus};
use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, CoreError>;

/// Broad classification used to decide status codes and retry behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input. Never retried.
    Validation,
    /// Unknown franchise or installation.
    NotFound,
    /// A state or stock guard was violated. The caller may retry later.
    Conflict,
    /// Storage unavailable, mapping undiscoverable, or a bug.
    Infrastructure,
}

/// Errors produced by the stock ledger, installation state machine,
/// sequence allocator and schema gateway.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    // ═══════════════════════════════════════════════════════════
    // Validation
    // ═══════════════════════════════════════════════════════════

    /// No franchisee identifier was supplied.
    #[error("franchiseeId is required")]
    MissingFranchiseeId,

    /// Input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ═══════════════════════════════════════════════════════════
    // Not found
    // ═══════════════════════════════════════════════════════════

    /// The inventory table has no row for this franchise.
    #[error("No inventory row for franchisee {franchisee_id}")]
    InventoryRowNotFound {
        /// Franchise that was looked up
        franchisee_id: String,
    },

    /// No installation with this id.
    #[error("Installation {0} not found")]
    InstallationNotFound(InstallationId),

    // ═══════════════════════════════════════════════════════════
    // Conflict
    // ═══════════════════════════════════════════════════════════

    /// Available stock is below the minimum required to start.
    #[error("Available stock {available} is below the threshold of {threshold}")]
    StockBelowThreshold {
        /// Minimum quantity required
        threshold: f64,
        /// Quantity observed under lock
        available: f64,
    },

    /// The installation already reached a terminal state.
    #[error("Installation is already {status}")]
    AlreadyFinalized {
        /// Current (terminal) status
        status: InstallationStatus,
    },

    /// The installation was created without permission to proceed.
    #[error("Installation is not allowed to proceed")]
    NotAllowedToProceed,

    /// Current stock cannot cover the quantity used.
    #[error("Insufficient stock to deduct {requested}")]
    InsufficientStockForDeduction {
        /// Quantity the completion tried to deduct
        requested: f64,
    },

    /// Cancel found no installation in the `Started` state.
    #[error("Installation {0} is not started or does not exist")]
    NotStartedOrMissing(InstallationId),

    /// A unique constraint rejected a write.
    #[error("Unique constraint violated{}", constraint_suffix(.constraint))]
    UniqueViolation {
        /// Constraint name reported by the database, if any
        constraint: Option<String>,
    },

    /// The database aborted the transaction to preserve serializability.
    #[error("Transaction could not be serialized: {0}")]
    SerializationFailure(String),

    // ═══════════════════════════════════════════════════════════
    // Infrastructure
    // ═══════════════════════════════════════════════════════════

    /// No table mapping franchises to stock could be found.
    #[error("Inventory mapping could not be determined")]
    InventoryMappingNotFound,

    /// None of the candidate fields exist as columns of the target table.
    #[error("No candidate field matches a column of {table}")]
    NoMatchingColumns {
        /// Target table
        table: String,
    },

    /// A table or column name failed the identifier allowlist.
    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Sequence allocation kept colliding until the attempt budget ran out.
    #[error("Could not allocate a sequence for {franchisee_code} after {attempts} attempts")]
    SequenceRetriesExhausted {
        /// Franchise being allocated for
        franchisee_code: String,
        /// Attempts made
        attempts: u32,
    },

    /// The next sequence no longer fits in four digits.
    #[error("Sequence {sequence} for {franchisee_code} exceeds four digits")]
    SequenceOverflow {
        /// Franchise being allocated for
        franchisee_code: String,
        /// Sequence that could not be rendered
        sequence: u32,
    },

    /// Database error.
    #[error("Database error: {0}")]
    Database(String),
}

impl CoreError {
    /// Classify this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::MissingFranchiseeId | Self::InvalidInput(_) => ErrorKind::Validation,
            Self::InventoryRowNotFound { .. } | Self::InstallationNotFound(_) => {
                ErrorKind::NotFound
            }
            Self::StockBelowThreshold { .. }
            | Self::AlreadyFinalized { .. }
            | Self::NotAllowedToProceed
            | Self::InsufficientStockForDeduction { .. }
            | Self::NotStartedOrMissing(_)
            | Self::UniqueViolation { .. }
            | Self::SerializationFailure(_) => ErrorKind::Conflict,
            Self::InventoryMappingNotFound
            | Self::NoMatchingColumns { .. }
            | Self::InvalidIdentifier(_)
            | Self::SequenceRetriesExhausted { .. }
            | Self::SequenceOverflow { .. }
            | Self::Database(_) => ErrorKind::Infrastructure,
        }
    }

    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::MissingFranchiseeId => "missing_franchisee_id",
            Self::InvalidInput(_) => "invalid_input",
            Self::InventoryRowNotFound { .. } => "inventory_row_not_found",
            Self::InstallationNotFound(_) => "installation_not_found",
            Self::StockBelowThreshold { .. } => "stock_below_threshold",
            Self::AlreadyFinalized { .. } => "already_finalized",
            Self::NotAllowedToProceed => "not_allowed_to_proceed",
            Self::InsufficientStockForDeduction { .. } => "insufficient_stock_for_deduction",
            Self::NotStartedOrMissing(_) => "not_started_or_missing",
            Self::UniqueViolation { .. } => "unique_violation",
            Self::SerializationFailure(_) => "serialization_failure",
            Self::InventoryMappingNotFound => "inventory_mapping_not_found",
            Self::NoMatchingColumns { .. } => "no_matching_columns",
            Self::InvalidIdentifier(_) => "invalid_identifier",
            Self::SequenceRetriesExhausted { .. } => "sequence_retries_exhausted",
            Self::SequenceOverflow { .. } => "sequence_overflow",
            Self::Database(_) => "database_error",
        }
    }

    /// Whether this error is a transient concurrency failure that warrants
    /// restarting the whole transaction.
    #[must_use]
    pub const fn is_serialization_failure(&self) -> bool {
        matches!(self, Self::SerializationFailure(_))
    }
}

fn constraint_suffix(constraint: &Option<String>) -> String {
    constraint
        .as_ref()
        .map(|c| format!(": {c}"))
        .unwrap_or_default()
}
