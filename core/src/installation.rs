//! Installation lifecycle rules.
//!
//! An installation is one sealant-application job. It is created `Started` only
//! when the franchise's stock, read under a row lock, meets the
//! [`StockThreshold`]. From `Started` it moves to exactly one terminal state:
//!
//! ```text
//!            complete (deducts stock)
//! Started ─────────────────────────────▶ Completed
//!    │
//!    └──────────────────────────────────▶ Cancelled
//!            cancel (no stock effect)
//! ```
//!
//! The rules here are pure; `stockgate-postgres` evaluates them inside the
//! transaction that holds the relevant locks.

use crate::error::{CoreError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Minimum available quantity (litres) required to start an installation.
pub const MIN_STOCK_THRESHOLD: f64 = 20.0;

/// Database identifier of an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstallationId(i64);

impl InstallationId {
    /// Wrap a raw id.
    #[must_use]
    pub const fn new(id: i64) -> Self {
        Self(id)
    }

    /// Raw id.
    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl fmt::Display for InstallationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle state of an installation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InstallationStatus {
    /// Stock was sufficient at start; work is in progress.
    Started,
    /// Stock was deducted. Terminal.
    Completed,
    /// Abandoned without touching stock. Terminal.
    Cancelled,
}

impl InstallationStatus {
    /// Database string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "Started",
            Self::Completed => "Completed",
            Self::Cancelled => "Cancelled",
        }
    }

    /// Parse status from its database string.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`] if the string is not a known status.
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "Started" => Ok(Self::Started),
            "Completed" => Ok(Self::Completed),
            "Cancelled" => Ok(Self::Cancelled),
            _ => Err(CoreError::Database(format!(
                "Invalid installation status: {s}"
            ))),
        }
    }

    /// Whether no further transition is legal.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for InstallationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stored installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Installation {
    /// Assigned at creation
    pub id: InstallationId,
    /// Franchise the stock belongs to
    pub franchisee_id: String,
    /// Quantity observed under lock when the installation started
    pub snapshot_quantity: f64,
    /// Decision taken at start
    pub allowed_to_proceed: bool,
    /// Current state
    pub status: InstallationStatus,
    /// Quantity deducted on completion
    pub used_quantity: Option<f64>,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Completion time
    pub completed_at: Option<DateTime<Utc>>,
    /// Last modification time
    pub updated_at: DateTime<Utc>,
}

impl Installation {
    /// Check that `complete` may run against this installation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::AlreadyFinalized`] unless the status is `Started`
    /// - [`CoreError::NotAllowedToProceed`] if the start-time decision was negative
    pub const fn ensure_completable(&self) -> Result<()> {
        if self.status.is_terminal() {
            return Err(CoreError::AlreadyFinalized {
                status: self.status,
            });
        }
        if !self.allowed_to_proceed {
            return Err(CoreError::NotAllowedToProceed);
        }
        Ok(())
    }
}

/// Minimum stock required to start an installation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StockThreshold(f64);

impl Default for StockThreshold {
    fn default() -> Self {
        Self(MIN_STOCK_THRESHOLD)
    }
}

impl StockThreshold {
    /// Create a threshold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] for negative or non-finite values.
    pub fn new(quantity: f64) -> Result<Self> {
        if quantity.is_finite() && quantity >= 0.0 {
            Ok(Self(quantity))
        } else {
            Err(CoreError::InvalidInput(format!(
                "stock threshold must be a non-negative number, got {quantity}"
            )))
        }
    }

    /// Threshold quantity.
    #[must_use]
    pub const fn quantity(&self) -> f64 {
        self.0
    }

    /// Decide whether `available` permits starting.
    ///
    /// A `NaN` reading never satisfies the threshold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::StockBelowThreshold`] when `available` is below the
    /// threshold.
    pub fn check(&self, available: f64) -> Result<()> {
        if available >= self.0 {
            Ok(())
        } else {
            Err(CoreError::StockBelowThreshold {
                threshold: self.0,
                available,
            })
        }
    }
}

/// Normalise a franchisee identifier supplied by a caller.
///
/// # Errors
///
/// Returns [`CoreError::MissingFranchiseeId`] if the id is blank.
pub fn normalize_franchisee_id(raw: &str) -> Result<&str> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        Err(CoreError::MissingFranchiseeId)
    } else {
        Ok(trimmed)
    }
}

/// Validate the quantity consumed by a completed installation.
///
/// # Errors
///
/// Returns [`CoreError::InvalidInput`] unless the quantity is finite and positive.
pub fn validate_used_quantity(quantity: f64) -> Result<f64> {
    if quantity.is_finite() && quantity > 0.0 {
        Ok(quantity)
    } else {
        Err(CoreError::InvalidInput(format!(
            "usedQuantity must be a positive number, got {quantity}"
        )))
    }
}

/// Result of a successful `start`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartedInstallation {
    /// New installation
    pub installation_id: InstallationId,
    /// Quantity observed under lock
    pub snapshot_quantity: f64,
    /// When the quantity was checked
    pub checked_at: DateTime<Utc>,
    /// Threshold the quantity was checked against
    pub threshold_quantity: f64,
}

/// Result of a successful `complete`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletedInstallation {
    /// Installation after the transition
    pub installation: Installation,
    /// Stock remaining after the deduction
    pub available_after: f64,
}
