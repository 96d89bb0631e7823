//! Installation lifecycle backed by `PostgreSQL`.
//!
//! `start` and `complete` each run in a single transaction that holds the row lock
//! it depends on: the inventory row while the threshold is checked, the
//! installation row while stock is deducted. Any rejection rolls the transaction
//! back, so a failed request leaves neither an installation nor a stock change.
//!
//! The inventory mapping is kept once known. While it is unknown, every `start` and
//! `complete` retries catalog detection, so an inventory table provisioned after
//! startup is picked up without a restart.

use crate::error::{db_err, settle};
use crate::gateway::SchemaGateway;
use crate::ledger::StockLedger;
use crate::INSTALLATIONS_TABLE;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, PgPool, Row};
use std::sync::Arc;
use stockgate_core::installation::{normalize_franchisee_id, validate_used_quantity};
use stockgate_core::{
    CandidateRow, Clock, CompletedInstallation, CoreError, Deduction, ErrorKind, Installation,
    InstallationId, InstallationStatus, InventoryMapping, Result, StartedInstallation,
    StockThreshold, SystemClock,
};
use tokio::sync::RwLock;

/// Starts, completes and cancels installations against the stock ledger.
///
/// Cheap to clone; clones share the pool, gateway, clock and resolved mapping.
#[derive(Clone)]
pub struct InstallationService {
    pool: PgPool,
    gateway: Arc<SchemaGateway>,
    mapping: Arc<RwLock<Option<InventoryMapping>>>,
    threshold: StockThreshold,
    clock: Arc<dyn Clock>,
}

impl InstallationService {
    /// Create a service with the default threshold and the system clock.
    ///
    /// `mapping` is the inventory mapping detected at startup (or configured).
    /// With `None`, detection is retried on each `start` and `complete` until it
    /// succeeds; until then both fail with [`CoreError::InventoryMappingNotFound`].
    /// `cancel` and `get` never need it.
    #[must_use]
    pub fn new(pool: PgPool, gateway: Arc<SchemaGateway>, mapping: Option<InventoryMapping>) -> Self {
        Self {
            pool,
            gateway,
            mapping: Arc::new(RwLock::new(mapping)),
            threshold: StockThreshold::default(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Override the start threshold.
    #[must_use]
    pub const fn with_threshold(mut self, threshold: StockThreshold) -> Self {
        self.threshold = threshold;
        self
    }

    /// Override the time source.
    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Threshold applied by `start`.
    #[must_use]
    pub const fn threshold(&self) -> StockThreshold {
        self.threshold
    }

    /// Inventory mapping in use, detecting it first if it is still unknown.
    ///
    /// Only a successful detection is kept.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`] if the catalog scan fails.
    pub async fn mapping(&self) -> Result<Option<InventoryMapping>> {
        if let Some(mapping) = self.mapping.read().await.as_ref() {
            return Ok(Some(mapping.clone()));
        }

        let detected = StockLedger::detect_mapping(&self.pool).await?;
        if let Some(mapping) = &detected {
            let mut slot = self.mapping.write().await;
            if slot.is_none() {
                *slot = Some(mapping.clone());
            }
        }
        Ok(detected)
    }

    /// Start an installation if the franchise has enough stock.
    ///
    /// The inventory row stays locked until the installation row is committed, so
    /// two concurrent starts for one franchise are decided one after the other.
    /// Stock is not reserved: it is deducted only by [`complete`](Self::complete).
    ///
    /// # Errors
    ///
    /// - [`CoreError::MissingFranchiseeId`] if `franchisee_id` is blank
    /// - [`CoreError::InventoryMappingNotFound`] if no inventory table is known
    /// - [`CoreError::InventoryRowNotFound`] if the franchise has no stock row
    /// - [`CoreError::StockBelowThreshold`] if available stock is below the threshold
    /// - [`CoreError::Database`] on storage failure
    #[tracing::instrument(skip(self), name = "installation_start")]
    pub async fn start(&self, franchisee_id: &str) -> Result<StartedInstallation> {
        let franchisee_id = normalize_franchisee_id(franchisee_id)?;
        let mapping = self
            .mapping()
            .await?
            .ok_or(CoreError::InventoryMappingNotFound)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        let result = self.start_locked(&mut tx, &mapping, franchisee_id).await;
        let result = settle(tx, result).await;

        match &result {
            Ok(started) => {
                metrics::counter!("installations.started").increment(1);
                tracing::info!(
                    installation_id = %started.installation_id,
                    snapshot_quantity = started.snapshot_quantity,
                    "Installation started"
                );
            }
            Err(err) => {
                if matches!(err.kind(), ErrorKind::Conflict | ErrorKind::NotFound) {
                    metrics::counter!("installations.rejected", "reason" => err.code())
                        .increment(1);
                }
                tracing::warn!(error = %err, code = err.code(), "Installation start rejected");
            }
        }
        result
    }

    async fn start_locked(
        &self,
        conn: &mut PgConnection,
        mapping: &InventoryMapping,
        franchisee_id: &str,
    ) -> Result<StartedInstallation> {
        let available = StockLedger::locked_read(conn, mapping, franchisee_id)
            .await?
            .ok_or_else(|| CoreError::InventoryRowNotFound {
                franchisee_id: franchisee_id.to_string(),
            })?;
        self.threshold.check(available)?;

        let now = self.clock.now();
        let candidate = CandidateRow::new()
            .with("franchisee_id", franchisee_id)
            .with("snapshot_quantity", available)
            .with("threshold_quantity", self.threshold.quantity())
            .with("allowed_to_proceed", true)
            .with("status", InstallationStatus::Started.as_str())
            .with("created_at", now)
            .with("updated_at", now);
        let row = self
            .gateway
            .write_row(conn, INSTALLATIONS_TABLE, &candidate)
            .await?;
        let id: i64 = row
            .try_get("id")
            .map_err(db_err("Inserted installation has no id"))?;

        Ok(StartedInstallation {
            installation_id: InstallationId::new(id),
            snapshot_quantity: available,
            checked_at: now,
            threshold_quantity: self.threshold.quantity(),
        })
    }

    /// Complete a started installation and deduct `used_quantity` from current
    /// stock.
    ///
    /// Stock is re-validated at completion: the snapshot taken by `start` is never
    /// trusted, so a deduction that current stock cannot cover is rejected and the
    /// installation stays `Started`.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidInput`] unless `used_quantity` is finite and positive
    /// - [`CoreError::InstallationNotFound`] if the id is unknown
    /// - [`CoreError::AlreadyFinalized`] if the installation is not `Started`
    /// - [`CoreError::NotAllowedToProceed`] if it was created without permission
    /// - [`CoreError::InventoryMappingNotFound`] if no inventory table is known
    /// - [`CoreError::InsufficientStockForDeduction`] if current stock is too low
    /// - [`CoreError::Database`] on storage failure
    #[tracing::instrument(skip(self), name = "installation_complete")]
    pub async fn complete(
        &self,
        installation_id: InstallationId,
        used_quantity: f64,
    ) -> Result<CompletedInstallation> {
        let used_quantity = validate_used_quantity(used_quantity)?;
        let mapping = self.mapping().await?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(db_err("Failed to begin transaction"))?;
        let result = self
            .complete_locked(&mut tx, mapping.as_ref(), installation_id, used_quantity)
            .await;
        let result = settle(tx, result).await;

        match &result {
            Ok(completed) => {
                metrics::counter!("installations.completed").increment(1);
                tracing::info!(
                    used_quantity,
                    available_after = completed.available_after,
                    "Installation completed"
                );
            }
            Err(err) => {
                tracing::warn!(error = %err, code = err.code(), "Installation completion rejected");
            }
        }
        result
    }

    async fn complete_locked(
        &self,
        conn: &mut PgConnection,
        mapping: Option<&InventoryMapping>,
        installation_id: InstallationId,
        used_quantity: f64,
    ) -> Result<CompletedInstallation> {
        let row = sqlx::query("SELECT * FROM installations WHERE id = $1 FOR UPDATE")
            .bind(installation_id.get())
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err("Failed to lock installation"))?
            .ok_or(CoreError::InstallationNotFound(installation_id))?;
        let installation = installation_from_row(&row)?;
        installation.ensure_completable()?;

        let mapping = mapping.ok_or(CoreError::InventoryMappingNotFound)?;
        let available_after = match StockLedger::atomic_deduct(
            conn,
            mapping,
            &installation.franchisee_id,
            used_quantity,
        )
        .await?
        {
            Deduction::Applied { remaining } => remaining,
            Deduction::Rejected => {
                return Err(CoreError::InsufficientStockForDeduction {
                    requested: used_quantity,
                });
            }
        };

        let now = self.clock.now();
        let row = sqlx::query(
            r"
            UPDATE installations
            SET status = $2, used_quantity = $3, completed_at = $4, updated_at = $4
            WHERE id = $1
            RETURNING *
            ",
        )
        .bind(installation_id.get())
        .bind(InstallationStatus::Completed.as_str())
        .bind(used_quantity)
        .bind(now)
        .fetch_one(&mut *conn)
        .await
        .map_err(db_err("Failed to mark installation completed"))?;

        Ok(CompletedInstallation {
            installation: installation_from_row(&row)?,
            available_after,
        })
    }

    /// Cancel a started installation. Stock is not touched.
    ///
    /// A single guarded update, so a concurrent `complete` and `cancel` cannot
    /// both succeed.
    ///
    /// # Errors
    ///
    /// - [`CoreError::NotStartedOrMissing`] if no `Started` installation has this id
    /// - [`CoreError::Database`] on storage failure
    #[tracing::instrument(skip(self), name = "installation_cancel")]
    pub async fn cancel(&self, installation_id: InstallationId) -> Result<Installation> {
        let row = sqlx::query(
            r"
            UPDATE installations
            SET status = $2, updated_at = $3
            WHERE id = $1 AND status = $4
            RETURNING *
            ",
        )
        .bind(installation_id.get())
        .bind(InstallationStatus::Cancelled.as_str())
        .bind(self.clock.now())
        .bind(InstallationStatus::Started.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_err("Failed to cancel installation"))?;

        let Some(row) = row else {
            tracing::warn!("Cancel found no started installation");
            return Err(CoreError::NotStartedOrMissing(installation_id));
        };

        metrics::counter!("installations.cancelled").increment(1);
        tracing::info!("Installation cancelled");
        installation_from_row(&row)
    }

    /// Load one installation.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InstallationNotFound`] if the id is unknown
    /// - [`CoreError::Database`] on storage failure
    pub async fn get(&self, installation_id: InstallationId) -> Result<Installation> {
        let row = sqlx::query("SELECT * FROM installations WHERE id = $1")
            .bind(installation_id.get())
            .fetch_optional(&self.pool)
            .await
            .map_err(db_err("Failed to load installation"))?
            .ok_or(CoreError::InstallationNotFound(installation_id))?;
        installation_from_row(&row)
    }
}

fn installation_from_row(row: &PgRow) -> Result<Installation> {
    let decode = db_err("Malformed installation row");
    let status: String = row.try_get("status").map_err(&decode)?;

    Ok(Installation {
        id: InstallationId::new(row.try_get("id").map_err(&decode)?),
        franchisee_id: row.try_get("franchisee_id").map_err(&decode)?,
        snapshot_quantity: row.try_get("snapshot_quantity").map_err(&decode)?,
        allowed_to_proceed: row.try_get("allowed_to_proceed").map_err(&decode)?,
        status: InstallationStatus::parse(&status)?,
        used_quantity: row.try_get("used_quantity").map_err(&decode)?,
        created_at: row.try_get("created_at").map_err(&decode)?,
        completed_at: row.try_get("completed_at").map_err(&decode)?,
        updated_at: row.try_get("updated_at").map_err(&decode)?,
    })
}
