//! Stock reservation ledger.
//!
//! Reads and deducts per-franchise stock in a table whose name and columns are
//! discovered at runtime (see [`stockgate_core::inventory`]). Every statement here
//! is assembled from an [`InventoryMapping`], whose names already passed the
//! identifier allowlist, and binds all values as parameters.
//!
//! Franchise ids are compared as text (`"col"::text = $1`) so the ledger works
//! whether the external table stores them as text or integers. Quantities are
//! read and deducted as `float8`, so detection only accepts stock columns that
//! hold fractions (`double precision`, `real`, `numeric`). A configured mapping
//! onto an integer column rounds every deduction on assignment.

use crate::error::db_err;
use sqlx::{PgConnection, PgPool};
use stockgate_core::inventory::{
    select_mapping, FRANCHISEE_COLUMN_CANDIDATES, STOCK_COLUMN_CANDIDATES,
};
use stockgate_core::{Deduction, InventoryMapping, Result};

/// Locked reads and floor-checked deductions against the inventory table.
pub struct StockLedger;

impl StockLedger {
    /// Find the inventory table by scanning the column catalog.
    ///
    /// Only base tables visible on the search path are considered, and only
    /// fractional stock columns. Returns `Ok(None)` if no table has both a
    /// franchise column and a stock column.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`](stockgate_core::CoreError::Database) if the
    /// catalog query fails.
    pub async fn detect_mapping(pool: &PgPool) -> Result<Option<InventoryMapping>> {
        let franchisee: Vec<String> = FRANCHISEE_COLUMN_CANDIDATES
            .iter()
            .map(ToString::to_string)
            .collect();
        let stock: Vec<String> = STOCK_COLUMN_CANDIDATES
            .iter()
            .map(ToString::to_string)
            .collect();

        let columns: Vec<(String, String)> = sqlx::query_as(
            r"
            SELECT c.table_name::text, c.column_name::text
            FROM information_schema.columns c
            JOIN information_schema.tables t
              ON t.table_schema = c.table_schema
             AND t.table_name = c.table_name
            WHERE t.table_type = 'BASE TABLE'
              AND c.table_schema = ANY(current_schemas(false))
              AND (
                lower(c.column_name::text) = ANY($1)
                OR (
                  lower(c.column_name::text) = ANY($2)
                  AND c.data_type::text IN ('double precision', 'real', 'numeric')
                )
              )
            ORDER BY c.table_name, c.ordinal_position
            ",
        )
        .bind(&franchisee)
        .bind(&stock)
        .fetch_all(pool)
        .await
        .map_err(db_err("Failed to scan column catalog"))?;

        let mapping = select_mapping(columns);
        match &mapping {
            Some(m) => tracing::info!(
                table = %m.table,
                franchisee_column = %m.franchisee_column,
                stock_column = %m.stock_column,
                "Inventory mapping detected"
            ),
            None => tracing::warn!("No inventory mapping could be detected"),
        }
        Ok(mapping)
    }

    /// Read the franchise's available quantity and lock its row until the
    /// enclosing transaction ends.
    ///
    /// Returns `Ok(None)` if the franchise has no row. A `NULL` quantity reads
    /// as zero.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`](stockgate_core::CoreError::Database) if the
    /// query fails.
    pub async fn locked_read(
        conn: &mut PgConnection,
        mapping: &InventoryMapping,
        franchisee_id: &str,
    ) -> Result<Option<f64>> {
        let sql = format!(
            "SELECT COALESCE({stock}, 0)::float8 FROM {table} WHERE {franchisee}::text = $1 LIMIT 1 FOR UPDATE",
            stock = mapping.stock_column.quoted(),
            table = mapping.table.quoted(),
            franchisee = mapping.franchisee_column.quoted(),
        );

        let row: Option<(f64,)> = sqlx::query_as(&sql)
            .bind(franchisee_id)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err("Failed to lock inventory row"))?;

        Ok(row.map(|(quantity,)| quantity))
    }

    /// Deduct `amount` only if at least that much is available, in one statement.
    ///
    /// The guard lives in the `WHERE` clause, so concurrent deductions can never
    /// drive stock negative regardless of what locks callers hold.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Database`](stockgate_core::CoreError::Database) if the
    /// update fails.
    pub async fn atomic_deduct(
        conn: &mut PgConnection,
        mapping: &InventoryMapping,
        franchisee_id: &str,
        amount: f64,
    ) -> Result<Deduction> {
        let sql = format!(
            "UPDATE {table} SET {stock} = {stock} - $2 \
             WHERE {franchisee}::text = $1 AND {stock} >= $2 \
             RETURNING {stock}::float8",
            table = mapping.table.quoted(),
            stock = mapping.stock_column.quoted(),
            franchisee = mapping.franchisee_column.quoted(),
        );

        let row: Option<(f64,)> = sqlx::query_as(&sql)
            .bind(franchisee_id)
            .bind(amount)
            .fetch_optional(&mut *conn)
            .await
            .map_err(db_err("Failed to deduct stock"))?;

        Ok(match row {
            Some((remaining,)) => {
                tracing::debug!(franchisee_id, amount, remaining, "Stock deducted");
                Deduction::Applied { remaining }
            }
            None => {
                tracing::debug!(franchisee_id, amount, "Stock deduction rejected");
                Deduction::Rejected
            }
        })
    }
}
