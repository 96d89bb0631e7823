//! Inventory table recognition.
//!
//! The table holding per-franchise stock is provisioned outside this system and its
//! name and column names differ between environments. [`select_mapping`] picks the
//! most plausible `(table, franchise column, stock column)` triple from catalog
//! metadata:
//!
//! - a table qualifies when it has one column from [`FRANCHISEE_COLUMN_CANDIDATES`]
//!   and one from [`STOCK_COLUMN_CANDIDATES`]
//! - score = 1, +2 if the table name contains `inventory`, +1 if it contains `stock`
//! - highest score wins; ties go to the alphabetically first table name
//!
//! Detection runs once at startup and the result is injected into the services.

use crate::error::Result;
use crate::identifier::Identifier;
use std::collections::BTreeMap;

/// Column names that identify a franchise, most preferred first.
pub const FRANCHISEE_COLUMN_CANDIDATES: &[&str] = &[
    "franchisee_id",
    "franchise_id",
    "franchisee_code",
    "franchise_code",
];

/// Column names that hold the available quantity, most preferred first.
pub const STOCK_COLUMN_CANDIDATES: &[&str] = &[
    "available_litres",
    "available_quantity",
    "available_stock",
    "stock_litres",
    "quantity_litres",
    "available",
    "quantity",
    "stock",
];

/// Where per-franchise stock lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryMapping {
    /// Inventory table
    pub table: Identifier,
    /// Column holding the franchise identifier
    pub franchisee_column: Identifier,
    /// Column holding the available quantity
    pub stock_column: Identifier,
}

impl InventoryMapping {
    /// Build a mapping from raw names, validating each one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidIdentifier`](crate::CoreError::InvalidIdentifier)
    /// if any name fails the allowlist.
    pub fn new(table: &str, franchisee_column: &str, stock_column: &str) -> Result<Self> {
        Ok(Self {
            table: Identifier::parse(table)?,
            franchisee_column: Identifier::parse(franchisee_column)?,
            stock_column: Identifier::parse(stock_column)?,
        })
    }
}

/// Outcome of a floor-checked deduction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Deduction {
    /// The guard held; this much stock remains.
    Applied {
        /// Quantity after the deduction
        remaining: f64,
    },
    /// Stock was insufficient (or the row is gone). Nothing changed.
    Rejected,
}

/// Score a candidate table by name.
#[must_use]
pub fn score_table(table: &str) -> u32 {
    let lower = table.to_ascii_lowercase();
    let mut score = 1;
    if lower.contains("inventory") {
        score += 2;
    }
    if lower.contains("stock") {
        score += 1;
    }
    score
}

fn candidate_rank(candidates: &[&str], column: &str) -> Option<usize> {
    let lower = column.to_ascii_lowercase();
    candidates.iter().position(|c| *c == lower)
}

#[derive(Default)]
struct TableColumns {
    franchisee: Option<(usize, String)>,
    stock: Option<(usize, String)>,
}

impl TableColumns {
    fn offer(&mut self, column: &str) {
        if let Some(rank) = candidate_rank(FRANCHISEE_COLUMN_CANDIDATES, column) {
            if self.franchisee.as_ref().is_none_or(|(best, _)| rank < *best) {
                self.franchisee = Some((rank, column.to_string()));
            }
        }
        if let Some(rank) = candidate_rank(STOCK_COLUMN_CANDIDATES, column) {
            if self.stock.as_ref().is_none_or(|(best, _)| rank < *best) {
                self.stock = Some((rank, column.to_string()));
            }
        }
    }
}

/// Choose the inventory mapping from `(table, column)` catalog pairs.
///
/// Names that fail the identifier allowlist are ignored. Returns `None` if no table
/// has both a franchise column and a stock column.
#[must_use]
pub fn select_mapping<I, T, C>(columns: I) -> Option<InventoryMapping>
where
    I: IntoIterator<Item = (T, C)>,
    T: AsRef<str>,
    C: AsRef<str>,
{
    let mut tables: BTreeMap<String, TableColumns> = BTreeMap::new();
    for (table, column) in columns {
        tables
            .entry(table.as_ref().to_string())
            .or_default()
            .offer(column.as_ref());
    }

    let mut best: Option<(u32, InventoryMapping)> = None;
    for (table, cols) in tables {
        let (Some((_, franchisee)), Some((_, stock))) = (cols.franchisee, cols.stock) else {
            continue;
        };
        let Ok(mapping) = InventoryMapping::new(&table, &franchisee, &stock) else {
            continue;
        };
        let score = score_table(&table);
        // BTreeMap iterates in name order, so strict `>` keeps the first name on ties.
        if best.as_ref().is_none_or(|(top, _)| score > *top) {
            best = Some((score, mapping));
        }
    }
    best.map(|(_, mapping)| mapping)
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;

    #[test]
    fn scores_by_name() {
        assert_eq!(score_table("franchisees"), 1);
        assert_eq!(score_table("stock_levels"), 2);
        assert_eq!(score_table("franchise_inventory"), 3);
        assert_eq!(score_table("Inventory_Stock"), 4);
    }

    #[test]
    fn picks_highest_scoring_table() {
        let mapping = select_mapping([
            ("franchisees", "franchisee_id"),
            ("franchisees", "quantity"),
            ("franchise_inventory", "franchisee_id"),
            ("franchise_inventory", "available_litres"),
            ("orders", "franchisee_id"),
        ])
        .expect("mapping");
        assert_eq!(mapping.table.as_str(), "franchise_inventory");
        assert_eq!(mapping.franchisee_column.as_str(), "franchisee_id");
        assert_eq!(mapping.stock_column.as_str(), "available_litres");
    }

    #[test]
    fn requires_both_columns() {
        assert!(select_mapping([
            ("inventory", "franchisee_id"),
            ("stock", "quantity"),
        ])
        .is_none());
    }

    #[test]
    fn prefers_earlier_candidate_columns() {
        let mapping = select_mapping([
            ("inventory", "franchise_code"),
            ("inventory", "quantity"),
            ("inventory", "franchisee_id"),
            ("inventory", "available_litres"),
        ])
        .expect("mapping");
        assert_eq!(mapping.franchisee_column.as_str(), "franchisee_id");
        assert_eq!(mapping.stock_column.as_str(), "available_litres");
    }

    #[test]
    fn ties_break_on_table_name() {
        let mapping = select_mapping([
            ("zeta_inventory", "franchisee_id"),
            ("zeta_inventory", "stock"),
            ("alpha_inventory", "franchise_id"),
            ("alpha_inventory", "quantity"),
        ])
        .expect("mapping");
        assert_eq!(mapping.table.as_str(), "alpha_inventory");
    }

    #[test]
    fn matches_column_names_case_insensitively_but_keeps_catalog_spelling() {
        let mapping = select_mapping([
            ("Inventory", "Franchisee_Id"),
            ("Inventory", "Available_Litres"),
        ])
        .expect("mapping");
        assert_eq!(mapping.franchisee_column.as_str(), "Franchisee_Id");
        assert_eq!(mapping.stock_column.quoted(), "\"Available_Litres\"");
    }

    #[test]
    fn skips_tables_with_unsafe_names() {
        let mapping = select_mapping([
            ("inventory stock", "franchisee_id"),
            ("inventory stock", "stock"),
            ("stock", "franchisee_id"),
            ("stock", "stock"),
        ])
        .expect("mapping");
        assert_eq!(mapping.table.as_str(), "stock");
    }
}
