//! Candidate rows for the schema-adaptive gateway.
//!
//! Callers describe the row they would *like* to write as a [`CandidateRow`]. The
//! gateway then keeps only populated fields whose names exist in the target table
//! ([`CandidateRow::project`]), so a column that is missing in one environment is
//! silently skipped instead of failing the insert.

use crate::error::{CoreError, Result};
use crate::identifier::Identifier;
use chrono::{DateTime, Utc};
use std::collections::{BTreeMap, HashSet};

/// A value to be bound into an insert.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValue {
    /// Absent; never written
    Null,
    /// Boolean
    Bool(bool),
    /// 64-bit integer
    Int(i64),
    /// Double precision
    Float(f64),
    /// Text
    Text(String),
    /// Timestamp with time zone
    Timestamp(DateTime<Utc>),
    /// Arbitrary JSON (arrays and objects)
    Json(serde_json::Value),
}

impl ColumnValue {
    /// Whether the value should be written at all.
    #[must_use]
    pub const fn is_populated(&self) -> bool {
        !matches!(self, Self::Null)
    }

    /// Convert a JSON value received from a caller.
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        use serde_json::Value;
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(b),
            Value::Number(n) => n
                .as_i64()
                .map(Self::Int)
                .or_else(|| n.as_f64().map(Self::Float))
                .unwrap_or(Self::Null),
            Value::String(s) => Self::Text(s),
            other @ (Value::Array(_) | Value::Object(_)) => Self::Json(other),
        }
    }
}

impl From<bool> for ColumnValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for ColumnValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<f64> for ColumnValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for ColumnValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for ColumnValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for ColumnValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl<T: Into<Self>> From<Option<T>> for ColumnValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(Self::Null, Into::into)
    }
}

/// Fields a caller would like to write, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateRow {
    fields: BTreeMap<String, ColumnValue>,
}

impl CandidateRow {
    /// Empty row.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style [`set`](Self::set).
    #[must_use]
    pub fn with(mut self, column: impl Into<String>, value: impl Into<ColumnValue>) -> Self {
        self.set(column, value);
        self
    }

    /// Set (or replace) a field.
    pub fn set(&mut self, column: impl Into<String>, value: impl Into<ColumnValue>) {
        self.fields.insert(column.into(), value.into());
    }

    /// Keep only the fields whose column name satisfies `keep`.
    pub fn retain(&mut self, mut keep: impl FnMut(&str) -> bool) {
        self.fields.retain(|column, _| keep(column));
    }

    /// Look up a field.
    #[must_use]
    pub fn get(&self, column: &str) -> Option<&ColumnValue> {
        self.fields.get(column)
    }

    /// Number of fields, populated or not.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the row has no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Keep populated fields whose names are in `existing`, validating every kept
    /// name against the identifier allowlist.
    ///
    /// Output is ordered by column name.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidIdentifier`] if a kept name fails the allowlist
    /// - [`CoreError::NoMatchingColumns`] if nothing is left to write
    pub fn project(
        &self,
        table: &Identifier,
        existing: &HashSet<String>,
    ) -> Result<Vec<(Identifier, &ColumnValue)>> {
        let kept = self
            .fields
            .iter()
            .filter(|(name, value)| value.is_populated() && existing.contains(name.as_str()))
            .map(|(name, value)| Ok((Identifier::parse(name)?, value)))
            .collect::<Result<Vec<_>>>()?;

        if kept.is_empty() {
            return Err(CoreError::NoMatchingColumns {
                table: table.to_string(),
            });
        }
        Ok(kept)
    }
}

impl FromIterator<(String, ColumnValue)> for CandidateRow {
    fn from_iter<I: IntoIterator<Item = (String, ColumnValue)>>(iter: I) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)] // Test code can use unwrap/expect
mod tests {
    use super::*;
    use serde_json::json;

    fn columns(names: &[&str]) -> HashSet<String> {
        names.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn drops_missing_and_null_fields() {
        let table = Identifier::parse("installations").unwrap();
        let row = CandidateRow::new()
            .with("franchisee_id", "MAXTT-DEMO-001")
            .with("snapshot_quantity", 25.0)
            .with("threshold_quantity", 20.0)
            .with("used_quantity", None::<f64>);

        let kept = row
            .project(
                &table,
                &columns(&["id", "franchisee_id", "snapshot_quantity", "used_quantity"]),
            )
            .unwrap();

        let names: Vec<&str> = kept.iter().map(|(c, _)| c.as_str()).collect();
        assert_eq!(names, vec!["franchisee_id", "snapshot_quantity"]);
    }

    #[test]
    fn nothing_left_is_an_error() {
        let table = Identifier::parse("invoices").unwrap();
        let row = CandidateRow::new().with("nonexistent", 1_i64);
        assert_eq!(
            row.project(&table, &columns(&["id"])),
            Err(CoreError::NoMatchingColumns {
                table: "invoices".into()
            })
        );
    }

    #[test]
    fn catalog_names_are_still_allowlisted() {
        let table = Identifier::parse("invoices").unwrap();
        let row = CandidateRow::new().with("bad name", "x");
        assert_eq!(
            row.project(&table, &columns(&["bad name"])),
            Err(CoreError::InvalidIdentifier("bad name".into()))
        );
    }

    #[test]
    fn converts_json_values() {
        assert_eq!(ColumnValue::from_json(json!(null)), ColumnValue::Null);
        assert_eq!(ColumnValue::from_json(json!(3)), ColumnValue::Int(3));
        assert_eq!(ColumnValue::from_json(json!(1.5)), ColumnValue::Float(1.5));
        assert_eq!(
            ColumnValue::from_json(json!("Jane")),
            ColumnValue::Text("Jane".into())
        );
        assert_eq!(
            ColumnValue::from_json(json!({"a": 1})),
            ColumnValue::Json(json!({"a": 1}))
        );
    }
}
