//! Invoices as far as numbering is concerned.
//!
//! Pricing and customer fields belong to external collaborators and travel through
//! [`InvoiceDraft::fields`] untouched; the allocator only owns the franchise code
//! and the two generated identifiers.

use crate::error::{CoreError, Result};
use crate::schema::CandidateRow;
use serde::{Deserialize, Serialize};

/// Columns the allocator always writes. [`InvoiceDraft::pass_through_fields`]
/// strips them from drafts.
pub const RESERVED_COLUMNS: &[&str] = &[
    "franchisee_code",
    "invoice_number",
    "customer_code",
    "created_at",
];

/// An invoice to be numbered and inserted.
#[derive(Debug, Clone, PartialEq)]
pub struct InvoiceDraft {
    /// Franchise the invoice is issued under; also the sequence key
    pub franchisee_code: String,
    /// Pass-through fields (pricing, customer details)
    pub fields: CandidateRow,
}

impl InvoiceDraft {
    /// Draft with no extra fields.
    #[must_use]
    pub fn new(franchisee_code: impl Into<String>) -> Self {
        Self {
            franchisee_code: franchisee_code.into(),
            fields: CandidateRow::new(),
        }
    }

    /// Attach pass-through fields.
    #[must_use]
    pub fn with_fields(mut self, fields: CandidateRow) -> Self {
        self.fields = fields;
        self
    }

    /// Draft fields minus [`RESERVED_COLUMNS`] (matched case-insensitively).
    #[must_use]
    pub fn pass_through_fields(&self) -> CandidateRow {
        let mut fields = self.fields.clone();
        fields.retain(|column| {
            !RESERVED_COLUMNS
                .iter()
                .any(|reserved| column.eq_ignore_ascii_case(reserved))
        });
        fields
    }

    /// Check the franchise code can be embedded in document numbers.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidInput`] if the code is blank, has surrounding
    /// whitespace, or contains `/` (the invoice number separator).
    pub fn validate(&self) -> Result<()> {
        let code = &self.franchisee_code;
        if code.trim().is_empty() {
            return Err(CoreError::InvalidInput("franchiseeCode is required".into()));
        }
        if code.trim() != code || code.contains('/') || code.chars().any(char::is_control) {
            return Err(CoreError::InvalidInput(format!(
                "franchiseeCode {code:?} cannot be used in document numbers"
            )));
        }
        Ok(())
    }
}

/// A numbered, committed invoice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    /// Row id, when the table has one
    pub id: Option<i64>,
    /// Issuing franchise
    pub franchisee_code: String,
    /// `{code}/{seq:04}/{MMYY}`
    pub invoice_number: String,
    /// `{code}-{seq:04}`
    pub customer_code: String,
    /// Sequence both identifiers share
    pub sequence: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_franchise_codes_with_dashes() {
        assert!(InvoiceDraft::new("MAXTT-DEMO-001").validate().is_ok());
    }

    #[test]
    fn pass_through_fields_drop_reserved_columns() {
        let draft = InvoiceDraft::new("MAXTT-DEMO-001").with_fields(
            CandidateRow::new()
                .with("customer_name", "Ada")
                .with("invoice_number", "SPOOFED/0001/0101")
                .with("Customer_Code", "SPOOFED-0001")
                .with("created_at", "yesterday"),
        );

        let fields = draft.pass_through_fields();
        assert_eq!(fields.len(), 1);
        assert!(fields.get("customer_name").is_some());
        assert_eq!(draft.fields.len(), 4);
    }

    #[test]
    fn rejects_unusable_codes() {
        for code in ["", "   ", " MAXTT", "A/B", "A\nB"] {
            assert!(
                matches!(
                    InvoiceDraft::new(code).validate(),
                    Err(CoreError::InvalidInput(_))
                ),
                "{code:?} should be rejected"
            );
        }
    }
}
