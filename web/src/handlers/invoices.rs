//! Invoice creation endpoint.

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use stockgate_core::{CandidateRow, ColumnValue, Invoice, InvoiceDraft};

/// Body of `POST /api/invoices`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateInvoiceRequest {
    /// Issuing franchise; also the sequence key
    #[serde(default)]
    pub franchisee_code: Option<String>,
    /// Pricing and customer columns, written when the invoices table has them
    #[serde(default)]
    pub fields: Map<String, Value>,
}

/// Response of `POST /api/invoices`.
#[derive(Debug, Serialize)]
pub struct InvoiceResponse {
    /// The committed invoice
    pub invoice: Invoice,
}

impl CreateInvoiceRequest {
    fn into_draft(self) -> InvoiceDraft {
        let fields: CandidateRow = self
            .fields
            .into_iter()
            .map(|(column, value)| (column, ColumnValue::from_json(value)))
            .collect();
        InvoiceDraft::new(self.franchisee_code.unwrap_or_default()).with_fields(fields)
    }
}

/// Number and insert an invoice.
///
/// # Errors
///
/// `400 invalid_input` for a missing or unusable franchise code; `500` when
/// allocation exhausts its retries, overflows four digits, or storage fails.
pub async fn create_invoice(
    State(state): State<AppState>,
    payload: Result<Json<CreateInvoiceRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<InvoiceResponse>), AppError> {
    let Json(request) = payload?;
    let invoice = state.invoices.create_invoice(&request.into_draft()).await?;
    Ok((StatusCode::CREATED, Json(InvoiceResponse { invoice })))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn fields_become_candidate_columns() {
        let request: CreateInvoiceRequest = serde_json::from_str(
            r#"{"franchiseeCode":"MAXTT-DEMO-001","fields":{"customer_name":"Ada","total_amount":12.5,"notes":null}}"#,
        )
        .unwrap();
        let draft = request.into_draft();

        assert_eq!(draft.franchisee_code, "MAXTT-DEMO-001");
        assert_eq!(
            draft.fields.get("customer_name"),
            Some(&ColumnValue::Text("Ada".into()))
        );
        assert_eq!(
            draft.fields.get("total_amount"),
            Some(&ColumnValue::Float(12.5))
        );
        assert_eq!(draft.fields.get("notes"), Some(&ColumnValue::Null));
    }

    #[test]
    fn missing_code_fails_validation() {
        let request: CreateInvoiceRequest = serde_json::from_str("{}").unwrap();
        assert!(request.into_draft().validate().is_err());
    }
}
