//! Installation lifecycle endpoints.
//!
//! ```text
//! POST /api/installations/start     {franchiseeId}                 → 201
//! POST /api/installations/complete  {installationId, usedQuantity} → 200
//! POST /api/installations/cancel    {installationId}               → 200
//! GET  /api/installations/:id                                      → 200
//! ```

use crate::error::AppError;
use crate::state::AppState;
use axum::{
    Json,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
};
use serde::{Deserialize, Serialize};
use stockgate_core::{CompletedInstallation, Installation, InstallationId, StartedInstallation};

/// A franchisee id sent either as a string or a bare number.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum FranchiseeIdInput {
    /// `"MAXTT-DEMO-001"`
    Text(String),
    /// `42`
    Number(serde_json::Number),
}

impl FranchiseeIdInput {
    fn into_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Number(n) => n.to_string(),
        }
    }
}

/// Body of `POST /api/installations/start`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartInstallationRequest {
    /// Franchise whose stock gates the installation
    #[serde(default)]
    pub franchisee_id: Option<FranchiseeIdInput>,
}

/// Body of `POST /api/installations/complete`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteInstallationRequest {
    /// Installation to complete
    #[serde(default)]
    pub installation_id: Option<i64>,
    /// Litres consumed
    #[serde(default)]
    pub used_quantity: Option<f64>,
}

/// Body of `POST /api/installations/cancel`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelInstallationRequest {
    /// Installation to cancel
    #[serde(default)]
    pub installation_id: Option<i64>,
}

/// Response wrapping a single installation.
#[derive(Debug, Serialize)]
pub struct InstallationResponse {
    /// The installation
    pub installation: Installation,
}

fn required<T>(value: Option<T>, field: &str) -> Result<T, AppError> {
    value.ok_or_else(|| AppError::invalid_input(format!("{field} is required")))
}

/// Start an installation if the franchise has enough stock.
///
/// # Errors
///
/// `400 missing_franchisee_id`, `404 inventory_row_not_found`,
/// `409 stock_below_threshold`, `500 inventory_mapping_not_found`.
pub async fn start_installation(
    State(state): State<AppState>,
    payload: Result<Json<StartInstallationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<StartedInstallation>), AppError> {
    let Json(request) = payload?;
    let franchisee_id = request
        .franchisee_id
        .map(FranchiseeIdInput::into_string)
        .unwrap_or_default();

    let started = state.installations.start(&franchisee_id).await?;
    Ok((StatusCode::CREATED, Json(started)))
}

/// Complete an installation, deducting the used quantity from current stock.
///
/// # Errors
///
/// `400 invalid_input`, `404 installation_not_found`,
/// `409 already_finalized | not_allowed_to_proceed | insufficient_stock_for_deduction`.
pub async fn complete_installation(
    State(state): State<AppState>,
    payload: Result<Json<CompleteInstallationRequest>, JsonRejection>,
) -> Result<Json<CompletedInstallation>, AppError> {
    let Json(request) = payload?;
    let installation_id = required(request.installation_id, "installationId")?;
    let used_quantity = required(request.used_quantity, "usedQuantity")?;

    let completed = state
        .installations
        .complete(InstallationId::new(installation_id), used_quantity)
        .await?;
    Ok(Json(completed))
}

/// Cancel a started installation.
///
/// # Errors
///
/// `400 invalid_input`, `409 not_started_or_missing`.
pub async fn cancel_installation(
    State(state): State<AppState>,
    payload: Result<Json<CancelInstallationRequest>, JsonRejection>,
) -> Result<Json<InstallationResponse>, AppError> {
    let Json(request) = payload?;
    let installation_id = required(request.installation_id, "installationId")?;

    let installation = state
        .installations
        .cancel(InstallationId::new(installation_id))
        .await?;
    Ok(Json(InstallationResponse { installation }))
}

/// Fetch one installation.
///
/// # Errors
///
/// `400 invalid_input` for a non-numeric id, `404 installation_not_found`.
pub async fn get_installation(
    State(state): State<AppState>,
    id: Result<Path<i64>, axum::extract::rejection::PathRejection>,
) -> Result<Json<InstallationResponse>, AppError> {
    let Path(id) = id.map_err(|r| AppError::invalid_input(r.body_text()))?;
    let installation = state.installations.get(InstallationId::new(id)).await?;
    Ok(Json(InstallationResponse { installation }))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)] // Test code can use unwrap
mod tests {
    use super::*;

    #[test]
    fn franchisee_id_accepts_strings_and_numbers() {
        let text: StartInstallationRequest =
            serde_json::from_str(r#"{"franchiseeId":"MAXTT-DEMO-001"}"#).unwrap();
        assert_eq!(
            text.franchisee_id.unwrap().into_string(),
            "MAXTT-DEMO-001"
        );

        let number: StartInstallationRequest =
            serde_json::from_str(r#"{"franchiseeId":42}"#).unwrap();
        assert_eq!(number.franchisee_id.unwrap().into_string(), "42");

        let missing: StartInstallationRequest = serde_json::from_str("{}").unwrap();
        assert!(missing.franchisee_id.is_none());

        let null: StartInstallationRequest =
            serde_json::from_str(r#"{"franchiseeId":null}"#).unwrap();
        assert!(null.franchisee_id.is_none());
    }

    #[test]
    fn required_names_the_field() {
        let err = required::<i64>(None, "installationId").unwrap_err();
        assert_eq!(err.code(), "invalid_input");
        assert_eq!(err.to_string(), "[invalid_input] installationId is required");
    }
}
