//! Liveness and readiness endpoints.

use crate::state::AppState;
use axum::{Json, extract::State, http::StatusCode};
use serde::Serialize;

/// Liveness response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Always `ok`
    pub status: &'static str,
    /// Crate version
    pub version: &'static str,
}

/// `GET /health`: the process is up. Dependencies are not checked.
#[allow(clippy::unused_async)]
pub async fn health_check() -> (StatusCode, Json<HealthResponse>) {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "ok",
            version: env!("CARGO_PKG_VERSION"),
        }),
    )
}

/// Readiness response.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadinessResponse {
    /// Whether the service should receive traffic
    pub ready: bool,
    /// Database answered a ping
    pub database: bool,
    /// An inventory mapping is known (installations are enabled)
    pub inventory_mapping: bool,
}

/// `GET /ready`: 200 when the database answers, 503 otherwise.
///
/// `inventoryMapping` is reported only when the database answers; an unknown
/// mapping is detected again here, so it flips to `true` once the table exists.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, Json<ReadinessResponse>) {
    let database = match sqlx::query("SELECT 1").execute(&state.pool).await {
        Ok(_) => true,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            false
        }
    };
    let status = if database {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    let inventory_mapping = database
        && match state.installations.mapping().await {
            Ok(mapping) => mapping.is_some(),
            Err(e) => {
                tracing::warn!(error = %e, "Inventory mapping detection failed");
                false
            }
        };

    (
        status,
        Json(ReadinessResponse {
            ready: database,
            database,
            inventory_mapping,
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_health_check() {
        let (status, Json(body)) = health_check().await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.status, "ok");
    }
}
