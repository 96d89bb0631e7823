//! Error types for web handlers.
//!
//! [`AppError`] turns a [`CoreError`] into an HTTP response. The status comes from
//! the error's [`ErrorKind`]; the body carries its stable code, a message and any
//! context fields a client needs to act on:
//!
//! ```json
//! {
//!   "code": "stock_below_threshold",
//!   "message": "Available stock 12.5 is below the threshold of 20",
//!   "threshold": 20.0,
//!   "available": 12.5
//! }
//! ```
//!
//! Database details never reach the client; they are logged with the response.

use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use serde_json::{Map, Value, json};
use std::fmt;
use stockgate_core::{CoreError, ErrorKind};

/// Message shown in place of infrastructure details.
const INTERNAL_MESSAGE: &str = "An internal error occurred";

/// Application error type for web handlers.
///
/// # Examples
///
/// ```ignore
/// async fn handler(State(state): State<AppState>) -> Result<Json<Installation>, AppError> {
///     let installation = state.installations.get(id).await?;
///     Ok(Json(installation))
/// }
/// ```
#[derive(Debug)]
pub struct AppError {
    /// HTTP status code
    status: StatusCode,
    /// Machine-readable error code
    code: String,
    /// Error message (user-facing)
    message: String,
    /// Extra fields merged into the response body
    context: Map<String, Value>,
    /// Internal error (for logging, not exposed to client)
    source: Option<anyhow::Error>,
}

impl AppError {
    /// Create a new application error.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            message: message.into(),
            context: Map::new(),
            source: None,
        }
    }

    /// Attach a context field to the response body.
    #[must_use]
    pub fn with_context(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.context.insert(key.to_string(), value.into());
        self
    }

    /// Attach the underlying error, logged but never returned to the client.
    #[must_use]
    pub fn with_source(mut self, source: impl Into<anyhow::Error>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// 400 with code `invalid_input`.
    #[must_use]
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "invalid_input", message)
    }

    /// 500 with code `internal_error`.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "internal_error", message)
    }

    /// HTTP status of the response.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        self.status
    }

    /// Machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &str {
        &self.code
    }
}

const fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::Infrastructure => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let status = status_for(err.kind());
        let code = err.code();

        match err {
            CoreError::Database(_) | CoreError::SerializationFailure(_) => {
                Self::new(status, code, INTERNAL_MESSAGE).with_source(err)
            }
            CoreError::StockBelowThreshold {
                threshold,
                available,
            } => Self::new(status, code, err.to_string())
                .with_context("threshold", threshold)
                .with_context("available", available),
            CoreError::AlreadyFinalized { status: current } => {
                Self::new(status, code, err.to_string()).with_context("status", current.as_str())
            }
            CoreError::InsufficientStockForDeduction { requested } => {
                Self::new(status, code, err.to_string()).with_context("requested", requested)
            }
            CoreError::InventoryRowNotFound { ref franchisee_id } => {
                let franchisee_id = franchisee_id.clone();
                Self::new(status, code, err.to_string())
                    .with_context("franchiseeId", franchisee_id)
            }
            CoreError::InstallationNotFound(id) | CoreError::NotStartedOrMissing(id) => {
                Self::new(status, code, err.to_string()).with_context("installationId", id.get())
            }
            CoreError::SequenceRetriesExhausted { attempts, .. } => {
                Self::new(status, code, err.to_string()).with_context("attempts", attempts)
            }
            other => Self::new(status, code, other.to_string()),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::invalid_input(rejection.body_text())
    }
}

/// Convert `anyhow::Error` to `AppError`.
impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(INTERNAL_MESSAGE).with_source(err)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for AppError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Error response body (JSON).
#[derive(Debug, Serialize)]
struct ErrorResponse {
    code: String,
    message: String,
    #[serde(flatten)]
    context: Map<String, Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            match &self.source {
                Some(source) => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    error = %source,
                    "Request failed"
                ),
                None => tracing::error!(
                    status = %self.status,
                    code = %self.code,
                    message = %self.message,
                    "Request failed"
                ),
            }
        } else if let Some(source) = &self.source {
            tracing::warn!(status = %self.status, code = %self.code, error = %source, "Request rejected");
        }

        let body = ErrorResponse {
            code: self.code,
            message: self.message,
            context: self.context,
        };

        (self.status, Json(body)).into_response()
    }
}

/// Body for routes the router does not know.
#[allow(clippy::unused_async)]
pub async fn not_found_fallback() -> (StatusCode, Json<Value>) {
    (
        StatusCode::NOT_FOUND,
        Json(json!({ "code": "route_not_found", "message": "No such route" })),
    )
}
