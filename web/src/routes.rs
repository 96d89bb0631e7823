//! Router assembly.

use crate::error::not_found_fallback;
use crate::handlers::{health_check, installations, invoices, readiness_check};
use crate::middleware::correlation_id_layer;
use crate::state::AppState;
use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

/// Build the HTTP router.
///
/// ```text
/// GET  /health
/// GET  /ready
/// POST /api/installations/start
/// POST /api/installations/complete
/// POST /api/installations/cancel
/// GET  /api/installations/:id
/// POST /api/invoices
/// ```
///
/// Every request is traced and tagged with a correlation id.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/installations/start",
            post(installations::start_installation),
        )
        .route(
            "/installations/complete",
            post(installations::complete_installation),
        )
        .route(
            "/installations/cancel",
            post(installations::cancel_installation),
        )
        .route("/installations/:id", get(installations::get_installation))
        .route("/invoices", post(invoices::create_invoice));

    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .nest("/api", api_routes)
        .fallback(not_found_fallback)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(correlation_id_layer())
}
