//! Application state shared by all handlers.

use sqlx::PgPool;
use stockgate_postgres::{InstallationService, InvoiceAllocator};

/// Services behind the HTTP API.
///
/// Cloned per request by axum; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    /// Pool used for readiness checks
    pub pool: PgPool,
    /// Installation lifecycle
    pub installations: InstallationService,
    /// Invoice numbering
    pub invoices: InvoiceAllocator,
}

impl AppState {
    /// Bundle the services.
    #[must_use]
    pub const fn new(
        pool: PgPool,
        installations: InstallationService,
        invoices: InvoiceAllocator,
    ) -> Self {
        Self {
            pool,
            installations,
            invoices,
        }
    }
}
