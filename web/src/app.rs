//! Startup wiring: pool, migrations, schema cache, inventory mapping, services.

use crate::config::{Config, DatabaseConfig};
use crate::state::AppState;
use anyhow::Context;
use metrics::describe_counter;
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use stockgate_postgres::{
    INSTALLATIONS_TABLE, INVOICES_TABLE, InstallationService, InvoiceAllocator, SchemaGateway,
    StockLedger,
};

/// Open the connection pool.
///
/// Every connection gets `statement_timeout` and `lock_timeout` from the
/// configuration, which bound how long a request can wait on a row or advisory
/// lock.
///
/// # Errors
///
/// Returns an error if the database cannot be reached.
pub async fn connect(config: &DatabaseConfig) -> anyhow::Result<PgPool> {
    let statement_timeout = format!("{}s", config.statement_timeout);
    let lock_timeout = format!("{}s", config.lock_timeout);

    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .min_connections(config.min_connections)
        .acquire_timeout(config.connect_timeout())
        .after_connect(move |conn, _meta| {
            let statement_timeout = statement_timeout.clone();
            let lock_timeout = lock_timeout.clone();
            Box::pin(async move {
                sqlx::query("SELECT set_config('statement_timeout', $1, false), set_config('lock_timeout', $2, false)")
                    .bind(statement_timeout)
                    .bind(lock_timeout)
                    .execute(&mut *conn)
                    .await?;
                Ok(())
            })
        })
        .connect(&config.url)
        .await
        .context("Failed to connect to PostgreSQL")
}

/// Register descriptions for the counters the services emit.
pub fn describe_metrics() {
    describe_counter!("installations.started", "Installations started");
    describe_counter!(
        "installations.rejected",
        "Installation starts rejected, by reason"
    );
    describe_counter!("installations.completed", "Installations completed");
    describe_counter!("installations.cancelled", "Installations cancelled");
    describe_counter!("invoices.created", "Invoices numbered and inserted");
    describe_counter!(
        "invoices.sequence_retries",
        "Sequence allocation retries, by cause"
    );
}

/// Build the services over `pool`.
///
/// Runs migrations (unless disabled), preloads the schema cache, and resolves
/// the inventory mapping from configuration or by catalog detection. A missing
/// mapping is not fatal: the server starts and installation requests fail with
/// `inventory_mapping_not_found`.
///
/// # Errors
///
/// Returns an error if a migration, the schema preload or mapping detection fails.
pub async fn build_state(pool: PgPool, config: &Config) -> anyhow::Result<AppState> {
    if config.database.run_migrations {
        stockgate_postgres::migrate(&pool)
            .await
            .context("Failed to run migrations")?;
        tracing::info!("Migrations applied");
    }

    let gateway = Arc::new(SchemaGateway::new(pool.clone()));
    gateway
        .preload(&[INSTALLATIONS_TABLE, INVOICES_TABLE])
        .await
        .context("Failed to preload schema cache")?;

    let mapping = match &config.stock.inventory {
        Some(mapping) => {
            tracing::info!(table = %mapping.table, "Using configured inventory mapping");
            Some(mapping.clone())
        }
        None => StockLedger::detect_mapping(&pool)
            .await
            .context("Failed to detect inventory mapping")?,
    };
    if mapping.is_none() {
        tracing::warn!("Installations are disabled until an inventory table is available");
    }

    let installations = InstallationService::new(pool.clone(), Arc::clone(&gateway), mapping)
        .with_threshold(config.stock.threshold);
    let invoices = InvoiceAllocator::new(pool.clone(), gateway)
        .with_max_attempts(config.stock.sequence_max_attempts)
        .with_isolation(config.stock.sequence_isolation);

    Ok(AppState::new(pool, installations, invoices))
}
