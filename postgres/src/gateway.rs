//! Schema-adaptive persistence gateway.
//!
//! Tables written by this system are migrated independently of deployments, so a
//! column present in one environment may be missing in another. The gateway reads
//! `information_schema.columns` once per table, keeps the result, and inserts only
//! the candidate fields that exist.
//!
//! The cache is owned by the gateway value rather than a global: build one at
//! startup, [`preload`](SchemaGateway::preload) it, share it behind an `Arc`, and
//! call [`invalidate`](SchemaGateway::invalidate) after a migration.

use crate::error::db_err;
use sqlx::postgres::PgRow;
use sqlx::query_builder::Separated;
use sqlx::{PgConnection, PgPool, Postgres, QueryBuilder};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use stockgate_core::{CandidateRow, ColumnValue, Identifier, Result};
use tokio::sync::RwLock;

/// Column-aware insert builder with a per-table column cache.
pub struct SchemaGateway {
    pool: PgPool,
    columns: RwLock<HashMap<Identifier, Arc<HashSet<String>>>>,
}

impl SchemaGateway {
    /// Create a gateway with an empty cache.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool,
            columns: RwLock::new(HashMap::new()),
        }
    }

    /// Discover columns for each table up front.
    ///
    /// # Errors
    ///
    /// Returns an error if a table name fails the allowlist or the catalog query
    /// fails.
    pub async fn preload(&self, tables: &[&str]) -> Result<()> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_err("Failed to acquire connection"))?;
        for table in tables {
            let columns = self.discover_columns_on(&mut conn, table).await?;
            tracing::info!(table = %table, columns = columns.len(), "Schema columns discovered");
        }
        Ok(())
    }

    /// Columns of `table`, from cache when possible, reading the catalog through a
    /// pooled connection on a miss.
    ///
    /// # Errors
    ///
    /// See [`discover_columns_on`](Self::discover_columns_on).
    pub async fn discover_columns(&self, table: &str) -> Result<Arc<HashSet<String>>> {
        let table = Identifier::parse(table)?;
        if let Some(cached) = self.cached(&table).await {
            return Ok(cached);
        }
        let mut conn = self
            .pool
            .acquire()
            .await
            .map_err(db_err("Failed to acquire connection"))?;
        self.load(&mut conn, table).await
    }

    /// Columns of `table`, from cache when possible, reading the catalog on `conn`
    /// on a miss.
    ///
    /// An empty result (table missing) is not cached, so a table created later
    /// is picked up on the next call.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidIdentifier`](stockgate_core::CoreError::InvalidIdentifier)
    ///   if `table` fails the allowlist
    /// - [`CoreError::Database`](stockgate_core::CoreError::Database) if the catalog
    ///   query fails
    pub async fn discover_columns_on(
        &self,
        conn: &mut PgConnection,
        table: &str,
    ) -> Result<Arc<HashSet<String>>> {
        let table = Identifier::parse(table)?;
        if let Some(cached) = self.cached(&table).await {
            return Ok(cached);
        }
        self.load(conn, table).await
    }

    async fn cached(&self, table: &Identifier) -> Option<Arc<HashSet<String>>> {
        self.columns.read().await.get(table).map(Arc::clone)
    }

    async fn load(&self, conn: &mut PgConnection, table: Identifier) -> Result<Arc<HashSet<String>>> {
        let names: Vec<(String,)> = sqlx::query_as(
            r"
            SELECT column_name::text
            FROM information_schema.columns
            WHERE table_name::text = $1
              AND table_schema = ANY(current_schemas(false))
            ",
        )
        .bind(table.as_str())
        .fetch_all(&mut *conn)
        .await
        .map_err(db_err("Failed to read column catalog"))?;

        let columns: Arc<HashSet<String>> =
            Arc::new(names.into_iter().map(|(name,)| name).collect());

        if columns.is_empty() {
            tracing::warn!(table = %table, "Table has no discoverable columns");
        } else {
            self.columns
                .write()
                .await
                .insert(table, Arc::clone(&columns));
        }
        Ok(columns)
    }

    /// Forget cached columns for one table, or for all tables with `None`.
    pub async fn invalidate(&self, table: Option<&str>) {
        let mut cache = self.columns.write().await;
        match table.map(Identifier::parse) {
            Some(Ok(table)) => {
                cache.remove(&table);
            }
            Some(Err(_)) => {}
            None => cache.clear(),
        }
    }

    /// Insert the populated, existing fields of `candidate` into `table` and return
    /// the inserted row (`RETURNING *`).
    ///
    /// Runs on `conn`, including any catalog read on a cache miss, so it
    /// participates in the caller's transaction and never takes a second
    /// connection.
    ///
    /// # Errors
    ///
    /// - [`CoreError::InvalidIdentifier`](stockgate_core::CoreError::InvalidIdentifier)
    ///   if the table or a kept column fails the allowlist
    /// - [`CoreError::NoMatchingColumns`](stockgate_core::CoreError::NoMatchingColumns)
    ///   if no field survives filtering
    /// - [`CoreError::UniqueViolation`](stockgate_core::CoreError::UniqueViolation)
    ///   if a unique constraint rejects the row
    /// - [`CoreError::Database`](stockgate_core::CoreError::Database) for any other
    ///   database failure
    pub async fn write_row(
        &self,
        conn: &mut PgConnection,
        table: &str,
        candidate: &CandidateRow,
    ) -> Result<PgRow> {
        let columns = self.discover_columns_on(conn, table).await?;
        let table = Identifier::parse(table)?;
        let fields = candidate.project(&table, &columns)?;

        let mut query = QueryBuilder::<Postgres>::new("INSERT INTO ");
        query.push(table.quoted()).push(" (");
        {
            let mut names = query.separated(", ");
            for (column, _) in &fields {
                names.push(column.quoted());
            }
        }
        query.push(") VALUES (");
        {
            let mut values = query.separated(", ");
            for (_, value) in &fields {
                push_value(&mut values, value);
            }
        }
        query.push(") RETURNING *");

        tracing::debug!(table = %table, columns = fields.len(), "Inserting row");

        query
            .build()
            .fetch_one(&mut *conn)
            .await
            .map_err(db_err("Failed to insert row"))
    }
}

fn push_value(values: &mut Separated<'_, '_, Postgres, &'static str>, value: &ColumnValue) {
    match value {
        ColumnValue::Null => {
            values.push("NULL");
        }
        ColumnValue::Bool(b) => {
            values.push_bind(*b);
        }
        ColumnValue::Int(i) => {
            values.push_bind(*i);
        }
        ColumnValue::Float(f) => {
            values.push_bind(*f);
        }
        ColumnValue::Text(s) => {
            values.push_bind(s.clone());
        }
        ColumnValue::Timestamp(t) => {
            values.push_bind(*t);
        }
        ColumnValue::Json(j) => {
            values.push_bind(sqlx::types::Json(j.clone()));
        }
    }
}
