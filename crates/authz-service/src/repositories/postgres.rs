//! Postgres-backed lookup store.
//!
//! The policy table holds one row per group:
//!
//! ```sql
//! CREATE TABLE group_policies (
//!     "group" TEXT PRIMARY KEY,
//!     policy  JSONB NOT NULL
//! );
//! ```
//!
//! # Security
//!
//! - Key values are always bound parameters
//! - Table and key field names are validated identifiers (see config) and
//!   quoted before they are placed in the statement
//! - The connection URL is never logged

use crate::errors::ResolverError;
use crate::repositories::lookup_store::{
    check_request, BatchGetOutput, BatchGetRequest, LookupStore, StoreItem,
};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;
use std::time::{Duration, Instant};
use tracing::instrument;

/// Per-statement timeout applied through the connection URL.
const STATEMENT_TIMEOUT_SECONDS: u32 = 2;

/// Lookup store reading policy rows from Postgres.
pub struct PgLookupStore {
    pool: PgPool,
    table: String,
    key_field: String,
    select_sql: String,
}

impl PgLookupStore {
    /// Wrap an existing pool.
    pub fn new(pool: PgPool, table: impl Into<String>, key_field: impl Into<String>) -> Self {
        let table = table.into();
        let key_field = key_field.into();
        let select_sql = build_select_sql(&table, &key_field);
        Self {
            pool,
            table,
            key_field,
            select_sql,
        }
    }

    /// Open a connection pool and wrap it.
    pub async fn connect(
        database_url: &SecretString,
        table: impl Into<String>,
        key_field: impl Into<String>,
    ) -> Result<Self, ResolverError> {
        let url = with_statement_timeout(database_url.expose_secret(), STATEMENT_TIMEOUT_SECONDS);
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(1)
            .acquire_timeout(Duration::from_secs(5))
            .idle_timeout(Duration::from_secs(600))
            .max_lifetime(Duration::from_secs(1800))
            .connect(&url)
            .await
            .map_err(|e| {
                tracing::error!(target: "authz.repo.postgres", error = %e, "Failed to connect to database");
                ResolverError::from(e)
            })?;

        tracing::info!(target: "authz.repo.postgres", "Database connection established");
        Ok(Self::new(pool, table, key_field))
    }
}

#[async_trait]
impl LookupStore for PgLookupStore {
    #[instrument(skip_all, fields(keys = request.keys.len()))]
    async fn batch_get(&self, request: BatchGetRequest<'_>) -> Result<BatchGetOutput, ResolverError> {
        check_request(&request, &self.table, &self.key_field)?;

        let start = Instant::now();
        let rows: Vec<PolicyRow> = sqlx::query_as(&self.select_sql)
            .bind(request.keys)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                tracing::warn!(target: "authz.repo.postgres", error = %e, "Policy batch-get failed");
                ResolverError::from(e)
            })?;

        tracing::debug!(
            target: "authz.repo.postgres",
            rows = rows.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Policy batch-get complete"
        );

        Ok(BatchGetOutput {
            items: rows
                .into_iter()
                .map(|row| StoreItem {
                    key: row.key,
                    policy: row.policy,
                })
                .collect(),
            unprocessed_keys: Vec::new(),
        })
    }

    async fn ping(&self) -> Result<(), ResolverError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn build_select_sql(table: &str, key_field: &str) -> String {
    format!(
        r#"SELECT "{key}"::TEXT AS key, policy FROM "{table}" WHERE "{key}" = ANY($1) ORDER BY array_position($1, "{key}"::TEXT)"#,
        key = key_field,
        table = table
    )
}

/// Adds `statement_timeout` to the database URL.
fn with_statement_timeout(url: &str, timeout_secs: u32) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!(
        "{}{}options=-c%20statement_timeout%3D{}s",
        url, separator, timeout_secs
    )
}

#[derive(sqlx::FromRow)]
struct PolicyRow {
    key: String,
    policy: serde_json::Value,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_select_sql_quotes_identifiers_and_binds_keys() {
        let sql = build_select_sql("group_policies", "group");

        assert_eq!(
            sql,
            r#"SELECT "group"::TEXT AS key, policy FROM "group_policies" WHERE "group" = ANY($1) ORDER BY array_position($1, "group"::TEXT)"#
        );
    }

    #[test]
    fn test_statement_timeout_appended() {
        assert_eq!(
            with_statement_timeout("postgres://localhost/authz", 2),
            "postgres://localhost/authz?options=-c%20statement_timeout%3D2s"
        );
        assert_eq!(
            with_statement_timeout("postgres://localhost/authz?sslmode=require", 2),
            "postgres://localhost/authz?sslmode=require&options=-c%20statement_timeout%3D2s"
        );
    }

    #[tokio::test]
    async fn test_connect_failure_is_store_error() {
        let url = SecretString::from("postgres://127.0.0.1:1/authz".to_string());
        let result = PgLookupStore::connect(&url, "group_policies", "group").await;
        assert!(matches!(result, Err(ResolverError::Store(_))));
    }
}
