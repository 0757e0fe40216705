//! PostgreSQL client implementation
//!
//! Thin wrapper over a deadpool connection pool. Every statement runs with the
//! configured `statement_timeout`.

use crate::config::schema::PostgreSQLConfig;
use crate::domain::{Result, WardenError};
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use secrecy::ExposeSecret;
use std::time::Duration;
use tokio_postgres::types::ToSql;
use tokio_postgres::{NoTls, Row};

/// Pooled PostgreSQL client for Warden
pub struct PostgreSQLClient {
    pool: Pool,
    config: PostgreSQLConfig,
}

impl PostgreSQLClient {
    /// Create a new PostgreSQL client
    ///
    /// No connection is opened until the first query.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection string cannot be parsed or the pool
    /// cannot be built.
    pub async fn new(config: PostgreSQLConfig) -> Result<Self> {
        let pg_config: tokio_postgres::Config = config
            .connection_string
            .expose_secret()
            .as_str()
            .parse()
            .map_err(|e| {
                WardenError::Configuration(format!("Invalid PostgreSQL connection string: {e}"))
            })?;

        let manager = Manager::from_config(
            pg_config,
            NoTls,
            ManagerConfig {
                recycling_method: RecyclingMethod::Fast,
            },
        );

        let timeout = Duration::from_secs(config.connection_timeout_seconds);
        let pool = Pool::builder(manager)
            .max_size(config.max_connections)
            .runtime(Runtime::Tokio1)
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .recycle_timeout(Some(timeout))
            .build()
            .map_err(|e| WardenError::Database(format!("Failed to create connection pool: {e}")))?;

        Ok(Self { pool, config })
    }

    /// Attempts to get a connection from the pool and execute a simple query
    pub async fn test_connection(&self) -> Result<()> {
        let client = self.get_connection().await?;

        client
            .query_one("SELECT 1", &[])
            .await
            .map_err(|e| WardenError::Database(format!("Connection test failed: {e}")))?;

        tracing::info!("PostgreSQL connection test successful");
        Ok(())
    }

    /// Create the Warden tables, indexes and append-only triggers
    ///
    /// The migration is idempotent.
    pub async fn ensure_schema(&self) -> Result<()> {
        let client = self.get_connection().await?;

        let migration_sql = include_str!("../../../migrations/001_initial_schema.sql");

        client
            .batch_execute(migration_sql)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to execute migration: {e}")))?;

        tracing::info!("PostgreSQL schema initialized successfully");
        Ok(())
    }

    /// Get a connection from the pool with the statement timeout applied
    ///
    /// # Errors
    ///
    /// Returns an error if a connection cannot be obtained.
    pub async fn get_connection(&self) -> Result<deadpool_postgres::Object> {
        let client = self
            .pool
            .get()
            .await
            .map_err(|e| WardenError::Database(format!("Failed to get connection from pool: {e}")))?;

        let timeout_query = format!(
            "SET statement_timeout = {}",
            self.config.statement_timeout_seconds * 1000
        );
        client
            .batch_execute(&timeout_query)
            .await
            .map_err(|e| WardenError::Database(format!("Failed to set statement timeout: {e}")))?;

        Ok(client)
    }

    /// Execute a query and return rows
    pub async fn query(&self, query: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Vec<Row>> {
        let client = self.get_connection().await?;
        client
            .query(query, params)
            .await
            .map_err(|e| WardenError::Database(format!("Query failed: {e}")))
    }

    /// Execute a query expected to return exactly one row
    pub async fn query_one(&self, query: &str, params: &[&(dyn ToSql + Sync)]) -> Result<Row> {
        let client = self.get_connection().await?;
        client
            .query_one(query, params)
            .await
            .map_err(|e| WardenError::Database(format!("Query failed: {e}")))
    }

    /// Execute a statement and return the number of affected rows
    pub async fn execute(&self, statement: &str, params: &[&(dyn ToSql + Sync)]) -> Result<u64> {
        let client = self.get_connection().await?;
        client
            .execute(statement, params)
            .await
            .map_err(|e| WardenError::Database(format!("Statement execution failed: {e}")))
    }

    /// Connection string with credentials removed
    pub fn connection_string_safe(&self) -> String {
        redact_connection_string(self.config.connection_string.expose_secret().as_str())
    }

    pub fn pool_status(&self) -> deadpool_postgres::Status {
        self.pool.status()
    }
}

fn redact_connection_string(connection_string: &str) -> String {
    match connection_string.rsplit_once('@') {
        Some((_, host)) => format!("postgresql://***@{host}"),
        None => "postgresql://***".to_string(),
    }
}
