//! Storage factory
//!
//! Builds the backend selected by `database.target` and hands out one
//! [`Storage`] bundle sharing a single connection pool.

use crate::adapters::database::traits::Storage;
use crate::adapters::memory::MemoryStore;
use crate::adapters::postgresql::adapter::PostgreSQLAdapter;
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::config::schema::{DatabaseTarget, WardenConfig};
use crate::domain::{Result, WardenError};
use std::sync::Arc;

/// Create the storage backend described by the configuration
///
/// # Errors
///
/// Returns an error if the PostgreSQL section is missing or the pool cannot
/// be created.
pub async fn create_storage(config: &WardenConfig) -> Result<Storage> {
    match config.database.target {
        DatabaseTarget::PostgreSQL => {
            let pg_config = config.postgresql.as_ref().ok_or_else(|| {
                WardenError::Configuration(
                    "postgresql configuration is required when database.target = 'postgresql'"
                        .to_string(),
                )
            })?;

            tracing::info!("Creating PostgreSQL storage");
            let client = PostgreSQLClient::new(pg_config.clone()).await?;
            Ok(Storage::from_backend(Arc::new(PostgreSQLAdapter::new(client))))
        }
        DatabaseTarget::Memory => {
            tracing::warn!("Using in-memory storage; nothing will be persisted");
            Ok(Storage::from_backend(Arc::new(MemoryStore::new())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_target() {
        let mut config = WardenConfig::default();
        config.database.target = DatabaseTarget::Memory;
        let storage = create_storage(&config).await.unwrap();
        assert_eq!(storage.admin.describe(), "memory");
        storage.admin.test_connection().await.unwrap();
    }

    #[tokio::test]
    async fn test_postgresql_target_requires_section() {
        let config = WardenConfig::default();
        let result = create_storage(&config).await;
        assert!(matches!(result, Err(WardenError::Configuration(_))));
    }
}
