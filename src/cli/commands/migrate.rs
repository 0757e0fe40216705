//! Migrate command implementation
//!
//! Creates the Warden tables and append-only triggers in the configured
//! database. Safe to run repeatedly.

use crate::adapters::database::create_storage;
use crate::config::load_config;
use clap::Args;

/// Arguments for the migrate command
#[derive(Args, Debug)]
pub struct MigrateArgs {}

impl MigrateArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!("Running schema migrations");

        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Failed to load configuration file");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        let storage = match create_storage(&config).await {
            Ok(s) => s,
            Err(e) => {
                println!("❌ Failed to connect to database");
                println!("   Error: {e}");
                return Ok(4);
            }
        };

        println!("🔧 Migrating {}", storage.admin.describe());
        if let Err(e) = storage.admin.test_connection().await {
            println!("❌ Failed to connect to database");
            println!("   Error: {e}");
            return Ok(4);
        }

        match storage.admin.run_migrations().await {
            Ok(()) => {
                println!("✅ Schema is up to date");
                Ok(0)
            }
            Err(e) => {
                tracing::error!(error = %e, "Migration failed");
                println!("❌ Migration failed");
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}
