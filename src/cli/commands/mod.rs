//! CLI command implementations
//!
//! Every command loads the configuration itself and maps failures to exit
//! codes: 2 configuration, 4 connection, 5 fatal.

pub mod anonymize;
pub mod jobs;
pub mod migrate;
pub mod reports;
pub mod validate;

use crate::adapters::database::create_storage;
use crate::config::{load_config, WardenConfig};
use crate::core::ComplianceService;
use serde::Serialize;
use tokio::sync::watch;

/// Load the configuration and connect the service, or return the exit code
pub(crate) async fn open_service(
    config_path: &str,
    shutdown: watch::Receiver<bool>,
) -> Result<(WardenConfig, ComplianceService), i32> {
    let config = match load_config(config_path) {
        Ok(c) => c,
        Err(e) => {
            println!("❌ Failed to load configuration file");
            println!("   Error: {e}");
            return Err(2);
        }
    };

    let storage = match create_storage(&config).await {
        Ok(s) => s,
        Err(e) => {
            println!("❌ Failed to connect to database");
            println!("   Error: {e}");
            return Err(4);
        }
    };
    if let Err(e) = storage.admin.test_connection().await {
        println!("❌ Failed to connect to {}", storage.admin.describe());
        println!("   Error: {e}");
        return Err(4);
    }

    match ComplianceService::new(&config, storage, shutdown) {
        Ok(service) => Ok((config, service)),
        Err(e) => {
            println!("❌ Failed to initialize compliance service");
            println!("   Error: {e}");
            Err(2)
        }
    }
}

/// Service for commands that never run jobs
pub(crate) async fn open_reporting_service(
    config_path: &str,
) -> Result<(WardenConfig, ComplianceService), i32> {
    let (_tx, rx) = watch::channel(false);
    open_service(config_path, rx).await
}

/// Pretty-print a value as JSON
pub(crate) fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
