//! Validate config command implementation
//!
//! This module implements the `validate-config` command for validating
//! the Warden configuration file.

use crate::config::load_config;
use crate::config::schema::DatabaseTarget;
use clap::Args;

/// Arguments for the validate-config command
#[derive(Args, Debug)]
pub struct ValidateArgs {}

impl ValidateArgs {
    /// Execute the validate-config command
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        tracing::info!(config_path = %config_path, "Validating configuration");

        println!("🔍 Validating configuration file: {config_path}");
        println!();

        // load_config validates as its last step
        let config = match load_config(config_path) {
            Ok(c) => c,
            Err(e) => {
                println!("❌ Configuration is invalid");
                println!("   Error: {e}");
                return Ok(2);
            }
        };

        println!("✅ Configuration is valid");
        println!();
        println!("Configuration Summary:");
        println!("  Environment: {:?}", config.environment);
        println!("  Log Level: {}", config.application.log_level);

        match config.database.target {
            DatabaseTarget::PostgreSQL => {
                if let Some(ref pg_config) = config.postgresql {
                    use secrecy::ExposeSecret;
                    println!("  Database Target: PostgreSQL");
                    println!(
                        "  PostgreSQL Connection: {}",
                        pg_config
                            .connection_string
                            .expose_secret()
                            .as_str()
                            .split('@')
                            .next_back()
                            .unwrap_or("***")
                    );
                    println!("  Max Connections: {}", pg_config.max_connections);
                }
            }
            DatabaseTarget::Memory => println!("  Database Target: in-memory"),
        }

        let anonymization = &config.anonymization;
        println!("  Batch Size: {}", anonymization.batch_size);
        println!("  Max Concurrent Jobs: {}", anonymization.max_concurrent_jobs);
        println!("  Record Timeout: {}ms", anonymization.record_timeout_ms);
        println!(
            "  Field Semantic Overrides: {}",
            anonymization.field_semantics.len()
        );
        println!(
            "  Unusual Access Threshold: {} per {} min",
            config.detection.unusual_access_threshold,
            config.detection.unusual_access_window_minutes
        );
        println!(
            "  Tables With Retention Rules: {}",
            config.detection.table_retention_days.len()
        );
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_validate_missing_file() {
        let code = ValidateArgs {}
            .execute("/nonexistent/warden.toml")
            .await
            .unwrap();
        assert_eq!(code, 2);
    }

    #[tokio::test]
    async fn test_validate_memory_config() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[database]\ntarget = \"memory\"\n\n[anonymization]\nsalt = \"validate-salt\""
        )
        .unwrap();
        let code = ValidateArgs {}
            .execute(file.path().to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(code, 0);
    }
}
