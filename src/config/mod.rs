//! Configuration management for Warden.
//!
//! This module provides TOML-based configuration loading, parsing, and validation.
//!
//! # Overview
//!
//! Warden uses TOML configuration files with support for:
//! - Environment variable substitution (`${VAR_NAME}`)
//! - `WARDEN_<SECTION>_<KEY>` environment overrides
//! - Default values for optional settings
//! - Validation on load
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use warden::config::load_config;
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("warden.toml")?;
//!
//! println!("Batch size: {}", config.anonymization.batch_size);
//! println!("Access threshold: {}", config.detection.unusual_access_threshold);
//! # Ok(())
//! # }
//! ```
//!
//! # Configuration Structure
//!
//! - [`ApplicationConfig`] - Log level
//! - [`DatabaseConfig`] / [`PostgreSQLConfig`] - Storage backend and connection pool
//! - [`AuditConfig`] - Redaction, retention policies, subject resolution
//! - [`ClassificationConfig`] - Extra sensitive tables and marker patterns
//! - [`DetectionConfig`] - Violation heuristics
//! - [`AnonymizationConfig`] - Salt, batching, field semantics
//! - [`LoggingConfig`] - Logging configuration
//!
//! # Example Configuration
//!
//! ```toml
//! environment = "production"
//!
//! [database]
//! target = "postgresql"
//!
//! [postgresql]
//! connection_string = "${WARDEN_DATABASE_URL}"
//!
//! [anonymization]
//! salt = "${WARDEN_SALT}"
//! batch_size = 100
//!
//! [detection.table_retention_days]
//! medical_records = 2555
//! ```

pub mod loader;
pub mod schema;
pub mod secret;

// Re-export commonly used types
pub use loader::{load_config, load_config_from_str};
pub use schema::{
    AnonymizationConfig, ApplicationConfig, AuditConfig, ClassificationConfig, DatabaseConfig,
    DatabaseTarget, DetectionConfig, Environment, LoggingConfig, NationalIdLayout, PostgreSQLConfig,
    RegionConfig, WardenConfig,
};
pub use secret::{secret_string, SecretString, SecretValue};
