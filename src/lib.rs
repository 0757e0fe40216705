// Warden - Privacy-compliant audit trail and data anonymization engine
// Copyright (c) 2025 Warden Contributors
// Licensed under the MIT License

//! # Warden - Privacy-Compliant Audit & Data Anonymization
//!
//! Warden records a risk-scored, immutable audit trail for every data
//! operation and runs background jobs that irreversibly anonymize sensitive
//! records while keeping their statistical utility.
//!
//! ## Overview
//!
//! This library provides the core functionality for:
//! - **Tagging** operations with a processing purpose and legal basis
//! - **Classifying** payloads into data categories and a sensitive flag
//! - **Auditing** with redacted snapshots, retention and breach risk levels
//! - **Detecting** retention overruns and unusual access patterns
//! - **Anonymizing** tables with k-anonymity, pseudonymization, noise and date shifting
//!
//! ## Architecture
//!
//! - [`cli`] - Command-line interface and argument parsing
//! - [`core`] - Audit pipeline, job orchestration and the [`core::ComplianceService`] facade
//! - [`anonymization`] - Transform library, classifier, rule generator, k-anonymity
//! - [`adapters`] - Storage capabilities (PostgreSQL, in-memory)
//! - [`domain`] - Core domain types and errors
//! - [`config`] - Configuration management
//! - [`logging`] - Structured logging
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use warden::adapters::database::create_storage;
//! use warden::config::load_config;
//! use warden::core::audit::OperationDescriptor;
//! use warden::core::ComplianceService;
//! use warden::domain::Operation;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = load_config("warden.toml")?;
//!     let storage = create_storage(&config).await?;
//!     let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//!     let service = ComplianceService::new(&config, storage, shutdown_rx)?;
//!
//!     let operation = OperationDescriptor::new(
//!         "medical_records",
//!         Operation::Update,
//!         "/api/medical/records/42",
//!     )
//!     .with_actor("dr-chen")
//!     .with_record_id("42")
//!     .with_after(serde_json::json!({"patient_id": "p-7", "diagnosis": "J45.909"}));
//!
//!     // Never fails; audit problems are logged and reported in the outcome
//!     let outcome = service.record_operation(&operation).await;
//!     if let Some(entry) = outcome.recorded() {
//!         println!("risk: {}", entry.breach_risk_level);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Error Handling
//!
//! Fallible operations return [`domain::Result`], an alias over
//! [`domain::WardenError`]. Per-record anonymization failures are
//! [`domain::TransformError`] values recorded in the job's error log.
//!
//! ## Logging
//!
//! Warden uses structured logging with the `tracing` crate; see [`logging`].

pub mod adapters;
pub mod anonymization;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;
pub mod logging;
