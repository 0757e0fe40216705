//! Core business logic for Warden.
//!
//! # Modules
//!
//! - [`audit`] - Context tagging, audit log writing and violation detection
//! - [`jobs`] - Anonymization job orchestration and the background job queue
//! - [`service`] - [`ComplianceService`], the facade used by callers
//!
//! # Audit Workflow
//!
//! 1. **Tag**: infer purpose and legal basis from the request path
//! 2. **Classify**: derive data categories and the sensitive flag
//! 3. **Write**: redact snapshots and append the entry (fallback on failure)
//! 4. **Detect**: evaluate retention and unusual access heuristics
//!
//! # Example
//!
//! ```rust,no_run
//! use warden::adapters::database::create_storage;
//! use warden::config::load_config;
//! use warden::core::ComplianceService;
//! use warden::domain::{Algorithm, AlgorithmParams, FilterPredicate};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = load_config("warden.toml")?;
//! let storage = create_storage(&config).await?;
//!
//! let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);
//! let service = ComplianceService::new(&config, storage, shutdown_rx)?;
//!
//! let params = AlgorithmParams {
//!     k: Some(5),
//!     ..Default::default()
//! };
//! let handle = service
//!     .start_anonymization_job(
//!         "patients",
//!         FilterPredicate::parse("created_at < 2015-01-01")?,
//!         Algorithm::KAnonymity,
//!         params,
//!     )
//!     .await?;
//!
//! let job = service.wait_for_job(handle.job_id).await?;
//! println!("{}: {} anonymized", job.status, job.anonymized_count);
//! # Ok(())
//! # }
//! ```

pub mod audit;
pub mod jobs;
pub mod service;

pub use service::ComplianceService;
