//! Domain models and types for Warden.
//!
//! This module contains the core domain models, types, and business rules.
//!
//! # Overview
//!
//! The domain layer provides:
//! - **Audit trail** ([`AuditEntry`], [`AuditContext`], [`BreachRiskLevel`])
//! - **Compliance violations** ([`ComplianceViolation`])
//! - **Anonymization jobs** ([`AnonymizationJob`], [`FieldRule`], [`ErasureLogEntry`])
//! - **Strongly-typed identifiers** ([`JobId`], [`TableName`])
//! - **Error types** ([`WardenError`], [`TransformError`])
//! - **Result type alias** ([`Result`])
//!
//! # Error Handling
//!
//! All fallible operations return [`Result<T, WardenError>`]:
//!
//! ```rust
//! use warden::domain::{Result, TableName, WardenError};
//!
//! fn example() -> Result<TableName> {
//!     TableName::new("patients").map_err(WardenError::Validation)
//! }
//! ```

pub mod audit;
pub mod context;
pub mod erasure;
pub mod errors;
pub mod filter;
pub mod ids;
pub mod job;
pub mod result;
pub mod rule;
pub mod violation;

// Re-export commonly used types for convenience
pub use audit::{AuditContext, AuditEntry, AuditFilter, BreachRiskLevel, Operation};
pub use erasure::{ErasureFilter, ErasureLogEntry, ErasureType};
pub use errors::{TransformError, WardenError};
pub use filter::{Comparison, Condition, FilterPredicate};
pub use ids::{JobId, TableName};
pub use job::{AlgorithmParams, Algorithm, AnonymizationJob, JobHandle, JobRequest, JobStatus};
pub use result::Result;
pub use rule::{FieldRule, FieldSemantic, GeneralizationKind, Transform, TransformMethod};
pub use violation::{ComplianceViolation, DetectionMethod, Severity, ViolationFilter, ViolationType};
