//! Domain error types
//!
//! This module defines the error hierarchy for Warden.
//! All errors are domain-specific and don't expose third-party types.

use thiserror::Error;

/// Main Warden error type
///
/// This is the primary error type used throughout the application.
/// Audit-path failures never surface through this type to business callers;
/// they are recovered inside the writer and detector.
#[derive(Debug, Error)]
pub enum WardenError {
    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(String),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// Rejected anonymization job request (never queued)
    #[error("Invalid anonymization job: {0}")]
    JobValidation(String),

    /// Job lookup failed
    #[error("Anonymization job not found: {0}")]
    JobNotFound(String),

    /// A second executor was requested for a job that is already running
    #[error("Anonymization job already running: {0}")]
    JobAlreadyRunning(String),

    /// Serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(String),

    /// Generic errors with context
    #[error("{0}")]
    Other(String),
}

/// Per-record transformation errors
///
/// These are caught by the job executor, appended to the job's error log,
/// and never abort the job.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TransformError {
    /// The value could not be interpreted for the requested transform
    #[error("Invalid value for field '{field}': {reason}")]
    InvalidValue { field: String, reason: String },

    /// The value type is not supported by the transform
    #[error("Unsupported value for field '{field}': expected {expected}")]
    UnsupportedValue { field: String, expected: String },

    /// The record exceeded its processing budget
    #[error("Record processing exceeded {0} ms")]
    Timeout(u64),
}

impl TransformError {
    /// Shorthand for an invalid value error
    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Shorthand for an unsupported value error
    pub fn unsupported(field: impl Into<String>, expected: impl Into<String>) -> Self {
        Self::UnsupportedValue {
            field: field.into(),
            expected: expected.into(),
        }
    }
}

impl From<TransformError> for WardenError {
    fn from(err: TransformError) -> Self {
        WardenError::Validation(err.to_string())
    }
}

// Conversion from std::io::Error
impl From<std::io::Error> for WardenError {
    fn from(err: std::io::Error) -> Self {
        WardenError::Io(err.to_string())
    }
}

// Conversion from serde_json::Error
impl From<serde_json::Error> for WardenError {
    fn from(err: serde_json::Error) -> Self {
        WardenError::Serialization(err.to_string())
    }
}

// Conversion from toml parse errors
impl From<toml::de::Error> for WardenError {
    fn from(err: toml::de::Error) -> Self {
        WardenError::Configuration(format!("TOML parse error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warden_error_display() {
        let err = WardenError::Configuration("Invalid config".to_string());
        assert_eq!(err.to_string(), "Configuration error: Invalid config");
    }

    #[test]
    fn test_job_validation_display() {
        let err = WardenError::JobValidation("k must be >= 2".to_string());
        assert_eq!(err.to_string(), "Invalid anonymization job: k must be >= 2");
    }

    #[test]
    fn test_transform_error_display() {
        let err = TransformError::invalid("birth_date", "not a date");
        assert_eq!(
            err.to_string(),
            "Invalid value for field 'birth_date': not a date"
        );
        assert_eq!(
            TransformError::Timeout(250).to_string(),
            "Record processing exceeded 250 ms"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let err: WardenError = io_err.into();
        assert!(matches!(err, WardenError::Io(_)));
    }

    #[test]
    fn test_serde_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let err: WardenError = json_err.into();
        assert!(matches!(err, WardenError::Serialization(_)));
    }

    #[test]
    fn test_toml_error_conversion() {
        let toml_err = toml::from_str::<toml::Value>("invalid = toml = syntax").unwrap_err();
        let err: WardenError = toml_err.into();
        assert!(matches!(err, WardenError::Configuration(_)));
        assert!(err.to_string().contains("TOML parse error"));
    }

    #[test]
    fn test_warden_error_implements_std_error() {
        let err = WardenError::Validation("Test error".to_string());
        let _: &dyn std::error::Error = &err;
    }
}
