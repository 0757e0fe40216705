//! Logging and observability
//!
//! Structured logging built on `tracing`:
//! - JSON-formatted file logs with rotation
//! - Console output with `RUST_LOG`-style filtering
//! - Macros for the recurring job events
//!
//! Redacted field values never reach a log line; audit and job code logs
//! identifiers and counts only.
//!
//! # Example
//!
//! ```no_run
//! use warden::logging::init_logging;
//! use warden::config::LoggingConfig;
//!
//! let config = LoggingConfig::default();
//! let _guard = init_logging("info", &config).expect("Failed to initialize logging");
//!
//! tracing::info!("Application started");
//! ```

pub mod structured;

// Re-export commonly used items
pub use structured::{init_logging, LoggingGuard};

/// Log the start of an anonymization job
///
/// # Example
///
/// ```no_run
/// use warden::log_job_start;
/// use warden::domain::JobId;
///
/// let job_id = JobId::new();
/// log_job_start!(job_id, "patients", 1200);
/// ```
#[macro_export]
macro_rules! log_job_start {
    ($job_id:expr, $table:expr, $estimate:expr) => {
        tracing::info!(
            job_id = %$job_id,
            table = %$table,
            estimated_records = $estimate,
            "Starting anonymization job"
        );
    };
}

/// Log the end of an anonymization job
///
/// # Example
///
/// ```no_run
/// use warden::log_job_complete;
/// use warden::domain::JobId;
/// use std::time::Duration;
///
/// log_job_complete!(JobId::new(), 1200, 1198, Duration::from_secs(42));
/// ```
#[macro_export]
macro_rules! log_job_complete {
    ($job_id:expr, $processed:expr, $anonymized:expr, $duration:expr) => {
        tracing::info!(
            job_id = %$job_id,
            processed = $processed,
            anonymized = $anonymized,
            duration_ms = $duration.as_millis() as u64,
            "Anonymization job finished"
        );
    };
}

/// Log an error with context
///
/// # Example
///
/// ```no_run
/// use warden::log_error_with_context;
/// use warden::domain::WardenError;
///
/// let error = WardenError::Database("connection reset".to_string());
/// log_error_with_context!(&error, "Failed to append audit entry");
/// ```
#[macro_export]
macro_rules! log_error_with_context {
    ($error:expr, $context:expr) => {
        tracing::error!(
            error = %$error,
            context = $context,
            "Error occurred"
        )
    };
}

/// Log batch progress
///
/// # Example
///
/// ```no_run
/// use warden::log_batch_processing;
///
/// log_batch_processing!(300, 1200);
/// ```
#[macro_export]
macro_rules! log_batch_processing {
    ($current:expr, $total:expr) => {
        tracing::debug!(
            current = $current,
            total = $total,
            progress_pct = if $total == 0 {
                100.0
            } else {
                $current as f64 / $total as f64 * 100.0
            },
            "Processing batch"
        );
    };
}
