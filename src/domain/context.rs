//! Error context extension trait
//!
//! Adds `anyhow`-style `.context()` / `.with_context()` to any result whose
//! error converts into [`WardenError`], so library code keeps its typed
//! errors while still carrying a readable trail.
//!
//! # Examples
//!
//! ```rust
//! use warden::domain::Result;
//! use warden::domain::context::ResultExt;
//!
//! fn read_patterns(path: &str) -> Result<String> {
//!     std::fs::read_to_string(path)
//!         .with_context(|| format!("Failed to read marker patterns: {path}"))
//! }
//! ```

use crate::domain::errors::WardenError;
use crate::domain::result::Result;

/// Extension trait for adding context to `Result` types
pub trait ResultExt<T> {
    /// Add context to an error (evaluated eagerly)
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static;

    /// Add context to an error, computing it only on failure
    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C;
}

impl<T, E> ResultExt<T> for std::result::Result<T, E>
where
    E: Into<WardenError>,
{
    fn context<C>(self, context: C) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
    {
        self.map_err(|e| wrap(e.into(), context))
    }

    fn with_context<C, F>(self, f: F) -> Result<T>
    where
        C: std::fmt::Display + Send + Sync + 'static,
        F: FnOnce() -> C,
    {
        self.map_err(|e| wrap(e.into(), f()))
    }
}

/// Keep the variant so callers can still match on the error kind
fn wrap(base: WardenError, context: impl std::fmt::Display) -> WardenError {
    let detail = |inner: String| format!("{context}: {inner}");
    match base {
        WardenError::Configuration(m) => WardenError::Configuration(detail(m)),
        WardenError::Database(m) => WardenError::Database(detail(m)),
        WardenError::Validation(m) => WardenError::Validation(detail(m)),
        WardenError::JobValidation(m) => WardenError::JobValidation(detail(m)),
        WardenError::Serialization(m) => WardenError::Serialization(detail(m)),
        WardenError::Io(m) => WardenError::Io(detail(m)),
        other => WardenError::Other(detail(other.to_string())),
    }
}
