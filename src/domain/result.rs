//! Result type alias for Warden
//!
//! This module provides a convenient Result type alias that uses WardenError
//! as the error type.

use super::errors::WardenError;

/// Result type alias for Warden operations
///
/// # Examples
///
/// ```
/// use warden::domain::result::Result;
/// use warden::domain::errors::WardenError;
///
/// fn example_function() -> Result<String> {
///     Ok("success".to_string())
/// }
///
/// fn failing_function() -> Result<()> {
///     Err(WardenError::Validation("Invalid input".to_string()))
/// }
/// ```
pub type Result<T> = std::result::Result<T, WardenError>;
