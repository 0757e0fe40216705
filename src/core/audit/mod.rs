//! Audit trail pipeline
//!
//! Operation → [`AuditContextTagger`] → [`AuditLogWriter`] → [`ViolationDetector`].
//! Nothing on this path ever returns an error to the business caller.

pub mod context;
pub mod detector;
pub mod writer;

pub use context::{AuditContextTagger, OperationDescriptor};
pub use detector::ViolationDetector;
pub use writer::{AuditLogWriter, AuditWriteOutcome, SubjectResolver};
