//! Anonymization jobs
//!
//! [`JobOrchestrator`] validates and persists jobs; [`JobQueue`] runs their
//! executors in the background with bounded concurrency.

pub mod orchestrator;
pub mod queue;

pub use orchestrator::JobOrchestrator;
pub use queue::JobQueue;
