//! PostgreSQL storage backend
//!
//! Holds the audit trail, violations, jobs and erasure log in the Warden
//! tables and reads/writes target tables generically.

pub mod adapter;
pub mod client;
pub mod models;

pub use adapter::PostgreSQLAdapter;
pub use client::PostgreSQLClient;
