//! In-memory storage backend
//!
//! Used for development runs and throughout the test suite.

pub mod store;

pub use store::MemoryStore;
