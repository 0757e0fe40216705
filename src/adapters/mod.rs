//! Storage adapters for Warden.
//!
//! - [`database`] - Capability traits and the backend factory
//! - [`postgresql`] - PostgreSQL implementation
//! - [`memory`] - Process-local implementation with fault injection
//!
//! # Design Pattern
//!
//! Adapters follow the **Adapter Pattern**: the core depends only on the
//! traits in [`database::traits`], so every backend is interchangeable.
//!
//! ```rust
//! use std::sync::Arc;
//! use warden::adapters::database::Storage;
//! use warden::adapters::memory::MemoryStore;
//!
//! let store = Arc::new(MemoryStore::new());
//! let storage = Storage::from_backend(store.clone());
//! assert_eq!(storage.admin.describe(), "memory");
//! ```

pub mod database;
pub mod memory;
pub mod postgresql;
