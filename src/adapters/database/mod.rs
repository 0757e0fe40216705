//! Storage abstraction layer
//!
//! Capability traits shared by every backend, plus the factory that builds
//! the configured one.

pub mod factory;
pub mod traits;

pub use factory::create_storage;
pub use traits::{
    AuditStore, ColumnInfo, JobStore, RecordStore, SchemaDescriptor, SourceRecord, Storage,
    StorageAdmin, ViolationStore,
};
