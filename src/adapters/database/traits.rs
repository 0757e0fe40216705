//! Storage capability traits
//!
//! Every backend implements these traits; the core only ever sees
//! `Arc<dyn Trait + Send + Sync>` handles, so the audit path, the job
//! orchestrator and the rule generator stay independent of the driver.

use crate::domain::audit::{AuditEntry, AuditFilter};
use crate::domain::erasure::{ErasureFilter, ErasureLogEntry};
use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::job::AnonymizationJob;
use crate::domain::violation::{ComplianceViolation, ViolationFilter};
use crate::domain::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

/// One column of a target table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared SQL type, lower-cased (e.g. `text`, `date`, `integer`)
    pub declared_type: String,
}

impl ColumnInfo {
    pub fn new(name: impl Into<String>, declared_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            declared_type: declared_type.into().to_lowercase(),
        }
    }
}

/// One row read from a target table
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    /// Primary key rendered as text
    pub id: String,
    /// Full row as a JSON object
    pub fields: Map<String, Value>,
}

/// Table name → ordered column list
#[async_trait]
pub trait SchemaDescriptor: Send + Sync {
    /// Describe the columns of a table in declaration order
    ///
    /// Returns an empty list when the table does not exist.
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnInfo>>;
}

/// Append-only audit trail
#[async_trait]
pub trait AuditStore: Send + Sync {
    /// Persist one entry in its own short transaction
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()>;

    /// Entries matching the filter, newest first
    async fn query_audit_entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>>;

    /// Sensitive-flagged entries for a subject at or after `since`
    async fn count_sensitive_accesses(&self, subject_id: &str, since: DateTime<Utc>)
        -> Result<u64>;
}

/// Append-only violation log
#[async_trait]
pub trait ViolationStore: Send + Sync {
    async fn append_violation(&self, violation: &ComplianceViolation) -> Result<()>;

    /// Append unless a violation of the same type for the same subject was
    /// detected at or after `window_start`
    ///
    /// The check and the insert are atomic with respect to other callers.
    /// Returns whether the violation was stored.
    async fn append_if_absent(
        &self,
        violation: &ComplianceViolation,
        window_start: DateTime<Utc>,
    ) -> Result<bool>;

    /// Violations matching the filter, newest first
    async fn query_violations(&self, filter: &ViolationFilter) -> Result<Vec<ComplianceViolation>>;
}

/// Anonymization job metadata
///
/// Only status, counters, error log, timestamps and the cancellation flag
/// ever change after insertion.
#[async_trait]
pub trait JobStore: Send + Sync {
    async fn insert_job(&self, job: &AnonymizationJob) -> Result<()>;

    /// Write the mutable progress fields of a job
    async fn save_progress(&self, job: &AnonymizationJob) -> Result<()>;

    /// Atomically move a pending job to running
    ///
    /// Returns false when the job is unknown or no longer pending, i.e. some
    /// other worker claimed it first.
    async fn claim_job(&self, id: JobId, started_at: DateTime<Utc>) -> Result<bool>;

    async fn get_job(&self, id: JobId) -> Result<Option<AnonymizationJob>>;

    /// Most recent jobs first
    async fn list_jobs(&self, limit: usize) -> Result<Vec<AnonymizationJob>>;

    /// Flag a job for cancellation; returns false when the job is unknown
    async fn request_cancellation(&self, id: JobId) -> Result<bool>;

    async fn is_cancellation_requested(&self, id: JobId) -> Result<bool>;
}

/// Target table access for anonymization
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Number of rows matching the predicate
    async fn count_records(&self, table: &TableName, predicate: &FilterPredicate) -> Result<u64>;

    /// Next page of matching rows ordered by id, strictly after `after_id`
    async fn fetch_batch(
        &self,
        table: &TableName,
        predicate: &FilterPredicate,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>>;

    /// Overwrite the given fields of one row and append its erasure entry
    /// in a single transaction
    async fn persist_anonymized_record(
        &self,
        table: &TableName,
        record_id: &str,
        fields: &Map<String, Value>,
        erasure: &ErasureLogEntry,
    ) -> Result<()>;

    /// Erasure entries matching the filter, newest first
    async fn query_erasures(&self, filter: &ErasureFilter) -> Result<Vec<ErasureLogEntry>>;
}

/// Backend lifecycle operations
#[async_trait]
pub trait StorageAdmin: Send + Sync {
    async fn test_connection(&self) -> Result<()>;

    /// Create the Warden tables if they do not exist
    async fn run_migrations(&self) -> Result<()>;

    /// Human-readable backend description (credentials removed)
    fn describe(&self) -> String;
}

/// Bundle of capability handles sharing one backend
#[derive(Clone)]
pub struct Storage {
    pub audit: Arc<dyn AuditStore + Send + Sync>,
    pub violations: Arc<dyn ViolationStore + Send + Sync>,
    pub jobs: Arc<dyn JobStore + Send + Sync>,
    pub records: Arc<dyn RecordStore + Send + Sync>,
    pub schema: Arc<dyn SchemaDescriptor + Send + Sync>,
    pub admin: Arc<dyn StorageAdmin + Send + Sync>,
}

impl Storage {
    /// Use one backend for every capability
    pub fn from_backend<B>(backend: Arc<B>) -> Self
    where
        B: AuditStore
            + ViolationStore
            + JobStore
            + RecordStore
            + SchemaDescriptor
            + StorageAdmin
            + Send
            + Sync
            + 'static,
    {
        Self {
            audit: backend.clone(),
            violations: backend.clone(),
            jobs: backend.clone(),
            records: backend.clone(),
            schema: backend.clone(),
            admin: backend,
        }
    }
}
