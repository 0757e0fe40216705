//! Process-local storage backend
//!
//! Keeps every Warden table in memory behind one async mutex. Target tables
//! are created explicitly with [`MemoryStore::create_table`]. Faults can be
//! injected per capability so audit fallbacks and per-record job failures can
//! be exercised without a database.

use crate::adapters::database::traits::{
    AuditStore, ColumnInfo, JobStore, RecordStore, SchemaDescriptor, SourceRecord, StorageAdmin,
    ViolationStore,
};
use crate::domain::audit::{AuditEntry, AuditFilter};
use crate::domain::erasure::{ErasureFilter, ErasureLogEntry};
use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::job::{AnonymizationJob, JobStatus};
use crate::domain::violation::{ComplianceViolation, ViolationFilter};
use crate::domain::{Result, WardenError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::Duration;
use tokio::sync::Mutex;

#[derive(Debug, Default)]
struct MemoryTable {
    columns: Vec<ColumnInfo>,
    /// Keyed by the textual primary key so iteration matches `id::text` order
    rows: BTreeMap<String, Map<String, Value>>,
}

#[derive(Debug, Default)]
struct Faults {
    failing_audit_tables: HashSet<String>,
    fail_all_audit_appends: bool,
    fail_violation_appends: bool,
    failing_records: HashSet<String>,
    fail_enumeration: bool,
    record_delays: HashMap<String, Duration>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, MemoryTable>,
    audit: Vec<AuditEntry>,
    violations: Vec<ComplianceViolation>,
    jobs: Vec<AnonymizationJob>,
    erasures: Vec<ErasureLogEntry>,
    faults: Faults,
}

/// In-memory implementation of every storage capability
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: Mutex<State>,
}

/// Render a primary key value the way PostgreSQL renders `id::text`
fn key_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn take<T: Clone>(items: impl Iterator<Item = T>, limit: Option<usize>) -> Vec<T> {
    match limit {
        Some(limit) => items.take(limit).collect(),
        None => items.collect(),
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or replace) a target table with `(name, declared_type)` columns
    pub async fn create_table(&self, name: &str, columns: &[(&str, &str)]) {
        let table = MemoryTable {
            columns: columns
                .iter()
                .map(|(name, ty)| ColumnInfo::new(*name, *ty))
                .collect(),
            rows: BTreeMap::new(),
        };
        self.state.lock().await.tables.insert(name.to_string(), table);
    }

    /// Insert a row; the object must carry an `id`
    pub async fn insert_row(&self, table: &str, row: Value) -> Result<()> {
        let Value::Object(fields) = row else {
            return Err(WardenError::Validation("Row must be a JSON object".to_string()));
        };
        let id = fields.get("id").and_then(key_text).ok_or_else(|| {
            WardenError::Validation("Row must have a string or numeric id".to_string())
        })?;

        let mut state = self.state.lock().await;
        let table = state
            .tables
            .get_mut(table)
            .ok_or_else(|| WardenError::Database(format!("Unknown table: {table}")))?;
        table.rows.insert(id, fields);
        Ok(())
    }

    pub async fn row(&self, table: &str, id: &str) -> Option<Map<String, Value>> {
        let state = self.state.lock().await;
        state.tables.get(table).and_then(|t| t.rows.get(id).cloned())
    }

    pub async fn audit_entries(&self) -> Vec<AuditEntry> {
        self.state.lock().await.audit.clone()
    }

    pub async fn violations(&self) -> Vec<ComplianceViolation> {
        self.state.lock().await.violations.clone()
    }

    pub async fn erasures(&self) -> Vec<ErasureLogEntry> {
        self.state.lock().await.erasures.clone()
    }

    /// Make audit appends for one table fail
    pub async fn fail_audit_appends_for(&self, table: &str) {
        self.state
            .lock()
            .await
            .faults
            .failing_audit_tables
            .insert(table.to_string());
    }

    /// Make every audit append fail, fallbacks included
    pub async fn set_fail_all_audit_appends(&self, fail: bool) {
        self.state.lock().await.faults.fail_all_audit_appends = fail;
    }

    pub async fn set_fail_violation_appends(&self, fail: bool) {
        self.state.lock().await.faults.fail_violation_appends = fail;
    }

    /// Make persisting one record fail
    pub async fn fail_record(&self, record_id: &str) {
        self.state
            .lock()
            .await
            .faults
            .failing_records
            .insert(record_id.to_string());
    }

    /// Make counting and batch reads fail
    pub async fn set_fail_enumeration(&self, fail: bool) {
        self.state.lock().await.faults.fail_enumeration = fail;
    }

    /// Delay persisting one record
    pub async fn delay_record(&self, record_id: &str, delay: Duration) {
        self.state
            .lock()
            .await
            .faults
            .record_delays
            .insert(record_id.to_string(), delay);
    }
}

#[async_trait]
impl StorageAdmin for MemoryStore {
    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn run_migrations(&self) -> Result<()> {
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}

#[async_trait]
impl SchemaDescriptor for MemoryStore {
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnInfo>> {
        let state = self.state.lock().await;
        Ok(state
            .tables
            .get(table.as_str())
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }
}

#[async_trait]
impl AuditStore for MemoryStore {
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.fail_all_audit_appends
            || state.faults.failing_audit_tables.contains(&entry.table_name)
        {
            return Err(WardenError::Database(format!(
                "injected audit failure for {}",
                entry.table_name
            )));
        }
        state.audit.push(entry.clone());
        Ok(())
    }

    async fn query_audit_entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let state = self.state.lock().await;
        Ok(take(
            state.audit.iter().rev().filter(|e| filter.matches(e)).cloned(),
            filter.limit,
        ))
    }

    async fn count_sensitive_accesses(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .audit
            .iter()
            .filter(|e| {
                e.sensitive_flag
                    && e.timestamp >= since
                    && e.subject_id.as_deref() == Some(subject_id)
            })
            .count() as u64)
    }
}

#[async_trait]
impl ViolationStore for MemoryStore {
    async fn append_violation(&self, violation: &ComplianceViolation) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.faults.fail_violation_appends {
            return Err(WardenError::Database("injected violation failure".to_string()));
        }
        state.violations.push(violation.clone());
        Ok(())
    }

    async fn append_if_absent(
        &self,
        violation: &ComplianceViolation,
        window_start: DateTime<Utc>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.faults.fail_violation_appends {
            return Err(WardenError::Database("injected violation failure".to_string()));
        }
        let reported = state.violations.iter().any(|v| {
            v.violation_type == violation.violation_type
                && v.affected_subject_id == violation.affected_subject_id
                && v.detected_at >= window_start
        });
        if reported {
            return Ok(false);
        }
        state.violations.push(violation.clone());
        Ok(true)
    }

    async fn query_violations(&self, filter: &ViolationFilter) -> Result<Vec<ComplianceViolation>> {
        let state = self.state.lock().await;
        Ok(take(
            state
                .violations
                .iter()
                .rev()
                .filter(|v| filter.matches(v))
                .cloned(),
            filter.limit,
        ))
    }
}

#[async_trait]
impl JobStore for MemoryStore {
    async fn insert_job(&self, job: &AnonymizationJob) -> Result<()> {
        let mut state = self.state.lock().await;
        if state.jobs.iter().any(|j| j.id == job.id) {
            return Err(WardenError::Database(format!("Duplicate job id {}", job.id)));
        }
        state.jobs.push(job.clone());
        Ok(())
    }

    async fn save_progress(&self, job: &AnonymizationJob) -> Result<()> {
        let mut state = self.state.lock().await;
        let stored = state
            .jobs
            .iter_mut()
            .find(|j| j.id == job.id)
            .ok_or_else(|| WardenError::JobNotFound(job.id.to_string()))?;

        stored.status = job.status;
        stored.processed_count = job.processed_count;
        stored.anonymized_count = job.anonymized_count;
        stored.error_log = job.error_log.clone();
        stored.started_at = job.started_at;
        stored.completed_at = job.completed_at;
        Ok(())
    }

    async fn claim_job(&self, id: JobId, started_at: DateTime<Utc>) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state
            .jobs
            .iter_mut()
            .find(|j| j.id == id && j.status == JobStatus::Pending)
        {
            Some(job) => {
                job.status = JobStatus::Running;
                job.started_at = Some(started_at);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn get_job(&self, id: JobId) -> Result<Option<AnonymizationJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().find(|j| j.id == id).cloned())
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<AnonymizationJob>> {
        let state = self.state.lock().await;
        Ok(state.jobs.iter().rev().take(limit).cloned().collect())
    }

    async fn request_cancellation(&self, id: JobId) -> Result<bool> {
        let mut state = self.state.lock().await;
        match state.jobs.iter_mut().find(|j| j.id == id) {
            Some(job) => {
                job.cancellation_requested = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_cancellation_requested(&self, id: JobId) -> Result<bool> {
        let state = self.state.lock().await;
        state
            .jobs
            .iter()
            .find(|j| j.id == id)
            .map(|j| j.cancellation_requested)
            .ok_or_else(|| WardenError::JobNotFound(id.to_string()))
    }
}

#[async_trait]
impl RecordStore for MemoryStore {
    async fn count_records(&self, table: &TableName, predicate: &FilterPredicate) -> Result<u64> {
        let state = self.state.lock().await;
        if state.faults.fail_enumeration {
            return Err(WardenError::Database("injected enumeration failure".to_string()));
        }
        let table = state
            .tables
            .get(table.as_str())
            .ok_or_else(|| WardenError::Database(format!("Unknown table: {table}")))?;
        Ok(table.rows.values().filter(|r| predicate.matches(r)).count() as u64)
    }

    async fn fetch_batch(
        &self,
        table: &TableName,
        predicate: &FilterPredicate,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>> {
        let state = self.state.lock().await;
        if state.faults.fail_enumeration {
            return Err(WardenError::Database("injected enumeration failure".to_string()));
        }
        let table = state
            .tables
            .get(table.as_str())
            .ok_or_else(|| WardenError::Database(format!("Unknown table: {table}")))?;

        Ok(table
            .rows
            .iter()
            .filter(|(id, _)| after_id.map_or(true, |after| id.as_str() > after))
            .filter(|(_, row)| predicate.matches(row))
            .take(limit)
            .map(|(id, row)| SourceRecord {
                id: id.clone(),
                fields: row.clone(),
            })
            .collect())
    }

    async fn persist_anonymized_record(
        &self,
        table: &TableName,
        record_id: &str,
        fields: &Map<String, Value>,
        erasure: &ErasureLogEntry,
    ) -> Result<()> {
        let delay = self
            .state
            .lock()
            .await
            .faults
            .record_delays
            .get(record_id)
            .copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().await;
        if state.faults.failing_records.contains(record_id) {
            return Err(WardenError::Database(format!(
                "injected write failure for record {record_id}"
            )));
        }

        let row = state
            .tables
            .get_mut(table.as_str())
            .and_then(|t| t.rows.get_mut(record_id))
            .ok_or_else(|| {
                WardenError::Database(format!("Record {record_id} no longer exists in {table}"))
            })?;
        for (name, value) in fields {
            row.insert(name.clone(), value.clone());
        }
        state.erasures.push(erasure.clone());
        Ok(())
    }

    async fn query_erasures(&self, filter: &ErasureFilter) -> Result<Vec<ErasureLogEntry>> {
        let state = self.state.lock().await;
        Ok(take(
            state.erasures.iter().rev().filter(|e| filter.matches(e)).cloned(),
            filter.limit,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::job::Algorithm;
    use serde_json::json;

    async fn store_with_patients() -> MemoryStore {
        let store = MemoryStore::new();
        store
            .create_table("patients", &[("id", "integer"), ("name", "text"), ("age", "integer")])
            .await;
        for (id, name, age) in [(1, "Li Wei", 34), (2, "Zhang Min", 58), (10, "Wang Fang", 41)] {
            store
                .insert_row("patients", json!({"id": id, "name": name, "age": age}))
                .await
                .unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_keyset_pagination_uses_text_order() {
        let store = store_with_patients().await;
        let table = TableName::new("patients").unwrap();
        let all = FilterPredicate::all();

        let first = store.fetch_batch(&table, &all, None, 2).await.unwrap();
        let ids: Vec<&str> = first.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "10"]);

        let rest = store.fetch_batch(&table, &all, Some("10"), 2).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].id, "2");
    }

    #[tokio::test]
    async fn test_count_with_predicate() {
        let store = store_with_patients().await;
        let table = TableName::new("patients").unwrap();
        let predicate = FilterPredicate::parse("age >= 40").unwrap();
        assert_eq!(store.count_records(&table, &predicate).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_persist_updates_row_and_logs_erasure() {
        let store = store_with_patients().await;
        let table = TableName::new("patients").unwrap();
        let mut fields = Map::new();
        fields.insert("name".to_string(), json!("abc123"));
        let erasure = ErasureLogEntry::anonymization(
            JobId::new(),
            "patients",
            "1",
            None,
            Algorithm::Pseudonymization,
            "test",
        );

        store
            .persist_anonymized_record(&table, "1", &fields, &erasure)
            .await
            .unwrap();

        let row = store.row("patients", "1").await.unwrap();
        assert_eq!(row["name"], json!("abc123"));
        assert_eq!(row["age"], json!(34));
        assert_eq!(store.erasures().await.len(), 1);
    }

    #[tokio::test]
    async fn test_injected_record_failure_leaves_no_erasure() {
        let store = store_with_patients().await;
        store.fail_record("2").await;
        let table = TableName::new("patients").unwrap();
        let erasure = ErasureLogEntry::anonymization(
            JobId::new(),
            "patients",
            "2",
            None,
            Algorithm::Pseudonymization,
            "test",
        );

        let result = store
            .persist_anonymized_record(&table, "2", &Map::new(), &erasure)
            .await;
        assert!(result.is_err());
        assert!(store.erasures().await.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_table_has_no_columns() {
        let store = MemoryStore::new();
        let cols = store
            .describe_table(&TableName::new("ghosts").unwrap())
            .await
            .unwrap();
        assert!(cols.is_empty());
    }

    #[tokio::test]
    async fn test_second_claim_fails() {
        let store = MemoryStore::new();
        let job = AnonymizationJob::pending(
            crate::domain::job::JobRequest {
                target_table: TableName::new("patients").unwrap(),
                filter_predicate: FilterPredicate::all(),
                algorithm: Algorithm::Pseudonymization,
                algorithm_params: Default::default(),
            },
            Vec::new(),
            0,
        );
        store.insert_job(&job).await.unwrap();

        assert!(store.claim_job(job.id, Utc::now()).await.unwrap());
        assert!(!store.claim_job(job.id, Utc::now()).await.unwrap());
        assert!(!store.claim_job(JobId::new(), Utc::now()).await.unwrap());

        let stored = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Running);
        assert!(stored.started_at.is_some());
    }
}
