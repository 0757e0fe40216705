//! PostgreSQL adapter implementing the storage traits
//!
//! Target tables are addressed generically: rows are read with
//! `row_to_json` and written back through `json_populate_record`, so no
//! per-table structs are needed. Table and column names are validated
//! identifiers and are always double-quoted.

use crate::adapters::database::traits::{
    AuditStore, ColumnInfo, JobStore, RecordStore, SchemaDescriptor, SourceRecord, StorageAdmin,
    ViolationStore,
};
use crate::adapters::postgresql::client::PostgreSQLClient;
use crate::adapters::postgresql::models::{
    audit_entry_from_row, erasure_from_row, job_from_row, to_db_count, violation_from_row,
    AUDIT_COLUMNS, ERASURE_COLUMNS, JOB_COLUMNS, VIOLATION_COLUMNS,
};
use crate::domain::audit::{AuditEntry, AuditFilter};
use crate::domain::erasure::{ErasureFilter, ErasureLogEntry};
use crate::domain::filter::{value_as_datetime, Comparison, FilterPredicate};
use crate::domain::ids::{is_valid_identifier, JobId, TableName};
use crate::domain::job::{AnonymizationJob, JobStatus};
use crate::domain::violation::{ComplianceViolation, ViolationFilter};
use crate::domain::{Result, WardenError};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_postgres::types::ToSql;

/// Parameterized `WHERE` clause under construction
#[derive(Default)]
struct WhereClause {
    clauses: Vec<String>,
    params: Vec<Box<dyn ToSql + Sync + Send>>,
}

impl WhereClause {
    /// Register a parameter and return its placeholder
    fn param<T: ToSql + Sync + Send + 'static>(&mut self, value: T) -> String {
        self.params.push(Box::new(value));
        format!("${}", self.params.len())
    }

    fn and(&mut self, clause: impl Into<String>) {
        self.clauses.push(clause.into());
    }

    fn sql(&self) -> String {
        if self.clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", self.clauses.join(" AND "))
        }
    }

    fn params(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params
            .iter()
            .map(|p| &**p as &(dyn ToSql + Sync))
            .collect()
    }

    /// Translate a record predicate against the alias `t`
    fn push_predicate(&mut self, predicate: &FilterPredicate) -> Result<()> {
        for condition in &predicate.conditions {
            if !is_valid_identifier(&condition.field) {
                return Err(WardenError::JobValidation(format!(
                    "Invalid field name in filter: {}",
                    condition.field
                )));
            }
            let column = format!("t.\"{}\"", condition.field);
            let op = condition.op.sql();

            if !condition.op.takes_value() {
                self.and(format!("{column} {op}"));
                continue;
            }

            let clause = match &condition.value {
                Value::Number(n) => {
                    let p = self.param(n.to_string());
                    format!("{column} {op} ({p}::text)::numeric")
                }
                Value::Bool(b) => {
                    let p = self.param(b.to_string());
                    format!("{column} {op} ({p}::text)::boolean")
                }
                Value::String(s) if value_as_datetime(&condition.value).is_some() => {
                    let p = self.param(s.clone());
                    format!("{column} {op} ({p}::text)::timestamptz")
                }
                Value::String(s) => {
                    let p = self.param(s.clone());
                    format!("{column}::text {op} {p}::text")
                }
                Value::Null if condition.op == Comparison::Eq => format!("{column} IS NULL"),
                Value::Null if condition.op == Comparison::Ne => format!("{column} IS NOT NULL"),
                other => {
                    return Err(WardenError::JobValidation(format!(
                        "Unsupported filter value for {}: {other}",
                        condition.field
                    )))
                }
            };
            self.and(clause);
        }
        Ok(())
    }
}

fn limit_clause(limit: Option<usize>) -> String {
    limit.map(|l| format!(" LIMIT {l}")).unwrap_or_default()
}

/// PostgreSQL implementation of every storage capability
pub struct PostgreSQLAdapter {
    client: Arc<PostgreSQLClient>,
}

impl PostgreSQLAdapter {
    pub fn new(client: PostgreSQLClient) -> Self {
        Self {
            client: Arc::new(client),
        }
    }

    /// Get a reference to the underlying client
    pub fn client(&self) -> &Arc<PostgreSQLClient> {
        &self.client
    }
}

#[async_trait]
impl StorageAdmin for PostgreSQLAdapter {
    async fn test_connection(&self) -> Result<()> {
        self.client.test_connection().await
    }

    async fn run_migrations(&self) -> Result<()> {
        self.client.ensure_schema().await
    }

    fn describe(&self) -> String {
        self.client.connection_string_safe()
    }
}

#[async_trait]
impl SchemaDescriptor for PostgreSQLAdapter {
    async fn describe_table(&self, table: &TableName) -> Result<Vec<ColumnInfo>> {
        let rows = self
            .client
            .query(
                "SELECT column_name::text AS name, data_type::text AS declared_type \
                 FROM information_schema.columns \
                 WHERE table_schema = current_schema() AND table_name = $1 \
                 ORDER BY ordinal_position",
                &[&table.as_str()],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let name: String = row
                    .try_get("name")
                    .map_err(|e| WardenError::Database(e.to_string()))?;
                let declared: String = row
                    .try_get("declared_type")
                    .map_err(|e| WardenError::Database(e.to_string()))?;
                Ok(ColumnInfo::new(name, declared))
            })
            .collect()
    }
}

#[async_trait]
impl AuditStore for PostgreSQLAdapter {
    async fn append_audit_entry(&self, entry: &AuditEntry) -> Result<()> {
        let categories: Vec<String> = entry.data_categories.iter().cloned().collect();
        let retention = i32::try_from(entry.retention_days).unwrap_or(i32::MAX);
        let operation = entry.operation.as_str();
        let risk = entry.breach_risk_level.as_str();

        self.client
            .execute(
                &format!(
                    "INSERT INTO audit_log ({AUDIT_COLUMNS}) VALUES \
                     ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, $19)"
                ),
                &[
                    &entry.id,
                    &entry.table_name,
                    &operation,
                    &entry.record_id,
                    &entry.subject_id,
                    &entry.before_snapshot,
                    &entry.after_snapshot,
                    &entry.actor_id,
                    &entry.session_id,
                    &entry.request_id,
                    &categories,
                    &entry.processing_purpose,
                    &entry.legal_basis,
                    &entry.sensitive_flag,
                    &retention,
                    &risk,
                    &entry.ip_address,
                    &entry.user_agent,
                    &entry.timestamp,
                ],
            )
            .await?;
        Ok(())
    }

    async fn query_audit_entries(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        let mut clause = WhereClause::default();
        if let Some(ref table) = filter.table_name {
            let p = clause.param(table.clone());
            clause.and(format!("table_name = {p}"));
        }
        if let Some(ref actor) = filter.actor_id {
            let p = clause.param(actor.clone());
            clause.and(format!("actor_id = {p}"));
        }
        if let Some(ref subject) = filter.subject_id {
            let p = clause.param(subject.clone());
            clause.and(format!("subject_id = {p}"));
        }
        if let Some(op) = filter.operation {
            let p = clause.param(op.as_str().to_string());
            clause.and(format!("operation = {p}"));
        }
        if filter.sensitive_only {
            clause.and("sensitive_flag");
        }
        if let Some(level) = filter.min_risk_level {
            let p = clause.param(level.as_str().to_string());
            clause.and(format!(
                "array_position(ARRAY['low','medium','high','critical'], breach_risk_level) \
                 >= array_position(ARRAY['low','medium','high','critical'], {p})"
            ));
        }
        if let Some(since) = filter.since {
            let p = clause.param(since);
            clause.and(format!("created_at >= {p}"));
        }
        if let Some(until) = filter.until {
            let p = clause.param(until);
            clause.and(format!("created_at <= {p}"));
        }

        let sql = format!(
            "SELECT {AUDIT_COLUMNS} FROM audit_log{} ORDER BY created_at DESC{}",
            clause.sql(),
            limit_clause(filter.limit)
        );
        let rows = self.client.query(&sql, &clause.params()).await?;
        rows.iter().map(audit_entry_from_row).collect()
    }

    async fn count_sensitive_accesses(
        &self,
        subject_id: &str,
        since: DateTime<Utc>,
    ) -> Result<u64> {
        let row = self
            .client
            .query_one(
                "SELECT COUNT(*) AS n FROM audit_log \
                 WHERE subject_id = $1 AND sensitive_flag AND created_at >= $2",
                &[&subject_id, &since],
            )
            .await?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| WardenError::Database(e.to_string()))?;
        Ok(n.max(0) as u64)
    }
}

#[async_trait]
impl ViolationStore for PostgreSQLAdapter {
    async fn append_violation(&self, violation: &ComplianceViolation) -> Result<()> {
        let violation_type = violation.violation_type.as_str();
        let severity = violation.severity.as_str();
        let method = violation.detection_method.as_str();

        self.client
            .execute(
                &format!(
                    "INSERT INTO compliance_violations ({VIOLATION_COLUMNS}) VALUES \
                     ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)"
                ),
                &[
                    &violation.id,
                    &violation_type,
                    &severity,
                    &violation.description,
                    &violation.affected_table,
                    &violation.affected_record_id,
                    &violation.affected_subject_id,
                    &violation.audit_entry_ids,
                    &method,
                    &violation.detected_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn append_if_absent(
        &self,
        violation: &ComplianceViolation,
        window_start: DateTime<Utc>,
    ) -> Result<bool> {
        let violation_type = violation.violation_type.as_str();
        let severity = violation.severity.as_str();
        let method = violation.detection_method.as_str();
        let lock_key = format!(
            "{violation_type}:{}",
            violation.affected_subject_id.as_deref().unwrap_or_default()
        );

        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| WardenError::Database(format!("Failed to begin transaction: {e}")))?;

        // Serializes concurrent detections for one subject until commit
        tx.execute("SELECT pg_advisory_xact_lock(hashtext($1))", &[&lock_key])
            .await
            .map_err(|e| WardenError::Database(format!("Advisory lock failed: {e}")))?;

        let inserted = tx
            .execute(
                format!(
                    "INSERT INTO compliance_violations ({VIOLATION_COLUMNS}) \
                     SELECT $1::uuid, $2::text, $3::text, $4::text, $5::text, $6::text, \
                     $7::text, $8::uuid[], $9::text, $10::timestamptz \
                     WHERE NOT EXISTS (SELECT 1 FROM compliance_violations \
                     WHERE violation_type = $2 AND affected_subject_id IS NOT DISTINCT FROM $7 \
                     AND detected_at >= $11)"
                )
                .as_str(),
                &[
                    &violation.id,
                    &violation_type,
                    &severity,
                    &violation.description,
                    &violation.affected_table,
                    &violation.affected_record_id,
                    &violation.affected_subject_id,
                    &violation.audit_entry_ids,
                    &method,
                    &violation.detected_at,
                    &window_start,
                ],
            )
            .await
            .map_err(|e| WardenError::Database(format!("Violation insert failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| WardenError::Database(format!("Commit failed: {e}")))?;
        Ok(inserted == 1)
    }

    async fn query_violations(&self, filter: &ViolationFilter) -> Result<Vec<ComplianceViolation>> {
        let mut clause = WhereClause::default();
        if let Some(t) = filter.violation_type {
            let p = clause.param(t.as_str().to_string());
            clause.and(format!("violation_type = {p}"));
        }
        if let Some(s) = filter.min_severity {
            let p = clause.param(s.as_str().to_string());
            clause.and(format!(
                "array_position(ARRAY['low','medium','high'], severity) \
                 >= array_position(ARRAY['low','medium','high'], {p})"
            ));
        }
        if let Some(ref table) = filter.affected_table {
            let p = clause.param(table.clone());
            clause.and(format!("affected_table = {p}"));
        }
        if let Some(ref subject) = filter.affected_subject_id {
            let p = clause.param(subject.clone());
            clause.and(format!("affected_subject_id = {p}"));
        }
        if let Some(since) = filter.since {
            let p = clause.param(since);
            clause.and(format!("detected_at >= {p}"));
        }

        let sql = format!(
            "SELECT {VIOLATION_COLUMNS} FROM compliance_violations{} ORDER BY detected_at DESC{}",
            clause.sql(),
            limit_clause(filter.limit)
        );
        let rows = self.client.query(&sql, &clause.params()).await?;
        rows.iter().map(violation_from_row).collect()
    }
}

#[async_trait]
impl JobStore for PostgreSQLAdapter {
    async fn insert_job(&self, job: &AnonymizationJob) -> Result<()> {
        let filter = serde_json::to_value(&job.filter_predicate)?;
        let params = serde_json::to_value(&job.algorithm_params)?;
        let rules = serde_json::to_value(&job.field_rules)?;
        let errors = serde_json::to_value(&job.error_log)?;
        let algorithm = job.algorithm.as_str();
        let status = job.status.as_str();

        self.client
            .execute(
                &format!(
                    "INSERT INTO anonymization_jobs ({JOB_COLUMNS}) VALUES \
                     ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)"
                ),
                &[
                    job.id.as_uuid(),
                    &job.target_table.as_str(),
                    &filter,
                    &algorithm,
                    &params,
                    &rules,
                    &to_db_count(job.estimated_record_count),
                    &to_db_count(job.processed_count),
                    &to_db_count(job.anonymized_count),
                    &status,
                    &errors,
                    &job.cancellation_requested,
                    &job.created_at,
                    &job.started_at,
                    &job.completed_at,
                ],
            )
            .await?;
        Ok(())
    }

    async fn save_progress(&self, job: &AnonymizationJob) -> Result<()> {
        let errors = serde_json::to_value(&job.error_log)?;
        let status = job.status.as_str();

        let updated = self
            .client
            .execute(
                "UPDATE anonymization_jobs SET status = $2, processed_count = $3, \
                 anonymized_count = $4, error_log = $5, started_at = $6, completed_at = $7 \
                 WHERE id = $1",
                &[
                    job.id.as_uuid(),
                    &status,
                    &to_db_count(job.processed_count),
                    &to_db_count(job.anonymized_count),
                    &errors,
                    &job.started_at,
                    &job.completed_at,
                ],
            )
            .await?;

        if updated == 0 {
            return Err(WardenError::JobNotFound(job.id.to_string()));
        }
        Ok(())
    }

    async fn claim_job(&self, id: JobId, started_at: DateTime<Utc>) -> Result<bool> {
        let claimed = self
            .client
            .execute(
                "UPDATE anonymization_jobs SET status = $3, started_at = $2 \
                 WHERE id = $1 AND status = $4",
                &[
                    id.as_uuid(),
                    &started_at,
                    &JobStatus::Running.as_str(),
                    &JobStatus::Pending.as_str(),
                ],
            )
            .await?;
        Ok(claimed == 1)
    }

    async fn get_job(&self, id: JobId) -> Result<Option<AnonymizationJob>> {
        let rows = self
            .client
            .query(
                &format!("SELECT {JOB_COLUMNS} FROM anonymization_jobs WHERE id = $1"),
                &[id.as_uuid()],
            )
            .await?;
        rows.first().map(job_from_row).transpose()
    }

    async fn list_jobs(&self, limit: usize) -> Result<Vec<AnonymizationJob>> {
        let rows = self
            .client
            .query(
                &format!(
                    "SELECT {JOB_COLUMNS} FROM anonymization_jobs ORDER BY created_at DESC{}",
                    limit_clause(Some(limit))
                ),
                &[],
            )
            .await?;
        rows.iter().map(job_from_row).collect()
    }

    async fn request_cancellation(&self, id: JobId) -> Result<bool> {
        let updated = self
            .client
            .execute(
                "UPDATE anonymization_jobs SET cancellation_requested = TRUE WHERE id = $1",
                &[id.as_uuid()],
            )
            .await?;
        Ok(updated > 0)
    }

    async fn is_cancellation_requested(&self, id: JobId) -> Result<bool> {
        let rows = self
            .client
            .query(
                "SELECT cancellation_requested FROM anonymization_jobs WHERE id = $1",
                &[id.as_uuid()],
            )
            .await?;
        match rows.first() {
            Some(row) => row
                .try_get(0)
                .map_err(|e| WardenError::Database(e.to_string())),
            None => Err(WardenError::JobNotFound(id.to_string())),
        }
    }
}

#[async_trait]
impl RecordStore for PostgreSQLAdapter {
    async fn count_records(&self, table: &TableName, predicate: &FilterPredicate) -> Result<u64> {
        let mut clause = WhereClause::default();
        clause.push_predicate(predicate)?;

        let sql = format!(
            "SELECT COUNT(*) AS n FROM \"{}\" t{}",
            table.as_str(),
            clause.sql()
        );
        let row = self.client.query_one(&sql, &clause.params()).await?;
        let n: i64 = row
            .try_get("n")
            .map_err(|e| WardenError::Database(e.to_string()))?;
        Ok(n.max(0) as u64)
    }

    async fn fetch_batch(
        &self,
        table: &TableName,
        predicate: &FilterPredicate,
        after_id: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SourceRecord>> {
        let mut clause = WhereClause::default();
        clause.push_predicate(predicate)?;
        if let Some(after) = after_id {
            let p = clause.param(after.to_string());
            clause.and(format!("t.id::text > {p}"));
        }

        let sql = format!(
            "SELECT t.id::text AS record_id, row_to_json(t)::jsonb AS data FROM \"{}\" t{} \
             ORDER BY t.id::text LIMIT {limit}",
            table.as_str(),
            clause.sql()
        );
        let rows = self.client.query(&sql, &clause.params()).await?;

        rows.iter()
            .map(|row| {
                let id: String = row
                    .try_get("record_id")
                    .map_err(|e| WardenError::Database(e.to_string()))?;
                let data: Value = row
                    .try_get("data")
                    .map_err(|e| WardenError::Database(e.to_string()))?;
                match data {
                    Value::Object(fields) => Ok(SourceRecord { id, fields }),
                    _ => Err(WardenError::Database(format!(
                        "Row {id} of {table} is not a JSON object"
                    ))),
                }
            })
            .collect()
    }

    async fn persist_anonymized_record(
        &self,
        table: &TableName,
        record_id: &str,
        fields: &Map<String, Value>,
        erasure: &ErasureLogEntry,
    ) -> Result<()> {
        let mut conn = self.client.get_connection().await?;
        let tx = conn
            .transaction()
            .await
            .map_err(|e| WardenError::Database(format!("Failed to begin transaction: {e}")))?;

        if !fields.is_empty() {
            let mut columns = Vec::with_capacity(fields.len());
            for name in fields.keys() {
                if !is_valid_identifier(name) {
                    return Err(WardenError::Validation(format!("Invalid column name: {name}")));
                }
                columns.push(format!("\"{name}\""));
            }
            let columns = columns.join(", ");
            let sql = format!(
                "UPDATE \"{table}\" AS t SET ({columns}) = \
                 (SELECT {columns} FROM json_populate_record(NULL::\"{table}\", $1::json)) \
                 WHERE t.id::text = $2",
                table = table.as_str()
            );
            let payload = Value::Object(fields.clone());
            let updated = tx
                .execute(sql.as_str(), &[&payload, &record_id])
                .await
                .map_err(|e| WardenError::Database(format!("Record update failed: {e}")))?;
            if updated == 0 {
                return Err(WardenError::Database(format!(
                    "Record {record_id} no longer exists in {table}"
                )));
            }
        }

        let erasure_type = erasure.erasure_type.as_str();
        let algorithm = erasure.algorithm.as_str();
        tx.execute(
            format!(
                "INSERT INTO data_erasure_log ({ERASURE_COLUMNS}) VALUES \
                 ($1, $2, $3, $4, $5, $6, $7, $8, $9)"
            )
            .as_str(),
            &[
                &erasure.id,
                erasure.job_id.as_uuid(),
                &erasure.subject_id,
                &erasure.table_name,
                &erasure.record_id,
                &erasure_type,
                &algorithm,
                &erasure.performed_by,
                &erasure.timestamp,
            ],
        )
        .await
        .map_err(|e| WardenError::Database(format!("Erasure log insert failed: {e}")))?;

        tx.commit()
            .await
            .map_err(|e| WardenError::Database(format!("Commit failed: {e}")))
    }

    async fn query_erasures(&self, filter: &ErasureFilter) -> Result<Vec<ErasureLogEntry>> {
        let mut clause = WhereClause::default();
        if let Some(job_id) = filter.job_id {
            let p = clause.param(*job_id.as_uuid());
            clause.and(format!("job_id = {p}"));
        }
        if let Some(ref table) = filter.table_name {
            let p = clause.param(table.clone());
            clause.and(format!("table_name = {p}"));
        }
        if let Some(ref subject) = filter.subject_id {
            let p = clause.param(subject.clone());
            clause.and(format!("subject_id = {p}"));
        }

        let sql = format!(
            "SELECT {ERASURE_COLUMNS} FROM data_erasure_log{} ORDER BY created_at DESC{}",
            clause.sql(),
            limit_clause(filter.limit)
        );
        let rows = self.client.query(&sql, &clause.params()).await?;
        rows.iter().map(erasure_from_row).collect()
    }
}
