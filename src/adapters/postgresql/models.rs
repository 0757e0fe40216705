//! Row mappings for the Warden tables
//!
//! Each `*_from_row` function maps one row of the corresponding table into
//! its domain type. Enum columns are stored as their `as_str` spelling.

use crate::domain::audit::{AuditEntry, BreachRiskLevel, Operation};
use crate::domain::erasure::{ErasureLogEntry, ErasureType};
use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::job::{Algorithm, AlgorithmParams, AnonymizationJob, JobStatus};
use crate::domain::rule::FieldRule;
use crate::domain::violation::{ComplianceViolation, DetectionMethod, Severity, ViolationType};
use crate::domain::{Result, WardenError};
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::BTreeSet;
use std::str::FromStr;
use tokio_postgres::types::FromSql;
use tokio_postgres::Row;
use uuid::Uuid;

/// Columns selected for audit entries, in `audit_entry_from_row` order
pub const AUDIT_COLUMNS: &str = "id, table_name, operation, record_id, subject_id, \
     before_snapshot, after_snapshot, actor_id, session_id, request_id, data_categories, \
     processing_purpose, legal_basis, sensitive_flag, retention_days, breach_risk_level, \
     ip_address, user_agent, created_at";

pub const VIOLATION_COLUMNS: &str = "id, violation_type, severity, description, affected_table, \
     affected_record_id, affected_subject_id, audit_entry_ids, detection_method, detected_at";

pub const JOB_COLUMNS: &str = "id, target_table, filter_predicate, algorithm, algorithm_params, \
     field_rules, estimated_record_count, processed_count, anonymized_count, status, error_log, \
     cancellation_requested, created_at, started_at, completed_at";

pub const ERASURE_COLUMNS: &str = "id, job_id, subject_id, table_name, record_id, erasure_type, \
     algorithm, performed_by, created_at";

fn column<'a, T: FromSql<'a>>(row: &'a Row, name: &str) -> Result<T> {
    row.try_get(name)
        .map_err(|e| WardenError::Database(format!("Failed to read column {name}: {e}")))
}

fn parse_column<T>(row: &Row, name: &str) -> Result<T>
where
    T: FromStr<Err = String>,
{
    let raw: String = column(row, name)?;
    T::from_str(&raw).map_err(WardenError::Database)
}

fn json_column<T: serde::de::DeserializeOwned>(row: &Row, name: &str) -> Result<T> {
    let raw: Value = column(row, name)?;
    serde_json::from_value(raw)
        .map_err(|e| WardenError::Serialization(format!("Invalid JSON in column {name}: {e}")))
}

fn count_column(row: &Row, name: &str) -> Result<u64> {
    let raw: i64 = column(row, name)?;
    u64::try_from(raw)
        .map_err(|_| WardenError::Database(format!("Negative value {raw} in column {name}")))
}

/// Convert an unsigned counter for storage in a BIGINT column
pub fn to_db_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

pub fn audit_entry_from_row(row: &Row) -> Result<AuditEntry> {
    let categories: Vec<String> = column(row, "data_categories")?;
    let retention: i32 = column(row, "retention_days")?;

    Ok(AuditEntry {
        id: column(row, "id")?,
        table_name: column(row, "table_name")?,
        operation: parse_column::<Operation>(row, "operation")?,
        record_id: column(row, "record_id")?,
        subject_id: column(row, "subject_id")?,
        before_snapshot: column(row, "before_snapshot")?,
        after_snapshot: column(row, "after_snapshot")?,
        actor_id: column(row, "actor_id")?,
        session_id: column(row, "session_id")?,
        request_id: column(row, "request_id")?,
        data_categories: categories.into_iter().collect::<BTreeSet<_>>(),
        processing_purpose: column(row, "processing_purpose")?,
        legal_basis: column(row, "legal_basis")?,
        sensitive_flag: column(row, "sensitive_flag")?,
        retention_days: u32::try_from(retention).map_err(|_| {
            WardenError::Database(format!("Invalid retention_days {retention}"))
        })?,
        breach_risk_level: parse_column::<BreachRiskLevel>(row, "breach_risk_level")?,
        ip_address: column(row, "ip_address")?,
        user_agent: column(row, "user_agent")?,
        timestamp: column::<DateTime<Utc>>(row, "created_at")?,
    })
}

pub fn violation_from_row(row: &Row) -> Result<ComplianceViolation> {
    Ok(ComplianceViolation {
        id: column(row, "id")?,
        violation_type: parse_column::<ViolationType>(row, "violation_type")?,
        severity: parse_column::<Severity>(row, "severity")?,
        description: column(row, "description")?,
        affected_table: column(row, "affected_table")?,
        affected_record_id: column(row, "affected_record_id")?,
        affected_subject_id: column(row, "affected_subject_id")?,
        audit_entry_ids: column::<Vec<Uuid>>(row, "audit_entry_ids")?,
        detected_at: column(row, "detected_at")?,
        detection_method: parse_column::<DetectionMethod>(row, "detection_method")?,
    })
}

pub fn job_from_row(row: &Row) -> Result<AnonymizationJob> {
    let table: String = column(row, "target_table")?;

    Ok(AnonymizationJob {
        id: JobId::from_uuid(column(row, "id")?),
        target_table: TableName::new(table).map_err(WardenError::Database)?,
        filter_predicate: json_column::<FilterPredicate>(row, "filter_predicate")?,
        algorithm: parse_column::<Algorithm>(row, "algorithm")?,
        algorithm_params: json_column::<AlgorithmParams>(row, "algorithm_params")?,
        field_rules: json_column::<Vec<FieldRule>>(row, "field_rules")?,
        estimated_record_count: count_column(row, "estimated_record_count")?,
        processed_count: count_column(row, "processed_count")?,
        anonymized_count: count_column(row, "anonymized_count")?,
        status: parse_column::<JobStatus>(row, "status")?,
        error_log: json_column::<Vec<String>>(row, "error_log")?,
        cancellation_requested: column(row, "cancellation_requested")?,
        created_at: column(row, "created_at")?,
        started_at: column(row, "started_at")?,
        completed_at: column(row, "completed_at")?,
    })
}

pub fn erasure_from_row(row: &Row) -> Result<ErasureLogEntry> {
    let erasure_type: String = column(row, "erasure_type")?;
    let erasure_type = match erasure_type.as_str() {
        "anonymization" => ErasureType::Anonymization,
        other => {
            return Err(WardenError::Database(format!(
                "Unknown erasure type: {other}"
            )))
        }
    };

    Ok(ErasureLogEntry {
        id: column(row, "id")?,
        job_id: JobId::from_uuid(column(row, "job_id")?),
        subject_id: column(row, "subject_id")?,
        table_name: column(row, "table_name")?,
        record_id: column(row, "record_id")?,
        erasure_type,
        algorithm: parse_column::<Algorithm>(row, "algorithm")?,
        performed_by: column(row, "performed_by")?,
        timestamp: column(row, "created_at")?,
    })
}
