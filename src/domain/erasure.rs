//! Erasure log domain model
//!
//! Erasure entries mark permanent, irreversible transformations and are kept
//! apart from the reversible audit history.

use crate::domain::ids::JobId;
use crate::domain::job::Algorithm;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of irreversible action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErasureType {
    Anonymization,
}

impl ErasureType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Anonymization => "anonymization",
        }
    }
}

/// Append-only record of one anonymized record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErasureLogEntry {
    pub id: Uuid,
    pub job_id: JobId,
    pub subject_id: Option<String>,
    pub table_name: String,
    pub record_id: String,
    pub erasure_type: ErasureType,
    pub algorithm: Algorithm,
    pub performed_by: String,
    pub timestamp: DateTime<Utc>,
}

impl ErasureLogEntry {
    /// Create an anonymization entry stamped now
    pub fn anonymization(
        job_id: JobId,
        table_name: impl Into<String>,
        record_id: impl Into<String>,
        subject_id: Option<String>,
        algorithm: Algorithm,
        performed_by: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            subject_id,
            table_name: table_name.into(),
            record_id: record_id.into(),
            erasure_type: ErasureType::Anonymization,
            algorithm,
            performed_by: performed_by.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Query filter for the erasure log
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ErasureFilter {
    pub job_id: Option<JobId>,
    pub table_name: Option<String>,
    pub subject_id: Option<String>,
    pub limit: Option<usize>,
}

impl ErasureFilter {
    pub fn matches(&self, entry: &ErasureLogEntry) -> bool {
        self.job_id.map_or(true, |id| entry.job_id == id)
            && self
                .table_name
                .as_ref()
                .map_or(true, |t| &entry.table_name == t)
            && self
                .subject_id
                .as_ref()
                .map_or(true, |s| entry.subject_id.as_ref() == Some(s))
    }
}
