//! Anonymization job domain model
//!
//! Jobs move strictly `pending → running → completed | failed`. Only the
//! progress fields change after creation.

use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::rule::FieldRule;
use crate::domain::{Result, WardenError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Anonymization algorithm requested for a job
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    KAnonymity,
    LDiversity,
    DifferentialPrivacy,
    Pseudonymization,
}

impl Algorithm {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::KAnonymity => "k_anonymity",
            Self::LDiversity => "l_diversity",
            Self::DifferentialPrivacy => "differential_privacy",
            Self::Pseudonymization => "pseudonymization",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "k_anonymity" => Ok(Self::KAnonymity),
            "l_diversity" => Ok(Self::LDiversity),
            "differential_privacy" => Ok(Self::DifferentialPrivacy),
            "pseudonymization" => Ok(Self::Pseudonymization),
            _ => Err(format!(
                "Unknown algorithm '{s}'. Must be one of: k_anonymity, l_diversity, differential_privacy, pseudonymization"
            )),
        }
    }
}

/// Algorithm-specific job parameters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlgorithmParams {
    /// Minimum equivalence class size for k-anonymity
    #[serde(default)]
    pub k: Option<u32>,

    /// Distinct sensitive values per class for l-diversity
    #[serde(default)]
    pub l: Option<u32>,

    /// Privacy budget for differential privacy
    #[serde(default)]
    pub epsilon: Option<f64>,

    /// Quasi-identifier columns; derived from the rules when empty
    #[serde(default)]
    pub quasi_identifiers: Vec<String>,

    /// Sensitive attribute column for l-diversity
    #[serde(default)]
    pub sensitive_attribute: Option<String>,

    /// Overrides the configured date shift window
    #[serde(default)]
    pub max_date_shift_days: Option<u32>,

    /// Use one date offset for every date field of a record
    #[serde(default)]
    pub share_date_offset: bool,
}

impl AlgorithmParams {
    /// Validate parameters for the given algorithm
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::JobValidation`] when a required parameter is
    /// missing or out of range.
    pub fn validate(&self, algorithm: Algorithm) -> Result<()> {
        match algorithm {
            Algorithm::KAnonymity => match self.k {
                Some(k) if k >= 2 => {}
                Some(k) => {
                    return Err(WardenError::JobValidation(format!(
                        "k must be an integer >= 2, got {k}"
                    )))
                }
                None => {
                    return Err(WardenError::JobValidation(
                        "k_anonymity requires parameter k".to_string(),
                    ))
                }
            },
            Algorithm::LDiversity => {
                match self.l {
                    Some(l) if l >= 2 => {}
                    Some(l) => {
                        return Err(WardenError::JobValidation(format!(
                            "l must be an integer >= 2, got {l}"
                        )))
                    }
                    None => {
                        return Err(WardenError::JobValidation(
                            "l_diversity requires parameter l".to_string(),
                        ))
                    }
                }
                if self.sensitive_attribute.is_none() {
                    return Err(WardenError::JobValidation(
                        "l_diversity requires a sensitive_attribute".to_string(),
                    ));
                }
            }
            Algorithm::DifferentialPrivacy => match self.epsilon {
                Some(e) if e.is_finite() && e > 0.0 => {}
                Some(e) => {
                    return Err(WardenError::JobValidation(format!(
                        "epsilon must be a positive number, got {e}"
                    )))
                }
                None => {
                    return Err(WardenError::JobValidation(
                        "differential_privacy requires parameter epsilon".to_string(),
                    ))
                }
            },
            Algorithm::Pseudonymization => {}
        }

        if let Some(0) = self.max_date_shift_days {
            return Err(WardenError::JobValidation(
                "max_date_shift_days must be > 0".to_string(),
            ));
        }

        Ok(())
    }
}

/// Job lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is final
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Allowed lifecycle transitions
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Running)
                | (Self::Running, Self::Completed)
                | (Self::Running, Self::Failed)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(format!("Unknown job status: {s}")),
        }
    }
}

/// A request to start an anonymization job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRequest {
    pub target_table: TableName,
    #[serde(default)]
    pub filter_predicate: FilterPredicate,
    pub algorithm: Algorithm,
    #[serde(default)]
    pub algorithm_params: AlgorithmParams,
}

/// Returned to the caller as soon as a job is created
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobHandle {
    pub job_id: JobId,
    pub estimated_record_count: u64,
}

/// Unit of batch anonymization work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnonymizationJob {
    pub id: JobId,
    pub target_table: TableName,
    pub filter_predicate: FilterPredicate,
    pub algorithm: Algorithm,
    pub algorithm_params: AlgorithmParams,
    /// Rule set generated at creation; immutable afterwards
    pub field_rules: Vec<FieldRule>,
    pub estimated_record_count: u64,
    pub processed_count: u64,
    pub anonymized_count: u64,
    pub status: JobStatus,
    pub error_log: Vec<String>,
    pub cancellation_requested: bool,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl AnonymizationJob {
    /// Create a pending job from a validated request
    pub fn pending(request: JobRequest, field_rules: Vec<FieldRule>, estimate: u64) -> Self {
        Self {
            id: JobId::new(),
            target_table: request.target_table,
            filter_predicate: request.filter_predicate,
            algorithm: request.algorithm,
            algorithm_params: request.algorithm_params,
            field_rules,
            estimated_record_count: estimate,
            processed_count: 0,
            anonymized_count: 0,
            status: JobStatus::Pending,
            error_log: Vec::new(),
            cancellation_requested: false,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: JobStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(WardenError::Validation(format!(
                "Invalid job status transition {} -> {} for job {}",
                self.status, next, self.id
            )));
        }
        self.status = next;
        Ok(())
    }

    /// Move the job to running
    pub fn mark_running(&mut self) -> Result<()> {
        self.transition(JobStatus::Running)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// Move the job to completed
    pub fn mark_completed(&mut self) -> Result<()> {
        self.transition(JobStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Move the job to failed, recording the root cause
    pub fn mark_failed(&mut self, reason: impl Into<String>) -> Result<()> {
        self.transition(JobStatus::Failed)?;
        self.error_log.push(reason.into());
        self.completed_at = Some(Utc::now());
        Ok(())
    }

    /// Count a successfully anonymized record
    pub fn record_success(&mut self) {
        self.processed_count += 1;
        self.anonymized_count += 1;
    }

    /// Count a record that failed, keeping the job running
    pub fn record_failure(&mut self, record_id: &str, error: impl fmt::Display) {
        self.processed_count += 1;
        self.error_log.push(format!("record {record_id}: {error}"));
    }

    /// Number of records that failed
    pub fn failed_count(&self) -> u64 {
        self.processed_count - self.anonymized_count
    }
}
