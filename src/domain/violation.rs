//! Compliance violation domain model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Category of detected anomaly
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ViolationType {
    /// A record was read after its table's retention window elapsed
    RetentionExceeded,
    /// A subject's sensitive data was accessed unusually often
    UnusualAccessPattern,
}

impl ViolationType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RetentionExceeded => "retention_exceeded",
            Self::UnusualAccessPattern => "unusual_access_pattern",
        }
    }
}

impl fmt::Display for ViolationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViolationType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "retention_exceeded" => Ok(Self::RetentionExceeded),
            "unusual_access_pattern" => Ok(Self::UnusualAccessPattern),
            _ => Err(format!("Unknown violation type: {s}")),
        }
    }
}

/// Violation severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            _ => Err(format!("Unknown severity: {s}")),
        }
    }
}

/// How a violation was raised
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Automated,
    Manual,
}

impl DetectionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Automated => "automated",
            Self::Manual => "manual",
        }
    }
}

impl FromStr for DetectionMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "automated" => Ok(Self::Automated),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("Unknown detection method: {s}")),
        }
    }
}

/// Append-only record of a detected compliance anomaly
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplianceViolation {
    pub id: Uuid,
    pub violation_type: ViolationType,
    pub severity: Severity,
    pub description: String,
    pub affected_table: String,
    pub affected_record_id: Option<String>,
    pub affected_subject_id: Option<String>,
    /// Audit entries that triggered the detection
    pub audit_entry_ids: Vec<Uuid>,
    pub detected_at: DateTime<Utc>,
    pub detection_method: DetectionMethod,
}

impl ComplianceViolation {
    /// Create an automated violation detected now
    pub fn automated(
        violation_type: ViolationType,
        severity: Severity,
        description: impl Into<String>,
        affected_table: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            violation_type,
            severity,
            description: description.into(),
            affected_table: affected_table.into(),
            affected_record_id: None,
            affected_subject_id: None,
            audit_entry_ids: Vec::new(),
            detected_at: Utc::now(),
            detection_method: DetectionMethod::Automated,
        }
    }

    /// Sets the affected record
    pub fn with_record_id(mut self, record_id: Option<String>) -> Self {
        self.affected_record_id = record_id;
        self
    }

    /// Sets the affected subject
    pub fn with_subject_id(mut self, subject_id: Option<String>) -> Self {
        self.affected_subject_id = subject_id;
        self
    }

    /// Links the triggering audit entry
    pub fn referencing(mut self, audit_entry_id: Uuid) -> Self {
        self.audit_entry_ids.push(audit_entry_id);
        self
    }
}

/// Query filter for violations
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ViolationFilter {
    pub violation_type: Option<ViolationType>,
    pub min_severity: Option<Severity>,
    pub affected_table: Option<String>,
    pub affected_subject_id: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl ViolationFilter {
    /// Check whether a violation passes the filter (limit is not considered)
    pub fn matches(&self, violation: &ComplianceViolation) -> bool {
        self.violation_type
            .map_or(true, |t| violation.violation_type == t)
            && self.min_severity.map_or(true, |s| violation.severity >= s)
            && self
                .affected_table
                .as_ref()
                .map_or(true, |t| &violation.affected_table == t)
            && self
                .affected_subject_id
                .as_ref()
                .map_or(true, |s| violation.affected_subject_id.as_ref() == Some(s))
            && self.since.map_or(true, |since| violation.detected_at >= since)
    }
}
