//! Audit trail domain model
//!
//! An [`AuditEntry`] is written once per mutating (or sensitive read) operation
//! and is never updated or deleted afterwards.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Table name used for fallback entries when the primary audit write fails
pub const AUDIT_ERROR_TABLE: &str = "audit_error";

/// Kind of data operation being audited
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    /// Row created
    Insert,
    /// Row modified
    Update,
    /// Row removed
    Delete,
    /// Row read in a context that requires auditing
    Select,
}

impl Operation {
    /// String form used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
            Self::Delete => "delete",
            Self::Select => "select",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "insert" | "create" => Ok(Self::Insert),
            "update" => Ok(Self::Update),
            "delete" => Ok(Self::Delete),
            "select" | "read" => Ok(Self::Select),
            _ => Err(format!("Unknown operation: {s}")),
        }
    }
}

/// Coarse breach severity assigned to every audit entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BreachRiskLevel {
    Low,
    Medium,
    High,
    Critical,
}

impl BreachRiskLevel {
    /// Derive the risk level from sensitivity and operation
    ///
    /// # Examples
    ///
    /// ```
    /// use warden::domain::audit::{BreachRiskLevel, Operation};
    ///
    /// assert_eq!(BreachRiskLevel::assess(true, Operation::Delete), BreachRiskLevel::Critical);
    /// assert_eq!(BreachRiskLevel::assess(false, Operation::Delete), BreachRiskLevel::Low);
    /// ```
    pub fn assess(sensitive: bool, operation: Operation) -> Self {
        match (sensitive, operation) {
            (true, Operation::Delete) => Self::Critical,
            (true, Operation::Update) => Self::High,
            (true, _) => Self::Medium,
            (false, _) => Self::Low,
        }
    }

    /// String form used in storage and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl fmt::Display for BreachRiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BreachRiskLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "critical" => Ok(Self::Critical),
            _ => Err(format!("Unknown breach risk level: {s}")),
        }
    }
}

/// Per-operation processing context attached by the context tagger
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditContext {
    /// Acting user or service, if known
    pub actor_id: Option<String>,
    /// Stable across requests of the same session
    pub session_id: String,
    /// Unique per request
    pub request_id: String,
    /// Regulatory processing purpose
    pub processing_purpose: String,
    /// Legal basis for the processing
    pub legal_basis: String,
    /// Originating client address
    pub ip_address: Option<String>,
    /// Originating client user agent
    pub user_agent: Option<String>,
}

/// Immutable audit trail record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: Uuid,
    pub table_name: String,
    pub operation: Operation,
    pub record_id: Option<String>,
    /// Data subject the record belongs to, when it can be resolved
    pub subject_id: Option<String>,
    /// Redacted snapshot before the operation
    pub before_snapshot: Option<Value>,
    /// Redacted snapshot after the operation
    pub after_snapshot: Option<Value>,
    pub actor_id: Option<String>,
    pub session_id: String,
    pub request_id: String,
    pub data_categories: BTreeSet<String>,
    pub processing_purpose: String,
    pub legal_basis: String,
    pub sensitive_flag: bool,
    pub retention_days: u32,
    pub breach_risk_level: BreachRiskLevel,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AuditEntry {
    /// Whether the stored risk level matches the decision table
    pub fn risk_level_is_consistent(&self) -> bool {
        self.breach_risk_level == BreachRiskLevel::assess(self.sensitive_flag, self.operation)
    }

    /// Whether the entry's retention window has elapsed at `now`
    pub fn retention_expired(&self, now: DateTime<Utc>) -> bool {
        now - self.timestamp > chrono::Duration::days(i64::from(self.retention_days))
    }
}

/// Query filter for the audit trail
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuditFilter {
    pub table_name: Option<String>,
    pub actor_id: Option<String>,
    pub subject_id: Option<String>,
    pub operation: Option<Operation>,
    pub sensitive_only: bool,
    /// Only entries at or above this risk level
    pub min_risk_level: Option<BreachRiskLevel>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<usize>,
}

impl AuditFilter {
    /// Check whether an entry passes the filter (limit is not considered)
    pub fn matches(&self, entry: &AuditEntry) -> bool {
        if let Some(ref table) = self.table_name {
            if &entry.table_name != table {
                return false;
            }
        }
        if let Some(ref actor) = self.actor_id {
            if entry.actor_id.as_ref() != Some(actor) {
                return false;
            }
        }
        if let Some(ref subject) = self.subject_id {
            if entry.subject_id.as_ref() != Some(subject) {
                return false;
            }
        }
        if let Some(op) = self.operation {
            if entry.operation != op {
                return false;
            }
        }
        if self.sensitive_only && !entry.sensitive_flag {
            return false;
        }
        if let Some(level) = self.min_risk_level {
            if entry.breach_risk_level < level {
                return false;
            }
        }
        if let Some(since) = self.since {
            if entry.timestamp < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if entry.timestamp > until {
                return false;
            }
        }
        true
    }
}
