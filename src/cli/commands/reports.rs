//! Reporting commands: `audit`, `violations` and `erasures`

use crate::cli::commands::{open_reporting_service, print_json};
use crate::domain::audit::{AuditFilter, BreachRiskLevel, Operation};
use crate::domain::erasure::ErasureFilter;
use crate::domain::ids::JobId;
use crate::domain::violation::{Severity, ViolationFilter, ViolationType};
use chrono::{DateTime, Utc};
use clap::Args;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Arguments for the audit command
#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Only entries for this table
    #[arg(long)]
    pub table: Option<String>,

    /// Only entries by this actor
    #[arg(long)]
    pub actor: Option<String>,

    /// Only entries about this data subject
    #[arg(long)]
    pub subject: Option<String>,

    /// Only this operation (insert, update, delete, select)
    #[arg(long)]
    pub operation: Option<Operation>,

    /// Only sensitive entries
    #[arg(long)]
    pub sensitive_only: bool,

    /// Minimum breach risk level (low, medium, high, critical)
    #[arg(long)]
    pub min_risk: Option<BreachRiskLevel>,

    /// Entries at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    /// Entries at or before this RFC 3339 timestamp
    #[arg(long)]
    pub until: Option<DateTime<Utc>>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print the entries as JSON
    #[arg(long)]
    pub json: bool,
}

impl AuditArgs {
    fn filter(&self) -> AuditFilter {
        AuditFilter {
            table_name: self.table.clone(),
            actor_id: self.actor.clone(),
            subject_id: self.subject.clone(),
            operation: self.operation,
            sensitive_only: self.sensitive_only,
            min_risk_level: self.min_risk,
            since: self.since,
            until: self.until,
            limit: Some(self.limit),
        }
    }

    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let entries = match service.query_audit_trail(&self.filter()).await {
            Ok(entries) => entries,
            Err(e) => {
                println!("❌ Failed to query audit trail");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            print_json(&entries)?;
            return Ok(0);
        }
        if entries.is_empty() {
            println!("No audit entries match the specified filters.");
            return Ok(0);
        }

        println!("Found {} audit entries:", entries.len());
        println!();
        println!(
            "{:<20} {:<22} {:<8} {:<12} {:<16} {:<10} {:<30}",
            "Timestamp", "Table", "Op", "Record", "Actor", "Risk", "Purpose"
        );
        println!("{}", "-".repeat(124));
        for entry in &entries {
            println!(
                "{:<20} {:<22} {:<8} {:<12} {:<16} {:<10} {:<30}",
                entry.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                entry.table_name,
                entry.operation.as_str(),
                entry.record_id.as_deref().unwrap_or("-"),
                entry.actor_id.as_deref().unwrap_or("-"),
                entry.breach_risk_level.as_str(),
                entry.processing_purpose
            );
        }
        println!();
        Ok(0)
    }
}

/// Arguments for the violations command
#[derive(Args, Debug)]
pub struct ViolationsArgs {
    /// Only this violation type
    #[arg(long = "type")]
    pub violation_type: Option<ViolationType>,

    /// Minimum severity (low, medium, high, critical)
    #[arg(long)]
    pub min_severity: Option<Severity>,

    #[arg(long)]
    pub table: Option<String>,

    #[arg(long)]
    pub subject: Option<String>,

    /// Violations detected at or after this RFC 3339 timestamp
    #[arg(long)]
    pub since: Option<DateTime<Utc>>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print the violations as JSON
    #[arg(long)]
    pub json: bool,
}

impl ViolationsArgs {
    fn filter(&self) -> ViolationFilter {
        ViolationFilter {
            violation_type: self.violation_type,
            min_severity: self.min_severity,
            affected_table: self.table.clone(),
            affected_subject_id: self.subject.clone(),
            since: self.since,
            limit: Some(self.limit),
        }
    }

    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let violations = match service.list_violations(&self.filter()).await {
            Ok(violations) => violations,
            Err(e) => {
                println!("❌ Failed to query compliance violations");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            print_json(&violations)?;
            return Ok(0);
        }
        if violations.is_empty() {
            println!("✅ No compliance violations match the specified filters.");
            return Ok(0);
        }

        println!("⚠️  Found {} violation(s):", violations.len());
        println!();
        for violation in &violations {
            println!(
                "[{}] {} {} on {}",
                violation.severity,
                violation.detected_at.format(TIMESTAMP_FORMAT),
                violation.violation_type,
                violation.affected_table
            );
            if let Some(subject) = &violation.affected_subject_id {
                println!("    Subject: {subject}");
            }
            println!("    {}", violation.description);
        }
        println!();
        Ok(0)
    }
}

/// Arguments for the erasures command
#[derive(Args, Debug)]
pub struct ErasuresArgs {
    /// Only erasures written by this job
    #[arg(long)]
    pub job_id: Option<JobId>,

    #[arg(long)]
    pub table: Option<String>,

    #[arg(long)]
    pub subject: Option<String>,

    #[arg(long, default_value_t = 50)]
    pub limit: usize,

    /// Print the entries as JSON
    #[arg(long)]
    pub json: bool,
}

impl ErasuresArgs {
    fn filter(&self) -> ErasureFilter {
        ErasureFilter {
            job_id: self.job_id,
            table_name: self.table.clone(),
            subject_id: self.subject.clone(),
            limit: Some(self.limit),
        }
    }

    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let erasures = match service.list_erasures(&self.filter()).await {
            Ok(erasures) => erasures,
            Err(e) => {
                println!("❌ Failed to query erasure log");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            print_json(&erasures)?;
            return Ok(0);
        }
        if erasures.is_empty() {
            println!("No erasure log entries match the specified filters.");
            return Ok(0);
        }

        println!("Found {} erasure(s):", erasures.len());
        println!();
        println!(
            "{:<20} {:<22} {:<12} {:<22} {:<38}",
            "Timestamp", "Table", "Record", "Algorithm", "Job ID"
        );
        println!("{}", "-".repeat(118));
        for erasure in &erasures {
            println!(
                "{:<20} {:<22} {:<12} {:<22} {:<38}",
                erasure.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                erasure.table_name,
                erasure.record_id,
                erasure.algorithm.as_str(),
                erasure.job_id.to_string()
            );
        }
        println!();
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn test_audit_filter_from_args() {
        let cli = Cli::parse_from([
            "warden",
            "audit",
            "--table",
            "medical_records",
            "--operation",
            "delete",
            "--min-risk",
            "high",
            "--since",
            "2025-01-01T00:00:00Z",
            "--sensitive-only",
        ]);
        let Commands::Audit(args) = cli.command else {
            panic!("expected audit");
        };
        let filter = args.filter();
        assert_eq!(filter.table_name.as_deref(), Some("medical_records"));
        assert_eq!(filter.operation, Some(Operation::Delete));
        assert_eq!(filter.min_risk_level, Some(BreachRiskLevel::High));
        assert!(filter.sensitive_only);
        assert!(filter.since.is_some());
        assert_eq!(filter.limit, Some(50));
    }

    #[test]
    fn test_violation_type_flag() {
        let cli = Cli::parse_from(["warden", "violations", "--type", "unusual_access_pattern"]);
        let Commands::Violations(args) = cli.command else {
            panic!("expected violations");
        };
        assert_eq!(
            args.filter().violation_type,
            Some(ViolationType::UnusualAccessPattern)
        );
    }
}
