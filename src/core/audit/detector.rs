//! Compliance Violation Detector
//!
//! Evaluates two heuristics after every recorded audit entry:
//!
//! - **Retention exceeded**: a read of a record created longer ago than its
//!   table's retention window.
//! - **Unusual access pattern**: more than the configured number of
//!   sensitive accesses to one subject inside the trailing window. One
//!   violation is raised per subject and window.
//!
//! Detection never fails the caller; storage errors are logged and dropped.

use crate::adapters::database::traits::{AuditStore, ViolationStore};
use crate::config::DetectionConfig;
use crate::domain::audit::{AuditEntry, Operation};
use crate::domain::filter::value_as_datetime;
use crate::domain::violation::{ComplianceViolation, Severity, ViolationType};
use crate::domain::Result;
use crate::log_error_with_context;
use chrono::{DateTime, Duration, Utc};
use std::sync::Arc;

pub struct ViolationDetector {
    audit: Arc<dyn AuditStore + Send + Sync>,
    violations: Arc<dyn ViolationStore + Send + Sync>,
    config: DetectionConfig,
}

impl ViolationDetector {
    pub fn new(
        audit: Arc<dyn AuditStore + Send + Sync>,
        violations: Arc<dyn ViolationStore + Send + Sync>,
        config: DetectionConfig,
    ) -> Self {
        Self {
            audit,
            violations,
            config,
        }
    }

    /// Run both rules against a freshly recorded entry
    ///
    /// Returns the violations that were stored.
    pub async fn evaluate(&self, entry: &AuditEntry) -> Vec<ComplianceViolation> {
        let mut stored = Vec::new();

        if let Some(violation) = self.check_retention(entry) {
            match self.violations.append_violation(&violation).await {
                Ok(()) => stored.push(violation),
                Err(e) => log_error_with_context!(&e, "Failed to append compliance violation"),
            }
        }

        match self.check_unusual_access(entry).await {
            Ok(Some((violation, window_start))) => {
                match self.violations.append_if_absent(&violation, window_start).await {
                    Ok(true) => stored.push(violation),
                    Ok(false) => tracing::debug!(
                        subject_id = ?violation.affected_subject_id,
                        "Unusual access already reported for this window"
                    ),
                    Err(e) => {
                        log_error_with_context!(&e, "Failed to append compliance violation");
                    }
                }
            }
            Ok(None) => {}
            Err(e) => log_error_with_context!(&e, "Unusual access check failed"),
        }

        for violation in &stored {
            tracing::warn!(
                violation_type = %violation.violation_type,
                severity = %violation.severity,
                table = %violation.affected_table,
                audit_entry_id = %entry.id,
                "Compliance violation detected"
            );
        }
        stored
    }

    /// Rule A: read of a record older than its table's retention window
    fn check_retention(&self, entry: &AuditEntry) -> Option<ComplianceViolation> {
        if entry.operation != Operation::Select {
            return None;
        }
        let days = *self.config.table_retention_days.get(&entry.table_name)?;

        let created_at = [entry.after_snapshot.as_ref(), entry.before_snapshot.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|snapshot| snapshot.get(&self.config.created_at_field))
            .and_then(value_as_datetime)?;

        let age = entry.timestamp - created_at;
        if age <= Duration::days(i64::from(days)) {
            return None;
        }

        Some(
            ComplianceViolation::automated(
                ViolationType::RetentionExceeded,
                Severity::High,
                format!(
                    "Record read {} days after creation; {} retention is {days} days",
                    age.num_days(),
                    entry.table_name
                ),
                entry.table_name.clone(),
            )
            .with_record_id(entry.record_id.clone())
            .with_subject_id(entry.subject_id.clone())
            .referencing(entry.id),
        )
    }

    /// Rule B: too many sensitive accesses to one subject in the window
    ///
    /// Yields the candidate violation and the window start; the store only
    /// keeps it if the window has none yet.
    async fn check_unusual_access(
        &self,
        entry: &AuditEntry,
    ) -> Result<Option<(ComplianceViolation, DateTime<Utc>)>> {
        if !entry.sensitive_flag {
            return Ok(None);
        }
        let Some(subject_id) = entry.subject_id.as_deref() else {
            return Ok(None);
        };

        let window = Duration::minutes(i64::from(self.config.unusual_access_window_minutes));
        let window_start = entry.timestamp - window;
        let count = self
            .audit
            .count_sensitive_accesses(subject_id, window_start)
            .await?;
        let threshold = u64::from(self.config.unusual_access_threshold);
        if count <= threshold {
            return Ok(None);
        }

        let violation = ComplianceViolation::automated(
            ViolationType::UnusualAccessPattern,
            Severity::Medium,
            format!(
                "{count} sensitive accesses within {} minutes (threshold {threshold})",
                self.config.unusual_access_window_minutes
            ),
            entry.table_name.clone(),
        )
        .with_record_id(entry.record_id.clone())
        .with_subject_id(Some(subject_id.to_string()))
        .referencing(entry.id);
        Ok(Some((violation, window_start)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::domain::audit::BreachRiskLevel;
    use chrono::Utc;
    use serde_json::json;
    use std::collections::BTreeSet;
    use uuid::Uuid;

    fn entry(table: &str, operation: Operation, sensitive: bool) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            table_name: table.to_string(),
            operation,
            record_id: Some("1".to_string()),
            subject_id: Some("p-1".to_string()),
            before_snapshot: None,
            after_snapshot: None,
            actor_id: None,
            session_id: "s".to_string(),
            request_id: "r".to_string(),
            data_categories: BTreeSet::new(),
            processing_purpose: "p".to_string(),
            legal_basis: "b".to_string(),
            sensitive_flag: sensitive,
            retention_days: 365,
            breach_risk_level: BreachRiskLevel::assess(sensitive, operation),
            ip_address: None,
            user_agent: None,
            timestamp: Utc::now(),
        }
    }

    fn detector(store: Arc<MemoryStore>, config: DetectionConfig) -> ViolationDetector {
        ViolationDetector::new(store.clone(), store, config)
    }

    #[tokio::test]
    async fn test_retention_exceeded_on_read() {
        let store = Arc::new(MemoryStore::new());
        let mut config = DetectionConfig::default();
        config
            .table_retention_days
            .insert("appointments".to_string(), 365);
        let d = detector(store.clone(), config);

        let mut old = entry("appointments", Operation::Select, false);
        old.after_snapshot = Some(json!({"created_at": "2015-03-01T08:00:00Z"}));
        let found = d.evaluate(&old).await;
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].violation_type, ViolationType::RetentionExceeded);
        assert_eq!(found[0].severity, Severity::High);
        assert_eq!(found[0].audit_entry_ids, vec![old.id]);

        let mut fresh = entry("appointments", Operation::Select, false);
        fresh.after_snapshot = Some(json!({"created_at": Utc::now().to_rfc3339()}));
        assert!(d.evaluate(&fresh).await.is_empty());

        let mut write = entry("appointments", Operation::Update, false);
        write.after_snapshot = old.after_snapshot.clone();
        assert!(d.evaluate(&write).await.is_empty());
    }

    #[tokio::test]
    async fn test_violation_store_failure_is_swallowed() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_violation_appends(true).await;
        let mut config = DetectionConfig::default();
        config
            .table_retention_days
            .insert("appointments".to_string(), 1);
        let d = detector(store.clone(), config);

        let mut old = entry("appointments", Operation::Select, false);
        old.before_snapshot = Some(json!({"created_at": "2020-01-01"}));
        assert!(d.evaluate(&old).await.is_empty());
    }

    #[tokio::test]
    async fn test_unusual_access_threshold() {
        let store = Arc::new(MemoryStore::new());
        let config = DetectionConfig {
            unusual_access_threshold: 2,
            ..Default::default()
        };
        let d = detector(store.clone(), config);

        let mut emitted = 0;
        for _ in 0..5 {
            let e = entry("medical_records", Operation::Select, true);
            store.append_audit_entry(&e).await.unwrap();
            emitted += d.evaluate(&e).await.len();
        }
        assert_eq!(emitted, 1);
        assert_eq!(store.violations().await.len(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_detections_raise_one_violation() {
        let store = Arc::new(MemoryStore::new());
        let config = DetectionConfig {
            unusual_access_threshold: 2,
            ..Default::default()
        };
        let d = Arc::new(detector(store.clone(), config));

        let mut entries = Vec::new();
        for _ in 0..8 {
            let e = entry("medical_records", Operation::Select, true);
            store.append_audit_entry(&e).await.unwrap();
            entries.push(e);
        }

        // Every entry sees a count above the threshold at once
        let tasks: Vec<_> = entries
            .into_iter()
            .map(|e| {
                let d = d.clone();
                tokio::spawn(async move { d.evaluate(&e).await.len() })
            })
            .collect();
        let mut emitted = 0;
        for task in tasks {
            emitted += task.await.unwrap();
        }

        assert_eq!(emitted, 1);
        let stored = store.violations().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].violation_type, ViolationType::UnusualAccessPattern);
    }

    #[tokio::test]
    async fn test_earlier_window_does_not_suppress() {
        let store = Arc::new(MemoryStore::new());
        let config = DetectionConfig {
            unusual_access_threshold: 2,
            ..Default::default()
        };
        let d = detector(store.clone(), config);

        let mut earlier = ComplianceViolation::automated(
            ViolationType::UnusualAccessPattern,
            Severity::Medium,
            "earlier window",
            "medical_records",
        )
        .with_subject_id(Some("p-1".to_string()));
        earlier.detected_at = Utc::now() - Duration::hours(3);
        store.append_violation(&earlier).await.unwrap();

        let mut emitted = 0;
        for _ in 0..4 {
            let e = entry("medical_records", Operation::Select, true);
            store.append_audit_entry(&e).await.unwrap();
            emitted += d.evaluate(&e).await.len();
        }
        assert_eq!(emitted, 1);
        assert_eq!(store.violations().await.len(), 2);
    }
}
