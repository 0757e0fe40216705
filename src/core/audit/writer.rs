//! Audit Log Writer
//!
//! Persists one immutable [`AuditEntry`] per operation. Failures never reach
//! the caller: a failed append is retried once as a minimal `audit_error`
//! entry, and the outcome says which of the two (if any) was stored.

use crate::adapters::database::traits::AuditStore;
use crate::anonymization::classifier::{
    Classification, SensitiveDataClassifier, DEFAULT_CATEGORY,
};
use crate::config::AuditConfig;
use crate::core::audit::context::OperationDescriptor;
use crate::domain::audit::{AuditContext, AuditEntry, BreachRiskLevel, AUDIT_ERROR_TABLE};
use crate::domain::WardenError;
use crate::log_error_with_context;
use chrono::Utc;
use serde_json::{json, Map, Value};
use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use uuid::Uuid;

/// Result of an audit write
#[derive(Debug, Clone, PartialEq)]
pub enum AuditWriteOutcome {
    /// The full entry was stored
    Recorded(AuditEntry),
    /// The entry failed and the `audit_error` fallback was stored instead
    Fallback(AuditEntry),
    /// Neither the entry nor its fallback could be stored
    Lost,
}

impl AuditWriteOutcome {
    /// The full entry, when it was stored
    pub fn recorded(&self) -> Option<&AuditEntry> {
        match self {
            Self::Recorded(entry) => Some(entry),
            _ => None,
        }
    }
}

/// Resolves the data subject an operation concerns
#[derive(Debug, Clone)]
pub struct SubjectResolver {
    fields: Vec<String>,
    tables: HashSet<String>,
}

impl SubjectResolver {
    pub fn from_config(config: &AuditConfig) -> Self {
        Self {
            fields: config.subject_fields.clone(),
            tables: config.subject_tables.iter().cloned().collect(),
        }
    }

    /// First configured subject field found in the snapshots, else the record
    /// id when the table itself holds subjects
    pub fn resolve(
        &self,
        table: &str,
        record_id: Option<&str>,
        snapshots: &[Option<&Value>],
    ) -> Option<String> {
        let from_snapshot = self.fields.iter().find_map(|field| {
            snapshots
                .iter()
                .flatten()
                .find_map(|snapshot| match snapshot.get(field) {
                    Some(Value::String(s)) if !s.is_empty() => Some(s.clone()),
                    Some(Value::Number(n)) => Some(n.to_string()),
                    _ => None,
                })
        });

        from_snapshot.or_else(|| {
            record_id
                .filter(|_| self.tables.contains(table))
                .map(str::to_string)
        })
    }
}

/// Classifies, redacts and persists audit entries
pub struct AuditLogWriter {
    store: Arc<dyn AuditStore + Send + Sync>,
    classifier: Arc<SensitiveDataClassifier>,
    subjects: SubjectResolver,
    redacted_fields: HashSet<String>,
    config: AuditConfig,
}

impl AuditLogWriter {
    pub fn new(
        store: Arc<dyn AuditStore + Send + Sync>,
        classifier: Arc<SensitiveDataClassifier>,
        config: AuditConfig,
    ) -> Self {
        Self {
            store,
            classifier,
            subjects: SubjectResolver::from_config(&config),
            redacted_fields: config
                .redacted_fields
                .iter()
                .map(|f| f.to_lowercase())
                .collect(),
            config,
        }
    }

    /// Build and persist the entry for one operation
    pub async fn write(
        &self,
        descriptor: &OperationDescriptor,
        context: &AuditContext,
    ) -> AuditWriteOutcome {
        let entry = self.build_entry(descriptor, context);

        let error = match self.store.append_audit_entry(&entry).await {
            Ok(()) => {
                tracing::debug!(
                    table = %entry.table_name,
                    operation = %entry.operation,
                    risk = %entry.breach_risk_level,
                    sensitive = entry.sensitive_flag,
                    "Audit entry recorded"
                );
                return AuditWriteOutcome::Recorded(entry);
            }
            Err(e) => e,
        };

        log_error_with_context!(&error, "Failed to append audit entry");
        let fallback = self.fallback_entry(&entry, &error);
        match self.store.append_audit_entry(&fallback).await {
            Ok(()) => {
                tracing::warn!(
                    table = %entry.table_name,
                    fallback_id = %fallback.id,
                    "Recorded audit_error fallback entry"
                );
                AuditWriteOutcome::Fallback(fallback)
            }
            Err(e) => {
                log_error_with_context!(&e, "Failed to append audit_error fallback entry");
                AuditWriteOutcome::Lost
            }
        }
    }

    /// Classify and redact an operation into an entry
    pub fn build_entry(
        &self,
        descriptor: &OperationDescriptor,
        context: &AuditContext,
    ) -> AuditEntry {
        let payload = descriptor
            .after_snapshot
            .as_ref()
            .or(descriptor.before_snapshot.as_ref());
        let Classification {
            data_categories,
            sensitive,
        } = self.classifier.classify(&descriptor.table_name, payload);

        let subject_id = self.subjects.resolve(
            &descriptor.table_name,
            descriptor.record_id.as_deref(),
            &[
                descriptor.after_snapshot.as_ref(),
                descriptor.before_snapshot.as_ref(),
            ],
        );

        AuditEntry {
            id: Uuid::new_v4(),
            table_name: descriptor.table_name.clone(),
            operation: descriptor.operation,
            record_id: descriptor.record_id.clone(),
            subject_id,
            before_snapshot: descriptor.before_snapshot.as_ref().map(|v| self.redact(v)),
            after_snapshot: descriptor.after_snapshot.as_ref().map(|v| self.redact(v)),
            actor_id: context.actor_id.clone(),
            session_id: context.session_id.clone(),
            request_id: context.request_id.clone(),
            retention_days: self.retention_days(&data_categories),
            data_categories,
            processing_purpose: context.processing_purpose.clone(),
            legal_basis: context.legal_basis.clone(),
            sensitive_flag: sensitive,
            breach_risk_level: BreachRiskLevel::assess(sensitive, descriptor.operation),
            ip_address: context.ip_address.clone(),
            user_agent: context.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }

    /// Mask configured field names anywhere in a snapshot
    pub fn redact(&self, value: &Value) -> Value {
        match value {
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(key, v)| {
                        let redacted = if self.redacted_fields.contains(&key.to_lowercase()) {
                            Value::String(self.config.redaction_marker.clone())
                        } else {
                            self.redact(v)
                        };
                        (key.clone(), redacted)
                    })
                    .collect::<Map<String, Value>>(),
            ),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.redact(v)).collect()),
            other => other.clone(),
        }
    }

    /// Longest retention among the categories, else the default
    pub fn retention_days(&self, categories: &BTreeSet<String>) -> u32 {
        categories
            .iter()
            .filter_map(|c| self.config.retention_policies.get(c).copied())
            .max()
            .unwrap_or(self.config.default_retention_days)
    }

    fn fallback_entry(&self, failed: &AuditEntry, error: &WardenError) -> AuditEntry {
        AuditEntry {
            id: Uuid::new_v4(),
            table_name: AUDIT_ERROR_TABLE.to_string(),
            operation: failed.operation,
            record_id: failed.record_id.clone(),
            subject_id: None,
            before_snapshot: None,
            after_snapshot: Some(json!({
                "failed_table": failed.table_name,
                "failed_entry_id": failed.id.to_string(),
                "error": error.to_string(),
            })),
            actor_id: failed.actor_id.clone(),
            session_id: failed.session_id.clone(),
            request_id: failed.request_id.clone(),
            data_categories: BTreeSet::from([DEFAULT_CATEGORY.to_string()]),
            processing_purpose: failed.processing_purpose.clone(),
            legal_basis: failed.legal_basis.clone(),
            sensitive_flag: false,
            retention_days: self.config.default_retention_days,
            breach_risk_level: BreachRiskLevel::assess(false, failed.operation),
            ip_address: failed.ip_address.clone(),
            user_agent: failed.user_agent.clone(),
            timestamp: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::MemoryStore;
    use crate::config::ClassificationConfig;
    use crate::core::audit::context::AuditContextTagger;
    use crate::domain::audit::Operation;

    fn writer(store: Arc<MemoryStore>) -> AuditLogWriter {
        let classifier =
            SensitiveDataClassifier::from_config(&ClassificationConfig::default()).unwrap();
        AuditLogWriter::new(store, Arc::new(classifier), AuditConfig::default())
    }

    fn descriptor() -> OperationDescriptor {
        OperationDescriptor::new("medications", Operation::Update, "/api/medical/medications/5")
            .with_actor("dr-li")
            .with_record_id("5")
            .with_before(json!({"patient_id": "p-9", "dose": "5 mg"}))
            .with_after(json!({
                "patient_id": "p-9",
                "dose": "10 mg",
                "prescriber": {"name": "Li", "PASSWORD": "hunter2"}
            }))
    }

    #[tokio::test]
    async fn test_entry_fields() {
        let store = Arc::new(MemoryStore::new());
        let w = writer(store.clone());
        let d = descriptor();
        let context = AuditContextTagger::new().tag(&d);

        let outcome = w.write(&d, &context).await;
        let entry = outcome.recorded().unwrap();
        assert!(entry.sensitive_flag);
        assert_eq!(entry.breach_risk_level, BreachRiskLevel::High);
        assert_eq!(entry.subject_id.as_deref(), Some("p-9"));
        assert_eq!(entry.retention_days, 2555);
        assert_eq!(entry.legal_basis, "vital_interests");
        assert_eq!(
            entry.after_snapshot.as_ref().unwrap()["prescriber"]["PASSWORD"],
            json!("[REDACTED]")
        );
        assert_eq!(store.audit_entries().await.len(), 1);
    }

    #[tokio::test]
    async fn test_fallback_on_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_audit_appends_for("medications").await;
        let w = writer(store.clone());
        let d = descriptor();
        let context = AuditContextTagger::new().tag(&d);

        match w.write(&d, &context).await {
            AuditWriteOutcome::Fallback(entry) => {
                assert_eq!(entry.table_name, AUDIT_ERROR_TABLE);
                assert!(entry.risk_level_is_consistent());
            }
            other => panic!("expected fallback, got {other:?}"),
        }
        let stored = store.audit_entries().await;
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].table_name, AUDIT_ERROR_TABLE);
    }

    #[tokio::test]
    async fn test_lost_when_fallback_fails() {
        let store = Arc::new(MemoryStore::new());
        store.set_fail_all_audit_appends(true).await;
        let w = writer(store.clone());
        let d = descriptor();
        let context = AuditContextTagger::new().tag(&d);
        assert_eq!(w.write(&d, &context).await, AuditWriteOutcome::Lost);
        assert!(store.audit_entries().await.is_empty());
    }

    #[test]
    fn test_subject_resolution() {
        let resolver = SubjectResolver::from_config(&AuditConfig::default());
        let snapshot = json!({"user_id": 12});
        assert_eq!(
            resolver.resolve("appointments", Some("3"), &[None, Some(&snapshot)]),
            Some("12".to_string())
        );
        assert_eq!(
            resolver.resolve("patients", Some("7"), &[None, None]),
            Some("7".to_string())
        );
        assert_eq!(resolver.resolve("appointments", Some("3"), &[None]), None);
    }

    #[test]
    fn test_retention_uses_longest_policy() {
        let w = writer(Arc::new(MemoryStore::new()));
        let categories = BTreeSet::from(["contact_data".to_string(), "personal_data".to_string()]);
        assert_eq!(w.retention_days(&categories), 1825);
        assert_eq!(w.retention_days(&BTreeSet::from(["unknown".to_string()])), 1095);
    }
}
