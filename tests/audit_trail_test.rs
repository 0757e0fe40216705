//! Integration tests for the audit trail
//!
//! These tests verify that:
//! - Entries carry the classification, risk level and retention of their data
//! - Audit persistence failures never reach the caller
//! - Violation heuristics fire exactly when their thresholds are crossed

use serde_json::json;
use std::sync::Arc;
use test_case::test_case;
use tokio::sync::watch;
use warden::adapters::database::traits::Storage;
use warden::adapters::memory::MemoryStore;
use warden::core::audit::{AuditWriteOutcome, OperationDescriptor};
use warden::core::ComplianceService;
use warden::config::{DatabaseTarget, WardenConfig};
use warden::domain::audit::AUDIT_ERROR_TABLE;
use warden::domain::{
    AuditFilter, BreachRiskLevel, Operation, Severity, ViolationFilter, ViolationType,
};

fn config() -> WardenConfig {
    let mut config = WardenConfig::default();
    config.database.target = DatabaseTarget::Memory;
    config
}

fn service_with(config: &WardenConfig) -> (Arc<MemoryStore>, ComplianceService) {
    let store = Arc::new(MemoryStore::new());
    let (_tx, rx) = watch::channel(false);
    let service = ComplianceService::new(config, Storage::from_backend(store.clone()), rx).unwrap();
    (store, service)
}

fn read_record(patient: &str) -> OperationDescriptor {
    OperationDescriptor::new("medical_records", Operation::Select, "/api/medical/records/9")
        .with_actor("dr-zhou")
        .with_session("session-1")
        .with_record_id("9")
        .with_after(json!({"patient_id": patient, "diagnosis": "I10"}))
}

#[tokio::test]
async fn test_medical_record_classification() {
    let (_store, service) = service_with(&config());
    let descriptor =
        OperationDescriptor::new("medical_records", Operation::Insert, "/api/medical/records")
            .with_record_id("1")
            .with_after(json!({"diagnosis": "X"}));

    let outcome = service.record_operation(&descriptor).await;
    let entry = outcome.recorded().unwrap();

    assert!(entry.sensitive_flag);
    assert!(entry.data_categories.contains("health_data"));
    assert_eq!(entry.breach_risk_level, BreachRiskLevel::Medium);
    assert_eq!(entry.processing_purpose, "healthcare_service_provision");
    assert_eq!(entry.legal_basis, "vital_interests");
    assert_eq!(entry.retention_days, 2555);
}

#[test_case("patients")]
#[test_case("medical_records")]
#[test_case("medications")]
#[test_case("prescriptions")]
#[test_case("lab_results")]
#[test_case("diagnoses")]
#[tokio::test]
async fn test_sensitive_tables_are_always_flagged(table: &str) {
    let (_store, service) = service_with(&config());
    let descriptor = OperationDescriptor::new(table, Operation::Update, "/api/anything")
        .with_record_id("1")
        .with_after(json!({"note": "nothing remarkable"}));

    let outcome = service.record_operation(&descriptor).await;
    let entry = outcome.recorded().unwrap();
    assert!(entry.sensitive_flag);
    assert_eq!(entry.breach_risk_level, BreachRiskLevel::High);
}

#[test_case("medical_records", Operation::Delete, BreachRiskLevel::Critical)]
#[test_case("medical_records", Operation::Update, BreachRiskLevel::High)]
#[test_case("medical_records", Operation::Insert, BreachRiskLevel::Medium)]
#[test_case("settings", Operation::Delete, BreachRiskLevel::Low)]
#[tokio::test]
async fn test_breach_risk_decision_table(table: &str, operation: Operation, risk: BreachRiskLevel) {
    let (_store, service) = service_with(&config());
    let descriptor = OperationDescriptor::new(table, operation, "/api/records").with_record_id("1");

    let outcome = service.record_operation(&descriptor).await;
    let entry = outcome.recorded().unwrap();
    assert_eq!(entry.breach_risk_level, risk);
    assert!(entry.risk_level_is_consistent());
}

#[tokio::test]
async fn test_unknown_table_defaults_to_system_data() {
    let (_store, service) = service_with(&config());
    let descriptor = OperationDescriptor::new("feature_flags", Operation::Update, "/admin/flags");

    let outcome = service.record_operation(&descriptor).await;
    let entry = outcome.recorded().unwrap();
    assert!(!entry.sensitive_flag);
    assert_eq!(
        entry.data_categories.iter().collect::<Vec<_>>(),
        vec!["system_data"]
    );
    assert_eq!(entry.processing_purpose, "system_administration");
}

#[tokio::test]
async fn test_snapshots_are_redacted() {
    let (store, service) = service_with(&config());
    let descriptor = OperationDescriptor::new("users", Operation::Update, "/api/users/3")
        .with_record_id("3")
        .with_before(json!({"email": "a@example.com", "password": "old-secret"}))
        .with_after(json!({"email": "b@example.com", "Password": "new-secret"}));

    service.record_operation(&descriptor).await;

    let stored = store.audit_entries().await;
    let entry = &stored[0];
    assert_eq!(entry.before_snapshot.as_ref().unwrap()["password"], json!("[REDACTED]"));
    assert_eq!(entry.after_snapshot.as_ref().unwrap()["Password"], json!("[REDACTED]"));
    assert_eq!(entry.after_snapshot.as_ref().unwrap()["email"], json!("b@example.com"));
    assert_eq!(entry.subject_id.as_deref(), Some("3"));
}

#[tokio::test]
async fn test_audit_failure_does_not_block_business_write() {
    let (store, service) = service_with(&config());
    store.create_table("patients", &[("id", "integer"), ("full_name", "text")]).await;
    store.fail_audit_appends_for("patients").await;

    // The business mutation commits on its own
    store
        .insert_row("patients", json!({"id": 5, "full_name": "Chen Jie"}))
        .await
        .unwrap();
    let descriptor = OperationDescriptor::new("patients", Operation::Insert, "/api/patients")
        .with_record_id("5")
        .with_after(json!({"id": 5, "full_name": "Chen Jie"}));
    let outcome = service.record_operation(&descriptor).await;

    let AuditWriteOutcome::Fallback(fallback) = outcome else {
        panic!("expected a fallback entry");
    };
    assert_eq!(fallback.table_name, AUDIT_ERROR_TABLE);
    assert_eq!(
        fallback.after_snapshot.as_ref().unwrap()["failed_table"],
        json!("patients")
    );
    assert!(store.row("patients", "5").await.is_some());

    let trail = service.query_audit_trail(&AuditFilter::default()).await.unwrap();
    assert_eq!(trail.len(), 1);
    assert_eq!(trail[0].table_name, AUDIT_ERROR_TABLE);
}

#[tokio::test]
async fn test_eleventh_sensitive_access_raises_one_violation() {
    let (_store, service) = service_with(&config());
    let filter = ViolationFilter {
        violation_type: Some(ViolationType::UnusualAccessPattern),
        ..Default::default()
    };

    for _ in 0..10 {
        service.record_operation(&read_record("p-42")).await;
    }
    assert!(service.list_violations(&filter).await.unwrap().is_empty());

    service.record_operation(&read_record("p-42")).await;
    let violations = service.list_violations(&filter).await.unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::Medium);
    assert_eq!(violations[0].affected_subject_id.as_deref(), Some("p-42"));

    // Further accesses in the same window are not reported again
    service.record_operation(&read_record("p-42")).await;
    assert_eq!(service.list_violations(&filter).await.unwrap().len(), 1);

    // Other subjects are counted separately
    service.record_operation(&read_record("p-7")).await;
    assert_eq!(service.list_violations(&filter).await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_read_past_retention_raises_violation() {
    let mut config = config();
    config
        .detection
        .table_retention_days
        .insert("appointments".to_string(), 365);
    let (_store, service) = service_with(&config);

    let descriptor =
        OperationDescriptor::new("appointments", Operation::Select, "/api/appointments/4")
            .with_record_id("4")
            .with_after(json!({"user_id": "u-4", "created_at": "2016-02-01T10:00:00Z"}));
    service.record_operation(&descriptor).await;

    let violations = service
        .list_violations(&ViolationFilter {
            violation_type: Some(ViolationType::RetentionExceeded),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].severity, Severity::High);
    assert_eq!(violations[0].affected_record_id.as_deref(), Some("4"));
}

#[tokio::test]
async fn test_detection_can_be_disabled() {
    let mut config = config();
    config.detection.enabled = false;
    config.detection.unusual_access_threshold = 1;
    let (store, service) = service_with(&config);

    for _ in 0..3 {
        service.record_operation(&read_record("p-1")).await;
    }
    assert_eq!(store.audit_entries().await.len(), 3);
    assert!(store.violations().await.is_empty());
}

#[tokio::test]
async fn test_audit_trail_filters() {
    let (_store, service) = service_with(&config());
    service.record_operation(&read_record("p-1")).await;
    let delete = OperationDescriptor::new("medical_records", Operation::Delete, "/api/medical/9")
        .with_actor("admin-1")
        .with_record_id("9");
    service.record_operation(&delete).await;

    let critical = service
        .query_audit_trail(&AuditFilter {
            min_risk_level: Some(BreachRiskLevel::Critical),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(critical.len(), 1);
    assert_eq!(critical[0].actor_id.as_deref(), Some("admin-1"));

    let by_actor = service
        .query_audit_trail(&AuditFilter {
            actor_id: Some("dr-zhou".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(by_actor.len(), 1);
    assert_eq!(by_actor[0].session_id, "session-1");
}
