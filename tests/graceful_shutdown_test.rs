//! Integration tests for graceful shutdown functionality
//!
//! These tests verify that:
//! - Shutdown signals propagate to every job executor
//! - Interrupted jobs end as failed with the processed count recorded
//! - Records after the interruption point are left untouched
//! - A pending job left behind by one process can be run by another

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use warden::adapters::database::traits::Storage;
use warden::adapters::memory::MemoryStore;
use warden::config::{secret_string, DatabaseTarget, WardenConfig};
use warden::core::ComplianceService;
use warden::domain::{
    Algorithm, AlgorithmParams, FilterPredicate, JobRequest, JobStatus, TableName,
};

fn config(batch_size: usize) -> WardenConfig {
    let mut config = WardenConfig::default();
    config.database.target = DatabaseTarget::Memory;
    config.anonymization.salt = secret_string("shutdown-test-salt".to_string());
    config.anonymization.batch_size = batch_size;
    config
}

async fn seed(store: &MemoryStore, count: u32) {
    store
        .create_table("patients", &[("id", "integer"), ("full_name", "text")])
        .await;
    for id in 1..=count {
        store
            .insert_row(
                "patients",
                json!({"id": id, "full_name": format!("Patient {id}")}),
            )
            .await
            .unwrap();
    }
}

fn pseudonymize() -> JobRequest {
    JobRequest {
        target_table: TableName::new("patients").unwrap(),
        filter_predicate: FilterPredicate::all(),
        algorithm: Algorithm::Pseudonymization,
        algorithm_params: AlgorithmParams::default(),
    }
}

#[tokio::test]
async fn test_shutdown_signal_propagation() {
    // Test that shutdown signal propagates to multiple receivers
    let (shutdown_tx, shutdown_rx1) = watch::channel(false);
    let shutdown_rx2 = shutdown_rx1.clone();

    assert!(!*shutdown_rx1.borrow());
    assert!(!*shutdown_rx2.borrow());

    shutdown_tx.send(true).unwrap();

    assert!(*shutdown_rx1.borrow());
    assert!(*shutdown_rx2.borrow());
}

#[tokio::test]
async fn test_shutdown_before_first_batch() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 3).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service =
        ComplianceService::new(&config(10), Storage::from_backend(store.clone()), shutdown_rx)
            .unwrap();

    shutdown_tx.send(true).unwrap();
    let handle = service.create_anonymization_job(pseudonymize()).await.unwrap();
    service.run_job(handle.job_id).await.unwrap();
    let job = service.wait_for_job(handle.job_id).await.unwrap();

    assert_eq!(job.status, JobStatus::Failed);
    assert_eq!(job.processed_count, 0);
    assert_eq!(
        job.error_log.last().unwrap(),
        "cancelled after 0 records: process shutting down"
    );
    assert!(job.completed_at.is_some());
    for id in ["1", "2", "3"] {
        let row = store.row("patients", id).await.unwrap();
        assert_eq!(row["full_name"], json!(format!("Patient {id}")));
    }
    assert!(store.erasures().await.is_empty());
}

#[tokio::test]
async fn test_shutdown_during_job_stops_between_batches() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 4).await;
    store.delay_record("1", Duration::from_millis(200)).await;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let service =
        ComplianceService::new(&config(1), Storage::from_backend(store.clone()), shutdown_rx)
            .unwrap();

    let handle = service.create_anonymization_job(pseudonymize()).await.unwrap();
    service.run_job(handle.job_id).await.unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    shutdown_tx.send(true).unwrap();
    service.wait_for_all_jobs().await;

    let job = service.get_job_status(handle.job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Failed);
    assert!(job.processed_count >= 1);
    assert!(job.processed_count < 4);
    assert_eq!(
        job.error_log.last().unwrap(),
        &format!(
            "cancelled after {} records: process shutting down",
            job.processed_count
        )
    );

    // Every processed record has its erasure entry; the rest are untouched
    assert_eq!(store.erasures().await.len() as u64, job.anonymized_count);
    let last = store.row("patients", "4").await.unwrap();
    assert_eq!(last["full_name"], json!("Patient 4"));
}

#[tokio::test]
async fn test_pending_job_survives_process_restart() {
    let store = Arc::new(MemoryStore::new());
    seed(&store, 2).await;

    let job_id = {
        let (_tx, rx) = watch::channel(false);
        let first =
            ComplianceService::new(&config(10), Storage::from_backend(store.clone()), rx)
                .unwrap();
        first
            .create_anonymization_job(pseudonymize())
            .await
            .unwrap()
            .job_id
    };

    let (_tx, rx) = watch::channel(false);
    let second =
        ComplianceService::new(&config(10), Storage::from_backend(store.clone()), rx).unwrap();
    assert_eq!(
        second.get_job_status(job_id).await.unwrap().status,
        JobStatus::Pending
    );

    second.run_job(job_id).await.unwrap();
    let job = second.wait_for_job(job_id).await.unwrap();
    assert_eq!(job.status, JobStatus::Completed);
    assert_eq!(job.anonymized_count, 2);
    assert_ne!(
        store.row("patients", "1").await.unwrap()["full_name"],
        json!("Patient 1")
    );
}
