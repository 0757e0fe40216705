//! Compliance service facade
//!
//! Wires the audit pipeline and the job orchestrator over one [`Storage`]
//! bundle and exposes the caller-facing operations.

use crate::adapters::database::traits::Storage;
use crate::anonymization::classifier::SensitiveDataClassifier;
use crate::config::WardenConfig;
use crate::core::audit::{
    AuditContextTagger, AuditLogWriter, AuditWriteOutcome, OperationDescriptor, ViolationDetector,
};
use crate::core::jobs::{JobOrchestrator, JobQueue};
use crate::domain::audit::{AuditEntry, AuditFilter};
use crate::domain::erasure::{ErasureFilter, ErasureLogEntry};
use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::job::{
    Algorithm, AlgorithmParams, AnonymizationJob, JobHandle, JobRequest, JobStatus,
};
use crate::domain::violation::{ComplianceViolation, ViolationFilter};
use crate::domain::{Result, WardenError};
use std::sync::Arc;
use tokio::sync::watch;

/// Entry point for request handlers, job management and reporting
pub struct ComplianceService {
    storage: Storage,
    tagger: AuditContextTagger,
    writer: AuditLogWriter,
    detector: Option<ViolationDetector>,
    orchestrator: JobOrchestrator,
}

impl ComplianceService {
    /// Build the service over an existing storage bundle
    ///
    /// # Errors
    ///
    /// Returns an error if the classification pattern file cannot be loaded.
    pub fn new(
        config: &WardenConfig,
        storage: Storage,
        shutdown: watch::Receiver<bool>,
    ) -> Result<Self> {
        let classifier = Arc::new(SensitiveDataClassifier::from_config(&config.classification)?);
        let writer = AuditLogWriter::new(storage.audit.clone(), classifier, config.audit.clone());

        let detector = config.detection.enabled.then(|| {
            ViolationDetector::new(
                storage.audit.clone(),
                storage.violations.clone(),
                config.detection.clone(),
            )
        });
        if detector.is_none() {
            tracing::info!("Compliance violation detection is disabled");
        }

        let queue = Arc::new(JobQueue::new(
            config.anonymization.max_concurrent_jobs,
            shutdown,
        ));
        let orchestrator = JobOrchestrator::new(
            storage.jobs.clone(),
            storage.records.clone(),
            storage.schema.clone(),
            &config.anonymization,
            &config.audit,
            queue,
        );

        Ok(Self {
            storage,
            tagger: AuditContextTagger::new(),
            writer,
            detector,
            orchestrator,
        })
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Audit one operation and run violation detection on the stored entry
    ///
    /// Never fails; the outcome reports what was persisted.
    pub async fn record_operation(&self, descriptor: &OperationDescriptor) -> AuditWriteOutcome {
        let context = self.tagger.tag(descriptor);
        let outcome = self.writer.write(descriptor, &context).await;

        if let (Some(detector), Some(entry)) = (&self.detector, outcome.recorded()) {
            detector.evaluate(entry).await;
        }
        outcome
    }

    /// Create a job and queue it for background execution
    ///
    /// # Errors
    ///
    /// Invalid parameters or an unknown table are rejected with
    /// [`WardenError::JobValidation`] before anything is persisted.
    pub async fn start_anonymization_job(
        &self,
        table_name: &str,
        filter_predicate: FilterPredicate,
        algorithm: Algorithm,
        algorithm_params: AlgorithmParams,
    ) -> Result<JobHandle> {
        let request = JobRequest {
            target_table: TableName::new(table_name).map_err(WardenError::JobValidation)?,
            filter_predicate,
            algorithm,
            algorithm_params,
        };
        self.orchestrator.start_job(request).await
    }

    /// Create a pending job without executing it
    pub async fn create_anonymization_job(&self, request: JobRequest) -> Result<JobHandle> {
        let job = self.orchestrator.create_job(request).await?;
        Ok(JobHandle {
            job_id: job.id,
            estimated_record_count: job.estimated_record_count,
        })
    }

    /// Execute a job that was created earlier
    ///
    /// # Errors
    ///
    /// Fails if the job is unknown, not pending, or already executing.
    pub async fn run_job(&self, job_id: JobId) -> Result<()> {
        let job = self.get_job_status(job_id).await?;
        if !job.status.can_transition_to(JobStatus::Running) {
            return Err(WardenError::Validation(format!(
                "Job {job_id} is {} and cannot be started",
                job.status
            )));
        }
        self.orchestrator.resume(job_id).await
    }

    pub async fn get_job_status(&self, job_id: JobId) -> Result<AnonymizationJob> {
        self.storage
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| WardenError::JobNotFound(job_id.to_string()))
    }

    pub async fn list_jobs(&self, limit: usize) -> Result<Vec<AnonymizationJob>> {
        self.storage.jobs.list_jobs(limit).await
    }

    /// Request cancellation; the executor stops before its next batch
    ///
    /// # Errors
    ///
    /// Fails for unknown jobs and jobs that already finished.
    pub async fn cancel_job(&self, job_id: JobId) -> Result<()> {
        let job = self.get_job_status(job_id).await?;
        if job.status.is_terminal() {
            return Err(WardenError::Validation(format!(
                "Job {job_id} already {}",
                job.status
            )));
        }
        if !self.storage.jobs.request_cancellation(job_id).await? {
            return Err(WardenError::JobNotFound(job_id.to_string()));
        }
        tracing::info!(job_id = %job_id, "Job cancellation requested");
        Ok(())
    }

    /// Wait for a job running in this process to finish
    pub async fn wait_for_job(&self, job_id: JobId) -> Result<AnonymizationJob> {
        self.orchestrator.queue().wait(job_id).await;
        self.get_job_status(job_id).await
    }

    /// Wait for every job running in this process
    pub async fn wait_for_all_jobs(&self) {
        self.orchestrator.queue().wait_all().await;
    }

    pub async fn query_audit_trail(&self, filter: &AuditFilter) -> Result<Vec<AuditEntry>> {
        self.storage.audit.query_audit_entries(filter).await
    }

    pub async fn list_violations(
        &self,
        filter: &ViolationFilter,
    ) -> Result<Vec<ComplianceViolation>> {
        self.storage.violations.query_violations(filter).await
    }

    pub async fn list_erasures(&self, filter: &ErasureFilter) -> Result<Vec<ErasureLogEntry>> {
        self.storage.records.query_erasures(filter).await
    }
}
