//! Anonymization Job Orchestrator
//!
//! Creation is synchronous: validate the request, generate rules, count the
//! matching records and persist a `pending` job. Execution runs on the
//! [`JobQueue`]: records are streamed in keyset-paginated batches, each
//! record is transformed and persisted in its own transaction, and isolated
//! record failures only land in the job's error log.

use crate::adapters::database::traits::{JobStore, RecordStore, SchemaDescriptor, SourceRecord};
use crate::anonymization::kanonymity::KAnonymityEnforcer;
use crate::anonymization::rules::RuleGenerator;
use crate::anonymization::transform::FieldTransformer;
use crate::config::{AnonymizationConfig, AuditConfig};
use crate::core::audit::SubjectResolver;
use crate::core::jobs::queue::JobQueue;
use crate::domain::erasure::ErasureLogEntry;
use crate::domain::job::{Algorithm, AnonymizationJob, JobHandle, JobRequest};
use crate::domain::rule::FieldRule;
use crate::domain::{JobId, Result, TransformError, WardenError};
use crate::{log_batch_processing, log_error_with_context, log_job_complete, log_job_start};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Why a job stopped before exhausting its records
enum Interruption {
    Cancelled,
    Shutdown,
}

/// A record whose rules applied cleanly, waiting to be persisted
struct PreparedRecord {
    source: SourceRecord,
    changes: Map<String, Value>,
    /// Budget left for the persist step
    remaining: Duration,
}

/// Executes one job; cheap to clone into a background task
#[derive(Clone)]
struct JobExecutor {
    jobs: Arc<dyn JobStore + Send + Sync>,
    records: Arc<dyn RecordStore + Send + Sync>,
    config: AnonymizationConfig,
    subjects: SubjectResolver,
    shutdown: watch::Receiver<bool>,
}

/// Creates jobs and hands them to the queue
pub struct JobOrchestrator {
    schema: Arc<dyn SchemaDescriptor + Send + Sync>,
    generator: RuleGenerator,
    queue: Arc<JobQueue>,
    executor: JobExecutor,
}

impl JobOrchestrator {
    pub fn new(
        jobs: Arc<dyn JobStore + Send + Sync>,
        records: Arc<dyn RecordStore + Send + Sync>,
        schema: Arc<dyn SchemaDescriptor + Send + Sync>,
        config: &AnonymizationConfig,
        audit_config: &AuditConfig,
        queue: Arc<JobQueue>,
    ) -> Self {
        let executor = JobExecutor {
            jobs,
            records,
            config: config.clone(),
            subjects: SubjectResolver::from_config(audit_config),
            shutdown: queue.shutdown_signal(),
        };
        Self {
            schema,
            generator: RuleGenerator::from_config(config),
            queue,
            executor,
        }
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    /// Validate, persist and enqueue a job
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::JobValidation`] for invalid parameters or an
    /// unknown table; storage errors are passed through. Nothing is queued on
    /// error.
    pub async fn start_job(&self, request: JobRequest) -> Result<JobHandle> {
        let job = self.create_job(request).await?;
        let handle = JobHandle {
            job_id: job.id,
            estimated_record_count: job.estimated_record_count,
        };

        self.launch(job).await?;
        Ok(handle)
    }

    /// Validate the request and persist a pending job without running it
    pub async fn create_job(&self, mut request: JobRequest) -> Result<AnonymizationJob> {
        request.algorithm_params.validate(request.algorithm)?;

        let table = request.target_table.clone();
        let columns = self.schema.describe_table(&table).await?;
        if columns.is_empty() {
            return Err(WardenError::JobValidation(format!(
                "Table '{table}' does not exist or has no columns"
            )));
        }

        let params = &request.algorithm_params;
        let referenced = params
            .quasi_identifiers
            .iter()
            .chain(params.sensitive_attribute.iter())
            .chain(request.filter_predicate.conditions.iter().map(|c| &c.field));
        for field in referenced {
            if !columns.iter().any(|c| &c.name == field) {
                return Err(WardenError::JobValidation(format!(
                    "Column '{field}' does not exist in '{table}'"
                )));
            }
        }

        let rules = self
            .generator
            .generate(&columns, request.algorithm, &request.algorithm_params);
        if request.algorithm == Algorithm::KAnonymity
            && request.algorithm_params.quasi_identifiers.is_empty()
        {
            request.algorithm_params.quasi_identifiers =
                self.generator.default_quasi_identifiers(&columns, &rules);
        }

        let estimate = self
            .executor
            .records
            .count_records(&table, &request.filter_predicate)
            .await?;

        let job = AnonymizationJob::pending(request, rules, estimate);
        self.executor.jobs.insert_job(&job).await?;

        tracing::info!(
            job_id = %job.id,
            table = %job.target_table,
            algorithm = %job.algorithm,
            rules = job.field_rules.len(),
            estimated_records = estimate,
            "Anonymization job created"
        );
        Ok(job)
    }

    /// Run an existing pending job on the queue
    pub async fn resume(&self, job_id: JobId) -> Result<()> {
        let job = self
            .executor
            .jobs
            .get_job(job_id)
            .await?
            .ok_or_else(|| WardenError::JobNotFound(job_id.to_string()))?;
        self.launch(job).await
    }

    /// Claim a pending job in storage and hand it to the queue
    ///
    /// # Errors
    ///
    /// Returns [`WardenError::JobAlreadyRunning`] when another worker, in
    /// this process or another one, claimed the job first.
    async fn launch(&self, mut job: AnonymizationJob) -> Result<()> {
        job.mark_running()?;
        let started_at = job.started_at.unwrap_or_else(Utc::now);
        if !self.executor.jobs.claim_job(job.id, started_at).await? {
            return Err(WardenError::JobAlreadyRunning(job.id.to_string()));
        }
        let executor = self.executor.clone();
        self.queue.submit(job.id, executor.run(job)).await
    }
}

impl JobExecutor {
    /// Process a job already claimed as running
    async fn run(self, mut job: AnonymizationJob) {
        let started = Instant::now();
        log_job_start!(job.id, job.target_table, job.estimated_record_count);

        match self.process(&mut job).await {
            Ok(None) => {
                if let Err(e) = job.mark_completed() {
                    log_error_with_context!(&e, "Failed to complete job");
                }
            }
            Ok(Some(interruption)) => {
                let reason = match interruption {
                    Interruption::Cancelled => {
                        format!("cancelled after {} records", job.processed_count)
                    }
                    Interruption::Shutdown => format!(
                        "cancelled after {} records: process shutting down",
                        job.processed_count
                    ),
                };
                tracing::warn!(job_id = %job.id, reason = %reason, "Anonymization job stopped");
                if let Err(e) = job.mark_failed(reason) {
                    log_error_with_context!(&e, "Failed to mark job as failed");
                }
            }
            Err(e) => {
                tracing::error!(job_id = %job.id, error = %e, "Anonymization job failed");
                if let Err(err) = job.mark_failed(e.to_string()) {
                    log_error_with_context!(&err, "Failed to mark job as failed");
                }
            }
        }

        self.save(&job).await;
        log_job_complete!(
            job.id,
            job.processed_count,
            job.anonymized_count,
            started.elapsed()
        );
    }

    /// Stream and process every matching record
    ///
    /// Errors returned here are fatal to the job.
    async fn process(&self, job: &mut AnonymizationJob) -> Result<Option<Interruption>> {
        let mut transformer = FieldTransformer::from_config(&self.config);
        let enforcer = match (job.algorithm, job.algorithm_params.k) {
            (Algorithm::KAnonymity, Some(k)) => Some(KAnonymityEnforcer::from_rules(
                k as usize,
                &job.algorithm_params.quasi_identifiers,
                &job.field_rules,
                self.config.regions.clone(),
            )),
            _ => None,
        };
        let batch_size = self.config.batch_size;
        let mut after_id: Option<String> = None;

        loop {
            if *self.shutdown.borrow() {
                return Ok(Some(Interruption::Shutdown));
            }
            if self.jobs.is_cancellation_requested(job.id).await? {
                return Ok(Some(Interruption::Cancelled));
            }

            let batch = self
                .records
                .fetch_batch(
                    &job.target_table,
                    &job.filter_predicate,
                    after_id.as_deref(),
                    batch_size,
                )
                .await
                .map_err(|e| WardenError::Database(format!("Failed to read records: {e}")))?;
            let Some(last) = batch.last() else {
                break;
            };
            after_id = Some(last.id.clone());
            let exhausted = batch.len() < batch_size;

            self.process_batch(job, batch, &mut transformer, enforcer.as_ref())
                .await;
            self.save(job).await;
            log_batch_processing!(job.processed_count, job.estimated_record_count);

            if exhausted {
                break;
            }
        }
        Ok(None)
    }

    async fn process_batch(
        &self,
        job: &mut AnonymizationJob,
        batch: Vec<SourceRecord>,
        transformer: &mut FieldTransformer,
        enforcer: Option<&KAnonymityEnforcer>,
    ) {
        let share_offset = job.algorithm_params.share_date_offset;
        let timeout_ms = self.config.record_timeout_ms;
        let mut prepared = Vec::with_capacity(batch.len());
        for source in batch {
            let transformed = transform_within(
                transformer,
                &job.field_rules,
                &source.fields,
                share_offset,
                timeout_ms,
            );
            match transformed {
                Ok((changes, remaining)) => prepared.push(PreparedRecord {
                    source,
                    changes,
                    remaining,
                }),
                Err(e) => {
                    tracing::debug!(
                        job_id = %job.id,
                        record_id = %source.id,
                        error = %e,
                        "Record transform failed"
                    );
                    job.record_failure(&source.id, e);
                }
            }
        }

        if let Some(enforcer) = enforcer {
            enforce_k_anonymity(enforcer, &mut prepared);
        }

        for record in prepared {
            let snapshot = Value::Object(record.source.fields.clone());
            let subject_id = self.subjects.resolve(
                job.target_table.as_str(),
                Some(&record.source.id),
                &[Some(&snapshot)],
            );
            let erasure = ErasureLogEntry::anonymization(
                job.id,
                job.target_table.as_str(),
                record.source.id.clone(),
                subject_id,
                job.algorithm,
                self.config.performed_by.clone(),
            );

            let persisted = tokio::time::timeout(
                record.remaining,
                self.records.persist_anonymized_record(
                    &job.target_table,
                    &record.source.id,
                    &record.changes,
                    &erasure,
                ),
            )
            .await;

            match persisted {
                Ok(Ok(())) => job.record_success(),
                Ok(Err(e)) => {
                    tracing::debug!(
                        job_id = %job.id,
                        record_id = %record.source.id,
                        error = %e,
                        "Record persist failed"
                    );
                    job.record_failure(&record.source.id, e);
                }
                Err(_) => {
                    job.record_failure(&record.source.id, TransformError::Timeout(timeout_ms));
                }
            }
        }
    }

    async fn save(&self, job: &AnonymizationJob) {
        if let Err(e) = self.jobs.save_progress(job).await {
            log_error_with_context!(&e, "Failed to save job progress");
        }
    }
}

/// Apply the rules to one record within the per-record budget
///
/// Returns the changes and the budget left for persisting them.
fn transform_within(
    transformer: &mut FieldTransformer,
    rules: &[FieldRule],
    fields: &Map<String, Value>,
    share_offset: bool,
    timeout_ms: u64,
) -> std::result::Result<(Map<String, Value>, Duration), TransformError> {
    let budget = Duration::from_millis(timeout_ms);
    let started = Instant::now();
    let changes = transformer.apply_rules(rules, fields, share_offset)?;
    let elapsed = started.elapsed();
    if elapsed >= budget {
        return Err(TransformError::Timeout(timeout_ms));
    }
    Ok((changes, budget - elapsed))
}

/// Coarsen quasi-identifiers of the batch and merge them into the changes
fn enforce_k_anonymity(enforcer: &KAnonymityEnforcer, prepared: &mut [PreparedRecord]) {
    let mut released: Vec<Map<String, Value>> = prepared
        .iter()
        .map(|r| {
            let mut merged = r.source.fields.clone();
            merged.extend(r.changes.clone());
            merged
        })
        .collect();

    enforcer.enforce(&mut released);

    for (record, released) in prepared.iter_mut().zip(released) {
        for qi in enforcer.quasi_identifiers() {
            let Some(original) = record.source.fields.get(&qi.field) else {
                continue;
            };
            let value = released.get(&qi.field).cloned().unwrap_or(Value::Null);
            if &value != original || record.changes.contains_key(&qi.field) {
                record.changes.insert(qi.field.clone(), value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::database::Storage;
    use crate::adapters::memory::MemoryStore;
    use crate::config::secret_string;
    use crate::domain::filter::FilterPredicate;
    use crate::domain::job::{AlgorithmParams, JobStatus};
    use crate::domain::TableName;
    use serde_json::json;

    fn config() -> AnonymizationConfig {
        AnonymizationConfig {
            salt: secret_string("unit-test-salt".to_string()),
            batch_size: 2,
            random_seed: Some(3),
            ..Default::default()
        }
    }

    async fn setup() -> (Arc<MemoryStore>, JobOrchestrator, watch::Sender<bool>) {
        let store = Arc::new(MemoryStore::new());
        store
            .create_table(
                "patients",
                &[
                    ("id", "integer"),
                    ("full_name", "text"),
                    ("birth_date", "date"),
                    ("gender", "text"),
                ],
            )
            .await;
        for (id, name, birth) in [
            (1, "Li Wei", "1984-02-03"),
            (2, "Zhang Min", "1986-07-21"),
            (3, "Wang Fang", "1989-11-30"),
        ] {
            store
                .insert_row(
                    "patients",
                    json!({"id": id, "full_name": name, "birth_date": birth, "gender": "F"}),
                )
                .await
                .unwrap();
        }

        let storage = Storage::from_backend(store.clone());
        let (tx, rx) = watch::channel(false);
        let queue = Arc::new(JobQueue::new(2, rx));
        let orchestrator = JobOrchestrator::new(
            storage.jobs,
            storage.records,
            storage.schema,
            &config(),
            &AuditConfig::default(),
            queue,
        );
        (store, orchestrator, tx)
    }

    fn request(algorithm: Algorithm, params: AlgorithmParams) -> JobRequest {
        JobRequest {
            target_table: TableName::new("patients").unwrap(),
            filter_predicate: FilterPredicate::all(),
            algorithm,
            algorithm_params: params,
        }
    }

    #[tokio::test]
    async fn test_invalid_k_is_rejected_synchronously() {
        let (store, orchestrator, _tx) = setup().await;
        let params = AlgorithmParams {
            k: Some(1),
            ..Default::default()
        };
        let result = orchestrator
            .start_job(request(Algorithm::KAnonymity, params))
            .await;
        assert!(matches!(result, Err(WardenError::JobValidation(_))));
        assert!(store.list_jobs(10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_quasi_identifier_is_rejected() {
        let (_store, orchestrator, _tx) = setup().await;
        let params = AlgorithmParams {
            k: Some(2),
            quasi_identifiers: vec!["zip".to_string()],
            ..Default::default()
        };
        let result = orchestrator
            .create_job(request(Algorithm::KAnonymity, params))
            .await;
        assert!(matches!(result, Err(WardenError::JobValidation(_))));
    }

    #[tokio::test]
    async fn test_pseudonymization_job_completes() {
        let (store, orchestrator, _tx) = setup().await;
        let handle = orchestrator
            .start_job(request(Algorithm::Pseudonymization, AlgorithmParams::default()))
            .await
            .unwrap();
        assert_eq!(handle.estimated_record_count, 3);
        orchestrator.queue().wait(handle.job_id).await;

        let job = store.get_job(handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_count, 3);
        assert_eq!(job.anonymized_count, 3);
        assert!(job.error_log.is_empty());

        let row = store.row("patients", "1").await.unwrap();
        assert_ne!(row["full_name"], json!("Li Wei"));
        assert_eq!(row["birth_date"], json!("1984-01-01"));
        assert_eq!(store.erasures().await.len(), 3);
    }

    #[tokio::test]
    async fn test_k_anonymity_defaults_quasi_identifiers() {
        let (store, orchestrator, _tx) = setup().await;
        let params = AlgorithmParams {
            k: Some(3),
            ..Default::default()
        };
        let job = orchestrator
            .create_job(request(Algorithm::KAnonymity, params))
            .await
            .unwrap();
        assert_eq!(
            job.algorithm_params.quasi_identifiers,
            vec!["birth_date".to_string(), "gender".to_string()]
        );

        orchestrator.resume(job.id).await.unwrap();
        orchestrator.queue().wait(job.id).await;

        // Batches of two records cannot reach k = 3, so every tuple is suppressed
        for id in ["1", "2", "3"] {
            let row = store.row("patients", id).await.unwrap();
            assert!(row["birth_date"].is_null());
            assert!(row["gender"].is_null());
        }
    }

    #[tokio::test]
    async fn test_shutdown_stops_job() {
        let (store, orchestrator, tx) = setup().await;
        tx.send(true).unwrap();
        let handle = orchestrator
            .start_job(request(Algorithm::Pseudonymization, AlgorithmParams::default()))
            .await
            .unwrap();
        orchestrator.queue().wait(handle.job_id).await;

        let job = store.get_job(handle.job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.processed_count, 0);
        assert!(job.error_log[0].starts_with("cancelled after 0 records"));
    }

    #[tokio::test]
    async fn test_job_claimed_by_one_worker_only() {
        let (store, first, _tx) = setup().await;
        let storage = Storage::from_backend(store.clone());
        let (_tx2, rx2) = watch::channel(false);
        let second = JobOrchestrator::new(
            storage.jobs,
            storage.records,
            storage.schema,
            &config(),
            &AuditConfig::default(),
            Arc::new(JobQueue::new(2, rx2)),
        );

        let job = first
            .create_job(request(Algorithm::Pseudonymization, AlgorithmParams::default()))
            .await
            .unwrap();
        first.resume(job.id).await.unwrap();
        assert!(matches!(
            second.resume(job.id).await,
            Err(WardenError::JobAlreadyRunning(_))
        ));
        first.queue().wait(job.id).await;

        let job = store.get_job(job.id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.processed_count, 3);
        assert_eq!(store.erasures().await.len(), 3);
    }

    /// Random source that stalls on every draw
    struct StallingSource(Duration);

    impl crate::anonymization::random::RandomSource for StallingSource {
        fn next_unit(&mut self) -> f64 {
            std::thread::sleep(self.0);
            0.5
        }
    }

    #[test]
    fn test_slow_transform_is_a_timeout() {
        let mut transformer = FieldTransformer::from_config(&config())
            .with_random_source(Box::new(StallingSource(Duration::from_millis(30))));
        let rules = vec![FieldRule::new(
            "admitted",
            crate::domain::Transform::DateShift { max_shift_days: 10 },
        )];
        let record = json!({"admitted": "2021-01-10"});
        let fields = record.as_object().unwrap();

        let err = transform_within(&mut transformer, &rules, fields, false, 5).unwrap_err();
        assert!(matches!(err, TransformError::Timeout(5)));

        let (changes, remaining) =
            transform_within(&mut transformer, &rules, fields, false, 5_000).unwrap();
        assert!(changes.contains_key("admitted"));
        assert!(remaining <= Duration::from_millis(5_000 - 30));
    }
}
