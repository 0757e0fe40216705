//! Anonymize command implementation
//!
//! Creates an anonymization job. With `--wait` the job is executed in this
//! process and its final state is reported; otherwise it stays `pending`
//! until `warden run-job` picks it up.

use crate::cli::commands::{open_service, print_json};
use crate::core::ComplianceService;
use crate::domain::filter::FilterPredicate;
use crate::domain::ids::{JobId, TableName};
use crate::domain::job::{Algorithm, AlgorithmParams, AnonymizationJob, JobRequest, JobStatus};
use crate::domain::WardenError;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the anonymize command
#[derive(Args, Debug)]
pub struct AnonymizeArgs {
    /// Target table
    pub table: TableName,

    /// Record filter, e.g. "created_at < 2015-01-01 AND status = 'archived'"
    #[arg(long, default_value = "")]
    pub filter: FilterPredicate,

    /// Algorithm (k_anonymity, l_diversity, differential_privacy, pseudonymization)
    #[arg(short, long, default_value = "k_anonymity")]
    pub algorithm: Algorithm,

    /// Minimum equivalence class size for k_anonymity
    #[arg(short, long)]
    pub k: Option<u32>,

    /// Distinct sensitive values per class for l_diversity
    #[arg(long)]
    pub l: Option<u32>,

    /// Privacy budget for differential_privacy
    #[arg(long)]
    pub epsilon: Option<f64>,

    /// Quasi-identifier column (repeatable)
    #[arg(long = "quasi-identifier", value_name = "COLUMN")]
    pub quasi_identifiers: Vec<String>,

    /// Sensitive attribute for l_diversity
    #[arg(long)]
    pub sensitive_attribute: Option<String>,

    /// Override the configured date shift window
    #[arg(long)]
    pub max_date_shift_days: Option<u32>,

    /// Shift all dates of a record by the same offset
    #[arg(long)]
    pub share_date_offset: bool,

    /// Execute the job now and wait for it to finish
    #[arg(short, long)]
    pub wait: bool,

    /// Print the job as JSON
    #[arg(long)]
    pub json: bool,
}

impl AnonymizeArgs {
    fn request(&self) -> JobRequest {
        JobRequest {
            target_table: self.table.clone(),
            filter_predicate: self.filter.clone(),
            algorithm: self.algorithm,
            algorithm_params: AlgorithmParams {
                k: self.k,
                l: self.l,
                epsilon: self.epsilon,
                quasi_identifiers: self.quasi_identifiers.clone(),
                sensitive_attribute: self.sensitive_attribute.clone(),
                max_date_shift_days: self.max_date_shift_days,
                share_date_offset: self.share_date_offset,
            },
        }
    }

    /// Execute the anonymize command
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(
            table = %self.table,
            algorithm = %self.algorithm,
            "Starting anonymize command"
        );

        let (_config, service) = match open_service(config_path, shutdown_signal).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let handle = match service.create_anonymization_job(self.request()).await {
            Ok(handle) => handle,
            Err(WardenError::JobValidation(e)) => {
                println!("❌ Invalid anonymization job");
                println!("   Error: {e}");
                return Ok(2);
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to create anonymization job");
                println!("❌ Failed to create anonymization job");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        println!("📝 Created job {}", handle.job_id);
        println!("   Table: {}", self.table);
        println!("   Algorithm: {}", self.algorithm);
        println!("   Matching records: {}", handle.estimated_record_count);

        if !self.wait {
            println!();
            println!("Run 'warden run-job {}' to execute it.", handle.job_id);
            return Ok(0);
        }

        run_and_report(&service, handle.job_id, self.json).await
    }
}

/// Execute a pending job in this process and print its outcome
pub(crate) async fn run_and_report(
    service: &ComplianceService,
    job_id: JobId,
    json: bool,
) -> anyhow::Result<i32> {
    if let Err(e) = service.run_job(job_id).await {
        println!("❌ Failed to start job {job_id}");
        println!("   Error: {e}");
        return Ok(5);
    }

    println!();
    println!("🚀 Running job {job_id}...");
    let job = match service.wait_for_job(job_id).await {
        Ok(job) => job,
        Err(e) => {
            println!("❌ Failed to read job {job_id}");
            println!("   Error: {e}");
            return Ok(5);
        }
    };

    if json {
        print_json(&job)?;
    } else {
        print_summary(&job);
    }
    Ok(exit_code(&job))
}

fn print_summary(job: &AnonymizationJob) {
    println!();
    println!("📊 Anonymization Summary:");
    println!("  Status: {}", job.status);
    println!("  Processed: {}", job.processed_count);
    println!("  Anonymized: {}", job.anonymized_count);
    println!("  Failed: {}", job.failed_count());
    if let (Some(started), Some(completed)) = (job.started_at, job.completed_at) {
        let duration = completed - started;
        println!(
            "  Duration: {:.2}s",
            duration.num_milliseconds() as f64 / 1000.0
        );
    }

    if !job.error_log.is_empty() {
        println!();
        println!("⚠️  Errors:");
        for error in job.error_log.iter().take(10) {
            println!("  - {error}");
        }
        if job.error_log.len() > 10 {
            println!("  ... and {} more", job.error_log.len() - 10);
        }
    }
    println!();
}

/// 0 when everything was anonymized, 1 for partial success, 5 for a failed job
fn exit_code(job: &AnonymizationJob) -> i32 {
    match job.status {
        JobStatus::Completed if job.failed_count() == 0 => {
            println!("✅ Anonymization completed successfully!");
            0
        }
        JobStatus::Completed => {
            println!("⚠️  Anonymization completed with failures");
            1
        }
        _ => {
            println!("❌ Anonymization job failed");
            5
        }
    }
}
