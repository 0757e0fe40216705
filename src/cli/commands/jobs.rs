//! Job management commands: `job-status`, `jobs`, `run-job` and `cancel`

use crate::cli::commands::anonymize::run_and_report;
use crate::cli::commands::{open_reporting_service, open_service, print_json};
use crate::domain::ids::JobId;
use crate::domain::job::{AnonymizationJob, JobStatus};
use crate::domain::WardenError;
use clap::Args;
use tokio::sync::watch;

/// Arguments for the job-status command
#[derive(Args, Debug)]
pub struct JobStatusArgs {
    /// Job id
    pub job_id: JobId,

    /// Print the job as JSON
    #[arg(long)]
    pub json: bool,
}

impl JobStatusArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let job = match service.get_job_status(self.job_id).await {
            Ok(job) => job,
            Err(WardenError::JobNotFound(_)) => {
                println!("❌ Job {} not found", self.job_id);
                return Ok(5);
            }
            Err(e) => {
                println!("❌ Failed to read job {}", self.job_id);
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            print_json(&job)?;
            return Ok(0);
        }

        println!("📊 Job {}", job.id);
        println!();
        println!("  Status: {}", status_label(job.status));
        println!("  Table: {}", job.target_table);
        println!("  Filter: {}", job.filter_predicate);
        println!("  Algorithm: {}", job.algorithm);
        println!(
            "  Progress: {}/{} processed, {} anonymized",
            job.processed_count, job.estimated_record_count, job.anonymized_count
        );
        println!("  Rules: {}", job.field_rules.len());
        for rule in &job.field_rules {
            println!("    - {}: {}", rule.field_name, rule.transform.method());
        }
        println!("  Created: {}", job.created_at.format("%Y-%m-%d %H:%M:%S"));
        if let Some(completed_at) = job.completed_at {
            println!("  Completed: {}", completed_at.format("%Y-%m-%d %H:%M:%S"));
        }
        if job.cancellation_requested && !job.status.is_terminal() {
            println!("  Cancellation requested");
        }
        if !job.error_log.is_empty() {
            println!("  Errors:");
            for error in &job.error_log {
                println!("    - {error}");
            }
        }
        println!();
        Ok(0)
    }
}

/// Arguments for the jobs command
#[derive(Args, Debug)]
pub struct JobsArgs {
    /// Maximum number of jobs to show
    #[arg(long, default_value_t = 20)]
    pub limit: usize,

    /// Print the jobs as JSON
    #[arg(long)]
    pub json: bool,
}

impl JobsArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        let jobs = match service.list_jobs(self.limit).await {
            Ok(jobs) => jobs,
            Err(e) => {
                println!("❌ Failed to list jobs");
                println!("   Error: {e}");
                return Ok(5);
            }
        };

        if self.json {
            print_json(&jobs)?;
            return Ok(0);
        }
        if jobs.is_empty() {
            println!("No anonymization jobs found.");
            println!("Run 'warden anonymize <table>' to create one.");
            return Ok(0);
        }

        println!("Found {} job(s):", jobs.len());
        println!();
        println!(
            "{:<38} {:<24} {:<22} {:<15} {:<12} {:<20}",
            "Job ID", "Table", "Algorithm", "Status", "Processed", "Created"
        );
        println!("{}", "-".repeat(131));
        for job in &jobs {
            print_row(job);
        }
        println!();
        Ok(0)
    }
}

fn print_row(job: &AnonymizationJob) {
    println!(
        "{:<38} {:<24} {:<22} {:<15} {:<12} {:<20}",
        job.id.to_string(),
        job.target_table.as_str(),
        job.algorithm.as_str(),
        status_label(job.status),
        format!("{}/{}", job.processed_count, job.estimated_record_count),
        job.created_at.format("%Y-%m-%d %H:%M:%S").to_string()
    );
}

fn status_label(status: JobStatus) -> &'static str {
    match status {
        JobStatus::Pending => "⏸️  Pending",
        JobStatus::Running => "🔄 Running",
        JobStatus::Completed => "✅ Completed",
        JobStatus::Failed => "❌ Failed",
    }
}

/// Arguments for the run-job command
#[derive(Args, Debug)]
pub struct RunJobArgs {
    /// Id of a pending job
    pub job_id: JobId,

    /// Print the finished job as JSON
    #[arg(long)]
    pub json: bool,
}

impl RunJobArgs {
    pub async fn execute(
        &self,
        config_path: &str,
        shutdown_signal: watch::Receiver<bool>,
    ) -> anyhow::Result<i32> {
        tracing::info!(job_id = %self.job_id, "Starting run-job command");
        let (_config, service) = match open_service(config_path, shutdown_signal).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };
        run_and_report(&service, self.job_id, self.json).await
    }
}

/// Arguments for the cancel command
#[derive(Args, Debug)]
pub struct CancelArgs {
    /// Job id
    pub job_id: JobId,
}

impl CancelArgs {
    pub async fn execute(&self, config_path: &str) -> anyhow::Result<i32> {
        let (_config, service) = match open_reporting_service(config_path).await {
            Ok(opened) => opened,
            Err(code) => return Ok(code),
        };

        match service.cancel_job(self.job_id).await {
            Ok(()) => {
                println!("🛑 Cancellation requested for job {}", self.job_id);
                println!("   The job stops before its next batch.");
                Ok(0)
            }
            Err(e) => {
                println!("❌ Cannot cancel job {}", self.job_id);
                println!("   Error: {e}");
                Ok(5)
            }
        }
    }
}
