//! CLI interface and argument parsing
//!
//! This module provides the command-line interface for Warden using clap.

pub mod commands;

use clap::{Parser, Subcommand};

/// Warden - privacy-compliant audit trail and data anonymization
#[derive(Parser, Debug)]
#[command(name = "warden")]
#[command(version, about, long_about = None)]
#[command(author = "Warden Contributors")]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "warden.toml", env = "WARDEN_CONFIG")]
    pub config: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, env = "WARDEN_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create an anonymization job for a table
    Anonymize(commands::anonymize::AnonymizeArgs),

    /// Execute a pending anonymization job
    RunJob(commands::jobs::RunJobArgs),

    /// Show one anonymization job
    JobStatus(commands::jobs::JobStatusArgs),

    /// List recent anonymization jobs
    Jobs(commands::jobs::JobsArgs),

    /// Request cancellation of a job
    Cancel(commands::jobs::CancelArgs),

    /// Query the audit trail
    Audit(commands::reports::AuditArgs),

    /// List compliance violations
    Violations(commands::reports::ViolationsArgs),

    /// Query the data erasure log
    Erasures(commands::reports::ErasuresArgs),

    /// Create or update the Warden database schema
    Migrate(commands::migrate::MigrateArgs),

    /// Validate configuration file
    ValidateConfig(commands::validate::ValidateArgs),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parse_anonymize() {
        let cli = Cli::parse_from(["warden", "anonymize", "patients", "-k", "3", "--wait"]);
        assert_eq!(cli.config, "warden.toml");
        match cli.command {
            Commands::Anonymize(args) => {
                assert_eq!(args.k, Some(3));
                assert!(args.wait);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_parse_with_config() {
        let cli = Cli::parse_from(["warden", "--config", "custom.toml", "jobs"]);
        assert_eq!(cli.config, "custom.toml");
    }

    #[test]
    fn test_cli_parse_with_log_level() {
        let cli = Cli::parse_from(["warden", "--log-level", "debug", "migrate"]);
        assert_eq!(cli.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_cli_parse_validate_config() {
        let cli = Cli::parse_from(["warden", "validate-config"]);
        assert!(matches!(cli.command, Commands::ValidateConfig(_)));
    }

    #[test]
    fn test_cli_rejects_unknown_algorithm() {
        let result = Cli::try_parse_from(["warden", "anonymize", "patients", "-a", "shuffle"]);
        assert!(result.is_err());
    }
}
