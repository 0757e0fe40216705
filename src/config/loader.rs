//! Configuration loader with TOML parsing and environment variable overrides

use super::schema::{DatabaseTarget, Environment, WardenConfig};
use super::secret::secret_string;
use crate::domain::errors::WardenError;
use crate::domain::result::Result;
use regex::Regex;
use std::fs;
use std::path::Path;

/// Loads configuration from a TOML file
///
/// This function:
/// 1. Reads the TOML file
/// 2. Performs environment variable substitution (${VAR} syntax)
/// 3. Parses the TOML into WardenConfig
/// 4. Applies environment variable overrides (WARDEN_* prefix)
/// 5. Validates the configuration
///
/// # Errors
///
/// Returns [`WardenError::Configuration`] if the file cannot be read, a
/// referenced environment variable is unset, parsing fails or validation
/// fails.
///
/// # Examples
///
/// ```no_run
/// use warden::config::loader::load_config;
///
/// let config = load_config("warden.toml").expect("Failed to load config");
/// ```
pub fn load_config(path: impl AsRef<Path>) -> Result<WardenConfig> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(WardenError::Configuration(format!(
            "Configuration file not found: {}",
            path.display()
        )));
    }

    let contents = fs::read_to_string(path).map_err(|e| {
        WardenError::Configuration(format!(
            "Failed to read configuration file {}: {}",
            path.display(),
            e
        ))
    })?;

    load_config_from_str(&contents)
}

/// Same as [`load_config`] for in-memory TOML
pub fn load_config_from_str(contents: &str) -> Result<WardenConfig> {
    let contents = substitute_env_vars(contents)?;

    let mut config: WardenConfig = toml::from_str(&contents)
        .map_err(|e| WardenError::Configuration(format!("Failed to parse TOML: {e}")))?;

    apply_env_overrides(&mut config)?;

    config.validate().map_err(|e| {
        WardenError::Configuration(format!("Configuration validation failed: {e}"))
    })?;

    Ok(config)
}

/// Substitutes environment variables in the format ${VAR_NAME}
///
/// Comment lines are left untouched. All missing variables are reported
/// together.
fn substitute_env_vars(input: &str) -> Result<String> {
    let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}")
        .map_err(|e| WardenError::Configuration(format!("Invalid substitution pattern: {e}")))?;
    let mut result = String::with_capacity(input.len());
    let mut missing_vars: Vec<String> = Vec::new();

    for line in input.lines() {
        if line.trim_start().starts_with('#') {
            result.push_str(line);
            result.push('\n');
            continue;
        }

        let mut processed_line = line.to_string();
        for cap in re.captures_iter(line) {
            let var_name = &cap[1];
            match std::env::var(var_name) {
                Ok(value) => {
                    processed_line = processed_line.replace(&format!("${{{var_name}}}"), &value);
                }
                Err(_) => {
                    if !missing_vars.iter().any(|v| v == var_name) {
                        missing_vars.push(var_name.to_string());
                    }
                }
            }
        }
        result.push_str(&processed_line);
        result.push('\n');
    }

    if !missing_vars.is_empty() {
        return Err(WardenError::Configuration(format!(
            "Missing required environment variables: {}",
            missing_vars.join(", ")
        )));
    }

    Ok(result)
}

fn parse_override<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.trim().parse().map_err(|_| {
        WardenError::Configuration(format!("Invalid value '{value}' for {name}"))
    })
}

/// Applies environment variable overrides using WARDEN_* prefix
///
/// Environment variables follow the pattern: WARDEN_<SECTION>_<KEY>
/// For example: WARDEN_ANONYMIZATION_BATCH_SIZE, WARDEN_DATABASE_TARGET
fn apply_env_overrides(config: &mut WardenConfig) -> Result<()> {
    // Application overrides
    if let Ok(val) = std::env::var("WARDEN_APPLICATION_LOG_LEVEL") {
        config.application.log_level = val;
    }
    if let Ok(val) = std::env::var("WARDEN_ENVIRONMENT") {
        config.environment = match val.to_lowercase().as_str() {
            "development" => Environment::Development,
            "staging" => Environment::Staging,
            "production" => Environment::Production,
            _ => {
                return Err(WardenError::Configuration(format!(
                    "Invalid value '{val}' for WARDEN_ENVIRONMENT"
                )))
            }
        };
    }

    // Database overrides
    if let Ok(val) = std::env::var("WARDEN_DATABASE_TARGET") {
        config.database.target = match val.to_lowercase().as_str() {
            "postgresql" => DatabaseTarget::PostgreSQL,
            "memory" => DatabaseTarget::Memory,
            _ => {
                return Err(WardenError::Configuration(format!(
                    "Invalid value '{val}' for WARDEN_DATABASE_TARGET"
                )))
            }
        };
    }

    // PostgreSQL overrides (only if PostgreSQL is configured)
    if let Some(ref mut pg_config) = config.postgresql {
        if let Ok(val) = std::env::var("WARDEN_POSTGRESQL_CONNECTION_STRING") {
            pg_config.connection_string = secret_string(val);
        }
        if let Ok(val) = std::env::var("WARDEN_POSTGRESQL_MAX_CONNECTIONS") {
            pg_config.max_connections = parse_override("WARDEN_POSTGRESQL_MAX_CONNECTIONS", &val)?;
        }
    }

    // Detection overrides
    if let Ok(val) = std::env::var("WARDEN_DETECTION_ENABLED") {
        config.detection.enabled = parse_override("WARDEN_DETECTION_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("WARDEN_DETECTION_UNUSUAL_ACCESS_THRESHOLD") {
        config.detection.unusual_access_threshold =
            parse_override("WARDEN_DETECTION_UNUSUAL_ACCESS_THRESHOLD", &val)?;
    }

    // Anonymization overrides
    if let Ok(val) = std::env::var("WARDEN_ANONYMIZATION_SALT") {
        config.anonymization.salt = secret_string(val);
    }
    if let Ok(val) = std::env::var("WARDEN_ANONYMIZATION_BATCH_SIZE") {
        config.anonymization.batch_size = parse_override("WARDEN_ANONYMIZATION_BATCH_SIZE", &val)?;
    }
    if let Ok(val) = std::env::var("WARDEN_ANONYMIZATION_MAX_CONCURRENT_JOBS") {
        config.anonymization.max_concurrent_jobs =
            parse_override("WARDEN_ANONYMIZATION_MAX_CONCURRENT_JOBS", &val)?;
    }
    if let Ok(val) = std::env::var("WARDEN_ANONYMIZATION_NATIONAL_ID_LAYOUT") {
        config.anonymization.national_id_layout =
            parse_override("WARDEN_ANONYMIZATION_NATIONAL_ID_LAYOUT", &val)?;
    }
    if let Ok(val) = std::env::var("WARDEN_ANONYMIZATION_RANDOM_SEED") {
        config.anonymization.random_seed =
            Some(parse_override("WARDEN_ANONYMIZATION_RANDOM_SEED", &val)?);
    }

    // Logging overrides
    if let Ok(val) = std::env::var("WARDEN_LOGGING_LOCAL_ENABLED") {
        config.logging.local_enabled = parse_override("WARDEN_LOGGING_LOCAL_ENABLED", &val)?;
    }
    if let Ok(val) = std::env::var("WARDEN_LOGGING_LOCAL_PATH") {
        config.logging.local_path = val;
    }

    Ok(())
}
