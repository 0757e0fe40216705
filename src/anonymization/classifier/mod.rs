//! Sensitive Data Classifier
//!
//! Maps a table name and record payload to a set of data categories and a
//! sensitivity flag. Classification is total: anything it does not recognize
//! falls back to `{system_data}` / not sensitive.

pub mod patterns;

use crate::config::ClassificationConfig;
use crate::domain::Result;
use patterns::MarkerRegistry;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};

/// Category assigned to tables with no known mapping
pub const DEFAULT_CATEGORY: &str = "system_data";

/// Built-in table → data categories
const TABLE_CATEGORIES: &[(&str, &[&str])] = &[
    ("patients", &["personal_data", "contact_data", "health_data"]),
    ("users", &["personal_data", "contact_data"]),
    ("medical_records", &["health_data", "sensitive_personal_data"]),
    (
        "medications",
        &["health_data", "prescription_data", "sensitive_personal_data"],
    ),
    (
        "prescriptions",
        &["health_data", "prescription_data", "sensitive_personal_data"],
    ),
    ("lab_results", &["health_data", "sensitive_personal_data"]),
    ("diagnoses", &["health_data", "sensitive_personal_data"]),
    ("appointments", &["personal_data", "health_data"]),
    ("billing", &["financial_data", "personal_data"]),
    ("payments", &["financial_data", "personal_data"]),
    ("consents", &["personal_data"]),
];

/// Tables whose entries are sensitive regardless of payload
const SENSITIVE_TABLES: &[&str] = &[
    "patients",
    "medical_records",
    "medications",
    "prescriptions",
    "lab_results",
    "diagnoses",
];

/// Result of classifying one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub data_categories: BTreeSet<String>,
    pub sensitive: bool,
}

/// Table- and content-based classifier
#[derive(Debug, Clone)]
pub struct SensitiveDataClassifier {
    table_categories: BTreeMap<String, BTreeSet<String>>,
    sensitive_tables: BTreeSet<String>,
    markers: MarkerRegistry,
}

impl SensitiveDataClassifier {
    /// Build from the built-in tables plus configured additions
    ///
    /// # Errors
    ///
    /// Returns a configuration error if the marker library cannot be loaded.
    pub fn from_config(config: &ClassificationConfig) -> Result<Self> {
        let markers = match config.patterns_file {
            Some(ref path) => MarkerRegistry::from_file(path)?,
            None => MarkerRegistry::default_markers()?,
        };
        Ok(Self::new(config, markers))
    }

    pub fn new(config: &ClassificationConfig, markers: MarkerRegistry) -> Self {
        let mut table_categories: BTreeMap<String, BTreeSet<String>> = TABLE_CATEGORIES
            .iter()
            .map(|(table, cats)| {
                (
                    table.to_string(),
                    cats.iter().map(|c| c.to_string()).collect(),
                )
            })
            .collect();
        for (table, cats) in &config.table_categories {
            table_categories
                .entry(table.clone())
                .or_default()
                .extend(cats.iter().cloned());
        }

        let sensitive_tables = SENSITIVE_TABLES
            .iter()
            .map(|t| t.to_string())
            .chain(config.sensitive_tables.iter().cloned())
            .collect();

        Self {
            table_categories,
            sensitive_tables,
            markers,
        }
    }

    pub fn is_sensitive_table(&self, table: &str) -> bool {
        self.sensitive_tables.contains(table)
    }

    /// Classify an operation on `table` carrying `payload`
    pub fn classify(&self, table: &str, payload: Option<&Value>) -> Classification {
        let data_categories = self
            .table_categories
            .get(table)
            .filter(|cats| !cats.is_empty())
            .cloned()
            .unwrap_or_else(|| BTreeSet::from([DEFAULT_CATEGORY.to_string()]));

        let sensitive = self.is_sensitive_table(table) || self.payload_is_sensitive(payload);

        Classification {
            data_categories,
            sensitive,
        }
    }

    fn payload_is_sensitive(&self, payload: Option<&Value>) -> bool {
        let Some(payload) = payload.filter(|p| !p.is_null()) else {
            return false;
        };
        let Ok(text) = serde_json::to_string(payload) else {
            return false;
        };
        match self.markers.first_match(&text.to_lowercase()) {
            Some(marker) => {
                tracing::debug!(marker, "Payload matched sensitivity marker");
                true
            }
            None => false,
        }
    }
}
