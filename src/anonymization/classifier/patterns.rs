//! Sensitivity marker library
//!
//! Markers are regular expressions grouped by name and loaded from TOML.
//! The built-in library is embedded at compile time; deployments can point
//! `classification.patterns_file` at their own.

use crate::domain::context::ResultExt;
use crate::domain::{Result, WardenError};
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Marker group definition from TOML
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerDefinition {
    /// Regex patterns, matched against lower-cased text
    pub patterns: Vec<String>,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Deserialize)]
struct MarkerLibrary {
    markers: BTreeMap<String, MarkerDefinition>,
}

/// Compiled marker with its group name
#[derive(Debug, Clone)]
pub struct CompiledMarker {
    pub name: String,
    pub regex: Regex,
}

/// Registry of compiled sensitivity markers
#[derive(Debug, Clone)]
pub struct MarkerRegistry {
    markers: Vec<CompiledMarker>,
}

impl MarkerRegistry {
    /// Load markers from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).with_context(|| {
            format!("Failed to read marker library: {}", path.as_ref().display())
        })?;

        Self::from_toml(&content)
    }

    /// Load markers from TOML content
    pub fn from_toml(content: &str) -> Result<Self> {
        let library: MarkerLibrary =
            toml::from_str(content).context("Failed to parse marker library TOML")?;

        let mut markers = Vec::new();
        for (name, def) in library.markers {
            for pattern in &def.patterns {
                let regex = Regex::new(pattern).map_err(|e| {
                    WardenError::Configuration(format!(
                        "Invalid regex in marker '{name}': {pattern}: {e}"
                    ))
                })?;
                markers.push(CompiledMarker {
                    name: name.clone(),
                    regex,
                });
            }
        }

        if markers.is_empty() {
            return Err(WardenError::Configuration(
                "Marker library defines no patterns".to_string(),
            ));
        }

        Ok(Self { markers })
    }

    /// Built-in marker library
    pub fn default_markers() -> Result<Self> {
        let default_toml = include_str!("../../../patterns/sensitivity_markers.toml");
        Self::from_toml(default_toml)
    }

    pub fn all_markers(&self) -> &[CompiledMarker] {
        &self.markers
    }

    /// Name of the first marker matching `text`, if any
    pub fn first_match(&self, text: &str) -> Option<&str> {
        self.markers
            .iter()
            .find(|m| m.regex.is_match(text))
            .map(|m| m.name.as_str())
    }
}
