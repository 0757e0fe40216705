//! Field-level anonymization rules
//!
//! A [`FieldRule`] binds one column of the target table to one transform.
//! Rules are generated once per job and never change afterwards.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Transform primitive name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransformMethod {
    Hash,
    Generalize,
    Suppress,
    Noise,
    DateShift,
    Range,
    Categorical,
}

impl TransformMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Generalize => "generalize",
            Self::Suppress => "suppress",
            Self::Noise => "noise",
            Self::DateShift => "date_shift",
            Self::Range => "range",
            Self::Categorical => "categorical",
        }
    }
}

impl fmt::Display for TransformMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Field-specific generalization strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GeneralizationKind {
    /// Keep region code and birth year segments only
    NationalId,
    /// Map to a known region, else the country
    Address,
    /// Keep the leading area code digits
    Phone,
    /// Keep the mail domain
    Email,
    /// Truncate to January 1 of the birth year
    BirthDate,
    /// Truncate to the 3-character category
    MedicalCode,
}

/// Transform with its method-specific parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "method", content = "parameters", rename_all = "snake_case")]
pub enum Transform {
    Hash,
    Generalize { kind: GeneralizationKind },
    Suppress,
    Noise { variance: f64 },
    DateShift { max_shift_days: u32 },
    Range { range_size: u64 },
    Categorical { mapping: BTreeMap<String, String> },
}

impl Transform {
    /// Primitive this transform uses
    pub fn method(&self) -> TransformMethod {
        match self {
            Self::Hash => TransformMethod::Hash,
            Self::Generalize { .. } => TransformMethod::Generalize,
            Self::Suppress => TransformMethod::Suppress,
            Self::Noise { .. } => TransformMethod::Noise,
            Self::DateShift { .. } => TransformMethod::DateShift,
            Self::Range { .. } => TransformMethod::Range,
            Self::Categorical { .. } => TransformMethod::Categorical,
        }
    }
}

/// What a column means, independent of its declared SQL type
///
/// Name-based semantics take precedence over type-based defaults when rules
/// are generated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldSemantic {
    NationalId,
    Name,
    Phone,
    Email,
    Address,
    BirthDate,
    MedicalCondition,
    Age,
    /// Quasi-identifier kept verbatim (e.g. gender)
    Retain,
    /// Always replaced by the suppression placeholder
    Suppress,
    /// Never touched
    Ignore,
}

/// One rule per anonymized field of a target table
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldRule {
    pub field_name: String,
    pub transform: Transform,
}

impl FieldRule {
    pub fn new(field_name: impl Into<String>, transform: Transform) -> Self {
        Self {
            field_name: field_name.into(),
            transform,
        }
    }

    pub fn method(&self) -> TransformMethod {
        self.transform.method()
    }
}

impl fmt::Display for FieldRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.transform {
            Transform::Generalize { kind } => {
                write!(f, "{} -> generalize({:?})", self.field_name, kind)
            }
            Transform::Noise { variance } => {
                write!(f, "{} -> noise(variance={variance})", self.field_name)
            }
            Transform::DateShift { max_shift_days } => {
                write!(f, "{} -> date_shift(±{max_shift_days}d)", self.field_name)
            }
            Transform::Range { range_size } => {
                write!(f, "{} -> range({range_size})", self.field_name)
            }
            other => write!(f, "{} -> {}", self.field_name, other.method()),
        }
    }
}
