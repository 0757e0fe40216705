//! Anonymization Rule Generator
//!
//! Turns a table's column list into one [`FieldRule`] per anonymized column.
//! Name-based semantics win over type-based defaults, and the output depends
//! only on the columns, the algorithm and the configuration, so the same
//! schema always yields the same rule set.

use crate::adapters::database::traits::ColumnInfo;
use crate::config::AnonymizationConfig;
use crate::domain::job::{Algorithm, AlgorithmParams};
use crate::domain::rule::{FieldRule, FieldSemantic, GeneralizationKind, Transform};
use std::collections::BTreeMap;

/// Columns never touched by anonymization
pub const SYSTEM_COLUMNS: &[&str] = &["id", "created_at", "updated_at"];

/// Bucket width for age columns
pub const AGE_RANGE_SIZE: u64 = 10;

const NAME_SEMANTICS: &[(&[&str], FieldSemantic)] = &[
    (
        &["national_id", "id_card", "id_number", "ssn", "passport", "passport_number"],
        FieldSemantic::NationalId,
    ),
    (
        &["name", "full_name", "first_name", "last_name", "patient_name"],
        FieldSemantic::Name,
    ),
    (
        &["phone", "phone_number", "mobile", "telephone", "contact_phone"],
        FieldSemantic::Phone,
    ),
    (&["email", "email_address"], FieldSemantic::Email),
    (
        &["address", "home_address", "street_address"],
        FieldSemantic::Address,
    ),
    (
        &["birth_date", "date_of_birth", "dob", "birthday"],
        FieldSemantic::BirthDate,
    ),
    (
        &[
            "diagnosis",
            "condition",
            "medical_condition",
            "diagnosis_code",
            "icd_code",
            "chief_complaint",
        ],
        FieldSemantic::MedicalCondition,
    ),
    (&["age"], FieldSemantic::Age),
    (&["gender", "sex"], FieldSemantic::Retain),
    (&["password", "password_hash"], FieldSemantic::Suppress),
];

/// Coarse classification of a declared SQL type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeFamily {
    Temporal,
    Numeric,
    Text,
    Other,
}

impl TypeFamily {
    pub fn of(declared_type: &str) -> Self {
        let ty = declared_type.trim().to_lowercase();
        if ty == "date" || ty.starts_with("timestamp") {
            Self::Temporal
        } else if [
            "smallint",
            "integer",
            "int",
            "int2",
            "int4",
            "int8",
            "bigint",
            "numeric",
            "decimal",
            "real",
            "double precision",
            "float4",
            "float8",
        ]
        .iter()
        .any(|n| ty == *n || ty.starts_with(&format!("{n}(")))
        {
            Self::Numeric
        } else if ty == "text"
            || ty == "citext"
            || ty.starts_with("character")
            || ty.starts_with("varchar")
            || ty.starts_with("char")
        {
            Self::Text
        } else {
            Self::Other
        }
    }
}

/// Deterministic schema → rule mapping
#[derive(Debug, Clone)]
pub struct RuleGenerator {
    field_semantics: BTreeMap<String, FieldSemantic>,
    categorical_mappings: BTreeMap<String, BTreeMap<String, String>>,
    default_max_date_shift_days: u32,
}

impl RuleGenerator {
    pub fn from_config(config: &AnonymizationConfig) -> Self {
        Self {
            field_semantics: config.field_semantics.clone(),
            categorical_mappings: config.categorical_mappings.clone(),
            default_max_date_shift_days: config.default_max_date_shift_days,
        }
    }

    /// Semantic of a column from configuration overrides, then the built-in name table
    pub fn semantic_for(&self, column: &str) -> Option<FieldSemantic> {
        let name = column.to_lowercase();
        if let Some(semantic) = self.field_semantics.get(&name) {
            return Some(*semantic);
        }
        NAME_SEMANTICS
            .iter()
            .find(|(names, _)| names.contains(&name.as_str()))
            .map(|(_, semantic)| *semantic)
    }

    /// Generate rules for a column list
    pub fn generate(
        &self,
        columns: &[ColumnInfo],
        algorithm: Algorithm,
        params: &AlgorithmParams,
    ) -> Vec<FieldRule> {
        columns
            .iter()
            .filter(|c| !SYSTEM_COLUMNS.contains(&c.name.to_lowercase().as_str()))
            .filter_map(|c| {
                self.rule_for(c, algorithm, params)
                    .map(|t| FieldRule::new(c.name.clone(), t))
            })
            .collect()
    }

    fn rule_for(
        &self,
        column: &ColumnInfo,
        algorithm: Algorithm,
        params: &AlgorithmParams,
    ) -> Option<Transform> {
        let family = TypeFamily::of(&column.declared_type);
        let pseudonymize = algorithm == Algorithm::Pseudonymization;
        let generalize = |kind| Transform::Generalize { kind };

        match self.semantic_for(&column.name) {
            Some(FieldSemantic::NationalId) if pseudonymize => return Some(Transform::Hash),
            Some(FieldSemantic::NationalId) => {
                return Some(generalize(GeneralizationKind::NationalId))
            }
            Some(FieldSemantic::Name) => return Some(Transform::Hash),
            Some(FieldSemantic::Phone | FieldSemantic::Email) if pseudonymize => {
                return Some(Transform::Hash)
            }
            Some(FieldSemantic::Phone) => return Some(generalize(GeneralizationKind::Phone)),
            Some(FieldSemantic::Email) => return Some(generalize(GeneralizationKind::Email)),
            Some(FieldSemantic::Address) => return Some(generalize(GeneralizationKind::Address)),
            Some(FieldSemantic::BirthDate) => {
                return Some(generalize(GeneralizationKind::BirthDate))
            }
            Some(FieldSemantic::MedicalCondition) => {
                return Some(generalize(GeneralizationKind::MedicalCode))
            }
            Some(FieldSemantic::Age) if family == TypeFamily::Text => {
                return Some(Transform::Range {
                    range_size: AGE_RANGE_SIZE,
                })
            }
            Some(FieldSemantic::Suppress) => return Some(Transform::Suppress),
            Some(FieldSemantic::Retain | FieldSemantic::Ignore) => return None,
            // Numeric age columns fall through to the type default
            Some(FieldSemantic::Age) | None => {}
        }

        if let Some(mapping) = self.categorical_mappings.get(&column.name.to_lowercase()) {
            return Some(Transform::Categorical {
                mapping: mapping.clone(),
            });
        }

        match family {
            TypeFamily::Temporal => Some(Transform::DateShift {
                max_shift_days: params
                    .max_date_shift_days
                    .unwrap_or(self.default_max_date_shift_days),
            }),
            TypeFamily::Numeric if algorithm == Algorithm::DifferentialPrivacy => {
                let epsilon = params.epsilon.filter(|e| *e > 0.0).unwrap_or(1.0);
                Some(Transform::Noise {
                    variance: 2.0 / (epsilon * epsilon),
                })
            }
            TypeFamily::Text => Some(Transform::Suppress),
            _ => None,
        }
    }

    /// Quasi-identifiers used when a job does not name any
    ///
    /// Fields generalized by year or region, range-bucketed fields, and
    /// retained columns such as gender.
    pub fn default_quasi_identifiers(
        &self,
        columns: &[ColumnInfo],
        rules: &[FieldRule],
    ) -> Vec<String> {
        columns
            .iter()
            .filter(|c| {
                let rule_is_qi = rules.iter().any(|r| {
                    r.field_name == c.name
                        && matches!(
                            r.transform,
                            Transform::Generalize {
                                kind: GeneralizationKind::BirthDate | GeneralizationKind::Address
                            } | Transform::Range { .. }
                        )
                });
                rule_is_qi || self.semantic_for(&c.name) == Some(FieldSemantic::Retain)
            })
            .map(|c| c.name.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patients() -> Vec<ColumnInfo> {
        vec![
            ColumnInfo::new("id", "integer"),
            ColumnInfo::new("full_name", "text"),
            ColumnInfo::new("national_id", "character varying(18)"),
            ColumnInfo::new("phone", "text"),
            ColumnInfo::new("birth_date", "date"),
            ColumnInfo::new("address", "text"),
            ColumnInfo::new("gender", "text"),
            ColumnInfo::new("weight_kg", "numeric"),
            ColumnInfo::new("last_visit", "timestamp with time zone"),
            ColumnInfo::new("notes", "text"),
            ColumnInfo::new("is_active", "boolean"),
            ColumnInfo::new("created_at", "timestamp with time zone"),
        ]
    }

    fn generator() -> RuleGenerator {
        RuleGenerator::from_config(&AnonymizationConfig::default())
    }

    fn rule<'a>(rules: &'a [FieldRule], field: &str) -> Option<&'a Transform> {
        rules
            .iter()
            .find(|r| r.field_name == field)
            .map(|r| &r.transform)
    }

    #[test]
    fn test_name_semantics_and_type_defaults() {
        let rules = generator().generate(
            &patients(),
            Algorithm::KAnonymity,
            &AlgorithmParams::default(),
        );

        assert!(rule(&rules, "id").is_none());
        assert!(rule(&rules, "created_at").is_none());
        assert!(rule(&rules, "gender").is_none());
        assert!(rule(&rules, "is_active").is_none());
        assert!(rule(&rules, "weight_kg").is_none());
        assert_eq!(rule(&rules, "full_name"), Some(&Transform::Hash));
        assert_eq!(
            rule(&rules, "national_id"),
            Some(&Transform::Generalize {
                kind: GeneralizationKind::NationalId
            })
        );
        assert_eq!(
            rule(&rules, "birth_date"),
            Some(&Transform::Generalize {
                kind: GeneralizationKind::BirthDate
            })
        );
        assert_eq!(
            rule(&rules, "last_visit"),
            Some(&Transform::DateShift { max_shift_days: 30 })
        );
        assert_eq!(rule(&rules, "notes"), Some(&Transform::Suppress));
    }

    #[test]
    fn test_generation_is_deterministic() {
        let params = AlgorithmParams::default();
        let a = generator().generate(&patients(), Algorithm::KAnonymity, &params);
        let b = generator().generate(&patients(), Algorithm::KAnonymity, &params);
        assert_eq!(a, b);
    }

    #[test]
    fn test_pseudonymization_hashes_identifiers() {
        let rules = generator().generate(
            &patients(),
            Algorithm::Pseudonymization,
            &AlgorithmParams::default(),
        );
        assert_eq!(rule(&rules, "national_id"), Some(&Transform::Hash));
        assert_eq!(rule(&rules, "phone"), Some(&Transform::Hash));
    }

    #[test]
    fn test_differential_privacy_noise_variance() {
        let params = AlgorithmParams {
            epsilon: Some(0.5),
            max_date_shift_days: Some(7),
            ..Default::default()
        };
        let rules = generator().generate(&patients(), Algorithm::DifferentialPrivacy, &params);
        assert_eq!(
            rule(&rules, "weight_kg"),
            Some(&Transform::Noise { variance: 8.0 })
        );
        assert_eq!(
            rule(&rules, "last_visit"),
            Some(&Transform::DateShift { max_shift_days: 7 })
        );
    }

    #[test]
    fn test_config_overrides() {
        let mut config = AnonymizationConfig::default();
        config
            .field_semantics
            .insert("notes".to_string(), FieldSemantic::Ignore);
        let mut mapping = BTreeMap::new();
        mapping.insert("F".to_string(), "female".to_string());
        config
            .categorical_mappings
            .insert("is_active".to_string(), mapping);

        let rules = RuleGenerator::from_config(&config).generate(
            &patients(),
            Algorithm::KAnonymity,
            &AlgorithmParams::default(),
        );
        assert!(rule(&rules, "notes").is_none());
        assert!(matches!(
            rule(&rules, "is_active"),
            Some(Transform::Categorical { .. })
        ));
    }

    #[test]
    fn test_age_range_only_for_text_columns() {
        let columns = vec![
            ColumnInfo::new("age", "text"),
            ColumnInfo::new("id", "integer"),
        ];
        let rules =
            generator().generate(&columns, Algorithm::KAnonymity, &AlgorithmParams::default());
        assert_eq!(
            rule(&rules, "age"),
            Some(&Transform::Range { range_size: 10 })
        );

        let columns = vec![ColumnInfo::new("age", "integer")];
        let rules =
            generator().generate(&columns, Algorithm::KAnonymity, &AlgorithmParams::default());
        assert!(rules.is_empty());
    }

    #[test]
    fn test_default_quasi_identifiers() {
        let g = generator();
        let columns = patients();
        let rules = g.generate(&columns, Algorithm::KAnonymity, &AlgorithmParams::default());
        assert_eq!(
            g.default_quasi_identifiers(&columns, &rules),
            vec!["birth_date", "address", "gender"]
        );
    }

    #[test]
    fn test_type_family() {
        assert_eq!(TypeFamily::of("timestamp without time zone"), TypeFamily::Temporal);
        assert_eq!(TypeFamily::of("numeric(5,2)"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("double precision"), TypeFamily::Numeric);
        assert_eq!(TypeFamily::of("character varying"), TypeFamily::Text);
        assert_eq!(TypeFamily::of("jsonb"), TypeFamily::Other);
    }
}
