//! Field Transform Library
//!
//! Each primitive maps one field value to its anonymized form. The
//! [`FieldTransformer`] owns everything the primitives need (salt, region
//! table, condition keywords, random source), all injected at construction.
//!
//! # Example
//!
//! ```rust
//! use warden::anonymization::transform::FieldTransformer;
//! use warden::anonymization::random::StdRandomSource;
//! use warden::config::AnonymizationConfig;
//! use warden::domain::Transform;
//! use serde_json::json;
//!
//! let config = AnonymizationConfig::default();
//! let mut transformer = FieldTransformer::from_config(&config)
//!     .with_random_source(Box::new(StdRandomSource::seeded(1)));
//!
//! let bucket = transformer
//!     .apply("age", &Transform::Range { range_size: 10 }, &json!(47))
//!     .unwrap();
//! assert_eq!(bucket, json!("40-49"));
//! ```

pub mod generalize;
pub mod hashing;
pub mod numeric;
pub mod temporal;

use crate::anonymization::random::{RandomSource, StdRandomSource};
use crate::config::{AnonymizationConfig, NationalIdLayout, RegionConfig, SecretString};
use crate::domain::rule::{FieldRule, GeneralizationKind, Transform};
use crate::domain::TransformError;
use secrecy::ExposeSecret;
use serde_json::{Map, Number, Value};
use std::collections::BTreeMap;

/// Fallback bucket for unmapped categorical values
pub const OTHER_CATEGORY: &str = "Other";

/// Applies field rules to record values
pub struct FieldTransformer {
    salt: SecretString,
    regions: RegionConfig,
    condition_categories: BTreeMap<String, String>,
    national_id_layout: NationalIdLayout,
    rng: Box<dyn RandomSource>,
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

impl FieldTransformer {
    pub fn new(
        salt: SecretString,
        regions: RegionConfig,
        condition_categories: BTreeMap<String, String>,
        rng: Box<dyn RandomSource>,
    ) -> Self {
        Self {
            salt,
            regions,
            condition_categories,
            national_id_layout: NationalIdLayout::Auto,
            rng,
        }
    }

    /// Build from configuration, seeding the RNG when `random_seed` is set
    pub fn from_config(config: &AnonymizationConfig) -> Self {
        Self::new(
            config.salt.clone(),
            config.regions.clone(),
            config.condition_categories.clone(),
            Box::new(StdRandomSource::from_seed_option(config.random_seed)),
        )
        .with_national_id_layout(config.national_id_layout)
    }

    pub fn with_national_id_layout(mut self, layout: NationalIdLayout) -> Self {
        self.national_id_layout = layout;
        self
    }

    /// Replace the random source
    pub fn with_random_source(mut self, rng: Box<dyn RandomSource>) -> Self {
        self.rng = rng;
        self
    }

    /// Transform one value
    ///
    /// `null` passes through untouched; suppression always yields `null`.
    ///
    /// # Errors
    ///
    /// Returns a [`TransformError`] when the value cannot be interpreted for
    /// the transform (malformed dates, non-numeric noise input, ...).
    pub fn apply(
        &mut self,
        field: &str,
        transform: &Transform,
        value: &Value,
    ) -> Result<Value, TransformError> {
        self.apply_with_offset(field, transform, value, None)
    }

    fn apply_with_offset(
        &mut self,
        field: &str,
        transform: &Transform,
        value: &Value,
        date_offset: Option<i64>,
    ) -> Result<Value, TransformError> {
        if matches!(transform, Transform::Suppress) || value.is_null() {
            return Ok(Value::Null);
        }

        match transform {
            Transform::Hash => self.hash(field, value),
            Transform::Generalize { kind } => self.generalize(field, *kind, value),
            Transform::Suppress => Ok(Value::Null),
            Transform::Noise { variance } => self.noise(field, *variance, value),
            Transform::DateShift { max_shift_days } => {
                let days = match date_offset {
                    Some(days) => days,
                    None => self.draw_offset(*max_shift_days),
                };
                self.date_shift(field, value, days)
            }
            Transform::Range { range_size } => Self::range(field, *range_size, value),
            Transform::Categorical { mapping } => Self::categorical(field, mapping, value),
        }
    }

    /// Apply every rule to a record, returning only the changed fields
    ///
    /// With `share_date_offset`, all date shifts of the record use one offset
    /// drawn from the narrowest configured window.
    pub fn apply_rules(
        &mut self,
        rules: &[FieldRule],
        record: &Map<String, Value>,
        share_date_offset: bool,
    ) -> Result<Map<String, Value>, TransformError> {
        let shared_offset = if share_date_offset {
            rules
                .iter()
                .filter_map(|r| match r.transform {
                    Transform::DateShift { max_shift_days } => Some(max_shift_days),
                    _ => None,
                })
                .min()
                .map(|window| self.draw_offset(window))
        } else {
            None
        };

        let mut changes = Map::new();
        for rule in rules {
            let Some(value) = record.get(&rule.field_name) else {
                continue;
            };
            let transformed =
                self.apply_with_offset(&rule.field_name, &rule.transform, value, shared_offset)?;
            changes.insert(rule.field_name.clone(), transformed);
        }
        Ok(changes)
    }

    fn draw_offset(&mut self, max_shift_days: u32) -> i64 {
        let window = i64::from(max_shift_days);
        self.rng.next_in_range(-window, window)
    }

    fn hash(&self, field: &str, value: &Value) -> Result<Value, TransformError> {
        let text = scalar_text(value).ok_or_else(|| TransformError::unsupported(field, "scalar"))?;
        Ok(Value::String(hashing::salted_hash(
            &text,
            field,
            self.salt.expose_secret().as_str(),
        )))
    }

    fn generalize(
        &self,
        field: &str,
        kind: GeneralizationKind,
        value: &Value,
    ) -> Result<Value, TransformError> {
        let text = scalar_text(value).ok_or_else(|| TransformError::unsupported(field, "text"))?;

        let generalized = match kind {
            GeneralizationKind::NationalId => {
                generalize::national_id(&text, self.national_id_layout)
            }
            GeneralizationKind::Address => generalize::address(&text, &self.regions),
            GeneralizationKind::Phone => generalize::phone(&text)
                .ok_or_else(|| TransformError::invalid(field, "phone number has no digits"))?,
            GeneralizationKind::Email => generalize::email(&text)
                .ok_or_else(|| TransformError::invalid(field, "not an email address"))?,
            GeneralizationKind::BirthDate => {
                temporal::truncate_to_year(&text).ok_or_else(|| {
                    TransformError::invalid(field, format!("unparseable date '{text}'"))
                })?
            }
            GeneralizationKind::MedicalCode => {
                generalize::medical_code(&text, &self.condition_categories)
            }
        };
        Ok(Value::String(generalized))
    }

    fn noise(
        &mut self,
        field: &str,
        variance: f64,
        value: &Value,
    ) -> Result<Value, TransformError> {
        match value {
            Value::Number(n) => {
                let original = n
                    .as_f64()
                    .ok_or_else(|| TransformError::unsupported(field, "finite number"))?;
                let integral = n.is_i64() || n.is_u64();
                let decimals = if integral {
                    0
                } else {
                    numeric::decimal_places(&n.to_string())
                };
                let noisy = numeric::add_noise(original, variance, decimals, self.rng.as_mut());
                if integral {
                    Ok(Value::from(noisy as i64))
                } else {
                    Number::from_f64(noisy).map(Value::Number).ok_or_else(|| {
                        TransformError::invalid(field, "noise produced a non-finite value")
                    })
                }
            }
            Value::String(s) => {
                let original: f64 = s
                    .trim()
                    .parse()
                    .map_err(|_| TransformError::invalid(field, format!("not a number: '{s}'")))?;
                let decimals = numeric::decimal_places(s.trim());
                let noisy = numeric::add_noise(original, variance, decimals, self.rng.as_mut());
                Ok(Value::String(format!("{noisy:.prec$}", prec = decimals as usize)))
            }
            _ => Err(TransformError::unsupported(field, "number")),
        }
    }

    fn date_shift(&self, field: &str, value: &Value, days: i64) -> Result<Value, TransformError> {
        let text = value
            .as_str()
            .ok_or_else(|| TransformError::unsupported(field, "date string"))?;
        temporal::shift_by_days(text, days)
            .map(Value::String)
            .ok_or_else(|| TransformError::invalid(field, format!("unparseable date '{text}'")))
    }

    fn range(field: &str, range_size: u64, value: &Value) -> Result<Value, TransformError> {
        let number = match value {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
        .ok_or_else(|| TransformError::unsupported(field, "number"))?;

        numeric::range_bucket(number, range_size)
            .map(Value::String)
            .ok_or_else(|| TransformError::invalid(field, "range size must be > 0"))
    }

    fn categorical(
        field: &str,
        mapping: &BTreeMap<String, String>,
        value: &Value,
    ) -> Result<Value, TransformError> {
        let key = scalar_text(value).ok_or_else(|| TransformError::unsupported(field, "scalar"))?;
        Ok(Value::String(
            mapping
                .get(&key)
                .cloned()
                .unwrap_or_else(|| OTHER_CATEGORY.to_string()),
        ))
    }
}
