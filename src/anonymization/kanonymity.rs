//! k-anonymity enforcement
//!
//! After the field rules have run over a batch, every record's
//! quasi-identifier tuple must occur at least `k` times in that batch.
//! Records in smaller groups get further generalization passes: each pass
//! coarsens the least-specific quasi-identifier of every violating record
//! (the one already generalized furthest, first column on ties) by one
//! hierarchy level. The top level of every hierarchy is `null`, and a
//! record whose quasi-identifiers are all `null` is treated as suppressed, so
//! enforcement always terminates.

use crate::anonymization::transform::numeric;
use crate::config::RegionConfig;
use crate::domain::rule::{FieldRule, GeneralizationKind, Transform};
use serde_json::{Map, Value};
use std::cmp::Reverse;
use std::collections::HashMap;

/// Generalization hierarchy of one quasi-identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Hierarchy {
    /// Year → decade → null
    Year,
    /// Region → country → null
    Region,
    /// Bucket → bucket ten times wider → null
    Range,
    /// Area code → first digit → null
    Phone,
    /// Value → null
    Suppress,
}

impl Hierarchy {
    /// Hierarchy matching the rule that produced a field
    pub fn for_rule(rule: Option<&FieldRule>) -> Self {
        match rule.map(|r| &r.transform) {
            Some(Transform::Generalize {
                kind: GeneralizationKind::BirthDate,
            }) => Self::Year,
            Some(Transform::Generalize {
                kind: GeneralizationKind::Address,
            }) => Self::Region,
            Some(Transform::Generalize {
                kind: GeneralizationKind::Phone,
            }) => Self::Phone,
            Some(Transform::Range { .. }) => Self::Range,
            _ => Self::Suppress,
        }
    }

    /// Level at which values become `null`
    fn top(&self) -> u8 {
        match self {
            Self::Suppress => 1,
            _ => 2,
        }
    }
}

/// One quasi-identifier column with its hierarchy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuasiIdentifier {
    pub field: String,
    pub hierarchy: Hierarchy,
}

/// Outcome of one enforcement run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnforcementReport {
    /// Extra generalization passes performed
    pub passes: usize,
    /// Records that were coarsened at least once
    pub coarsened_records: usize,
    /// Records whose quasi-identifiers ended fully suppressed
    pub suppressed_records: usize,
}

/// Enforces k-anonymity over one batch of transformed records
#[derive(Debug, Clone)]
pub struct KAnonymityEnforcer {
    k: usize,
    quasi_identifiers: Vec<QuasiIdentifier>,
    regions: RegionConfig,
}

impl KAnonymityEnforcer {
    pub fn new(k: usize, quasi_identifiers: Vec<QuasiIdentifier>, regions: RegionConfig) -> Self {
        Self {
            k,
            quasi_identifiers,
            regions,
        }
    }

    /// Build from quasi-identifier names, taking hierarchies from the rules
    pub fn from_rules(
        k: usize,
        fields: &[String],
        rules: &[FieldRule],
        regions: RegionConfig,
    ) -> Self {
        let quasi_identifiers = fields
            .iter()
            .map(|field| QuasiIdentifier {
                field: field.clone(),
                hierarchy: Hierarchy::for_rule(rules.iter().find(|r| &r.field_name == field)),
            })
            .collect();
        Self::new(k, quasi_identifiers, regions)
    }

    pub fn quasi_identifiers(&self) -> &[QuasiIdentifier] {
        &self.quasi_identifiers
    }

    /// Coarsen records in place until every non-suppressed tuple occurs at least `k` times
    pub fn enforce(&self, records: &mut [Map<String, Value>]) -> EnforcementReport {
        let mut report = EnforcementReport::default();
        if self.quasi_identifiers.is_empty() || records.is_empty() {
            return report;
        }

        let mut levels: Vec<Vec<u8>> = records
            .iter()
            .map(|record| {
                self.quasi_identifiers
                    .iter()
                    .map(|qi| match record.get(&qi.field) {
                        None | Some(Value::Null) => qi.hierarchy.top(),
                        Some(_) => 0,
                    })
                    .collect()
            })
            .collect();
        let mut coarsened = vec![false; records.len()];

        loop {
            let violators = self.violators(records);
            if violators.is_empty() {
                break;
            }

            let mut progressed = false;
            for index in violators {
                let candidate = levels[index]
                    .iter()
                    .enumerate()
                    .filter(|(j, level)| **level < self.quasi_identifiers[*j].hierarchy.top())
                    .max_by_key(|(j, level)| (**level, Reverse(*j)))
                    .map(|(j, _)| j);
                let Some(j) = candidate else {
                    continue;
                };

                let qi = &self.quasi_identifiers[j];
                levels[index][j] += 1;
                let current = records[index].get(&qi.field).cloned().unwrap_or(Value::Null);
                let next = self.coarsen(qi.hierarchy, levels[index][j], &current);
                if next.is_null() {
                    levels[index][j] = qi.hierarchy.top();
                }
                records[index].insert(qi.field.clone(), next);
                coarsened[index] = true;
                progressed = true;
            }

            if !progressed {
                break;
            }
            report.passes += 1;
        }

        report.coarsened_records = coarsened.iter().filter(|c| **c).count();
        report.suppressed_records = records
            .iter()
            .zip(&coarsened)
            .filter(|(record, was_coarsened)| **was_coarsened && self.is_suppressed(record))
            .count();

        if report.passes > 0 {
            tracing::debug!(
                k = self.k,
                passes = report.passes,
                coarsened = report.coarsened_records,
                suppressed = report.suppressed_records,
                "Applied additional generalization for k-anonymity"
            );
        }
        report
    }

    /// Whether every non-suppressed tuple occurs at least `k` times
    pub fn is_satisfied(&self, records: &[Map<String, Value>]) -> bool {
        self.violators(records).is_empty()
    }

    fn tuple_key(&self, record: &Map<String, Value>) -> String {
        let tuple: Vec<&Value> = self
            .quasi_identifiers
            .iter()
            .map(|qi| record.get(&qi.field).unwrap_or(&Value::Null))
            .collect();
        serde_json::to_string(&tuple).unwrap_or_default()
    }

    fn is_suppressed(&self, record: &Map<String, Value>) -> bool {
        self.quasi_identifiers
            .iter()
            .all(|qi| record.get(&qi.field).map_or(true, Value::is_null))
    }

    fn violators(&self, records: &[Map<String, Value>]) -> Vec<usize> {
        let keys: Vec<String> = records.iter().map(|r| self.tuple_key(r)).collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for key in &keys {
            *counts.entry(key.as_str()).or_default() += 1;
        }
        records
            .iter()
            .enumerate()
            .filter(|(i, record)| counts[keys[*i].as_str()] < self.k && !self.is_suppressed(record))
            .map(|(i, _)| i)
            .collect()
    }

    /// Value one level up the hierarchy
    fn coarsen(&self, hierarchy: Hierarchy, level: u8, value: &Value) -> Value {
        if level >= hierarchy.top() {
            return Value::Null;
        }
        let text = match value {
            Value::String(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            _ => return Value::Null,
        };
        let coarser = match hierarchy {
            Hierarchy::Year => decade(&text),
            Hierarchy::Region => Some(self.regions.country.clone()),
            Hierarchy::Range => widen_bucket(&text),
            Hierarchy::Phone => leading_digit(&text),
            Hierarchy::Suppress => None,
        };
        coarser.map_or(Value::Null, Value::String)
    }
}

fn decade(text: &str) -> Option<String> {
    let year: i32 = text.get(..4)?.parse().ok()?;
    Some(format!("{:04}-01-01", year - year.rem_euclid(10)))
}

fn widen_bucket(text: &str) -> Option<String> {
    let (start, width) = match numeric::parse_bucket(text) {
        Some((start, end)) if end >= start => (start, (end - start + 1) as u64),
        Some(_) => return None,
        None => (text.trim().parse::<f64>().ok()? as i64, 1),
    };
    numeric::range_bucket(start as f64, width.saturating_mul(10))
}

fn leading_digit(text: &str) -> Option<String> {
    let mut chars = text.chars().filter(|c| c.is_ascii_digit() || *c == '*');
    let first = chars.next().filter(char::is_ascii_digit)?;
    let rest = chars.count();
    Some(std::iter::once(first).chain(std::iter::repeat('*').take(rest)).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn qi(field: &str, hierarchy: Hierarchy) -> QuasiIdentifier {
        QuasiIdentifier {
            field: field.to_string(),
            hierarchy,
        }
    }

    fn records(values: Vec<Value>) -> Vec<Map<String, Value>> {
        values
            .into_iter()
            .map(|v| v.as_object().cloned().unwrap())
            .collect()
    }

    fn regions() -> RegionConfig {
        RegionConfig {
            country: "China".to_string(),
            names: vec!["Hubei".to_string(), "Beijing".to_string()],
        }
    }

    #[test]
    fn test_satisfied_batch_is_untouched() {
        let enforcer =
            KAnonymityEnforcer::new(2, vec![qi("birth_date", Hierarchy::Year)], regions());
        let mut batch = records(vec![
            json!({"birth_date": "1987-01-01"}),
            json!({"birth_date": "1987-01-01"}),
        ]);
        let before = batch.clone();
        let report = enforcer.enforce(&mut batch);
        assert_eq!(report, EnforcementReport::default());
        assert_eq!(batch, before);
    }

    #[test]
    fn test_small_group_is_coarsened_until_suppressed() {
        let enforcer = KAnonymityEnforcer::new(
            5,
            vec![qi("birth_date", Hierarchy::Year), qi("address", Hierarchy::Region)],
            regions(),
        );
        let mut batch = records(vec![
            json!({"birth_date": "1987-01-01", "address": "Hubei"}),
            json!({"birth_date": "1987-01-01", "address": "Hubei"}),
            json!({"birth_date": "1987-01-01", "address": "Hubei"}),
        ]);
        let report = enforcer.enforce(&mut batch);
        assert!(report.passes > 0);
        assert_eq!(report.coarsened_records, 3);
        assert_eq!(report.suppressed_records, 3);
        assert!(enforcer.is_satisfied(&batch));
        for record in &batch {
            assert!(record["birth_date"].is_null());
            assert!(record["address"].is_null());
        }
    }

    #[test]
    fn test_coarsening_merges_groups() {
        let enforcer = KAnonymityEnforcer::new(
            3,
            vec![qi("birth_date", Hierarchy::Year), qi("gender", Hierarchy::Suppress)],
            regions(),
        );
        let mut batch = records(vec![
            json!({"birth_date": "1981-01-01", "gender": "F"}),
            json!({"birth_date": "1984-01-01", "gender": "F"}),
            json!({"birth_date": "1989-01-01", "gender": "F"}),
        ]);
        let report = enforcer.enforce(&mut batch);
        assert_eq!(report.passes, 1);
        for record in &batch {
            assert_eq!(record["birth_date"], json!("1980-01-01"));
            assert_eq!(record["gender"], json!("F"));
        }
        assert_eq!(report.suppressed_records, 0);
    }

    #[test]
    fn test_least_specific_identifier_is_coarsened_first() {
        let enforcer = KAnonymityEnforcer::new(
            2,
            vec![qi("birth_date", Hierarchy::Year), qi("address", Hierarchy::Region)],
            regions(),
        );
        let mut batch = records(vec![
            json!({"birth_date": "1987-01-01", "address": "Hubei"}),
            json!({"birth_date": "1981-01-01", "address": "Beijing"}),
        ]);
        let report = enforcer.enforce(&mut batch);

        // decade, then null, and only then the address moves up
        assert_eq!(report.passes, 3);
        for record in &batch {
            assert!(record["birth_date"].is_null());
            assert_eq!(record["address"], json!("China"));
        }
        assert_eq!(report.suppressed_records, 0);
    }

    #[test]
    fn test_large_groups_are_never_coarsened() {
        let enforcer = KAnonymityEnforcer::new(2, vec![qi("age", Hierarchy::Range)], regions());
        let mut batch = records(vec![
            json!({"age": "40-49"}),
            json!({"age": "40-49"}),
            json!({"age": "43-43"}),
            json!({"age": "20-29"}),
        ]);
        enforcer.enforce(&mut batch);
        assert_eq!(batch[0]["age"], json!("40-49"));
        assert_eq!(batch[1]["age"], json!("40-49"));
        assert!(enforcer.is_satisfied(&batch));
    }

    #[test]
    fn test_hierarchy_steps() {
        let enforcer = KAnonymityEnforcer::new(2, Vec::new(), regions());
        assert_eq!(
            enforcer.coarsen(Hierarchy::Range, 1, &json!("40-49")),
            json!("0-99")
        );
        assert_eq!(
            enforcer.coarsen(Hierarchy::Phone, 1, &json!("138********")),
            json!("1**********")
        );
        assert_eq!(
            enforcer.coarsen(Hierarchy::Region, 1, &json!("Hubei")),
            json!("China")
        );
        assert_eq!(
            enforcer.coarsen(Hierarchy::Year, 1, &json!("1987-01-01")),
            json!("1980-01-01")
        );
        assert_eq!(enforcer.coarsen(Hierarchy::Year, 2, &json!("1980-01-01")), Value::Null);
        assert_eq!(enforcer.coarsen(Hierarchy::Suppress, 1, &json!("F")), Value::Null);
    }

    #[test]
    fn test_hierarchy_from_rules() {
        let rules = vec![
            FieldRule::new(
                "birth_date",
                Transform::Generalize {
                    kind: GeneralizationKind::BirthDate,
                },
            ),
            FieldRule::new("age", Transform::Range { range_size: 10 }),
        ];
        let fields = vec![
            "birth_date".to_string(),
            "age".to_string(),
            "gender".to_string(),
        ];
        let enforcer = KAnonymityEnforcer::from_rules(5, &fields, &rules, regions());
        let hierarchies: Vec<Hierarchy> = enforcer
            .quasi_identifiers()
            .iter()
            .map(|q| q.hierarchy)
            .collect();
        assert_eq!(
            hierarchies,
            vec![Hierarchy::Year, Hierarchy::Range, Hierarchy::Suppress]
        );
    }
}
