//! Record filter predicates
//!
//! A [`FilterPredicate`] is a conjunction of simple `field op value`
//! conditions. It is evaluated in memory against JSON records and translated
//! to parameterized SQL by the PostgreSQL adapter.

use crate::domain::ids::is_valid_identifier;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

/// Comparison operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Comparison {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
    IsNull,
    IsNotNull,
}

impl Comparison {
    /// SQL spelling of the operator
    pub fn sql(&self) -> &'static str {
        match self {
            Self::Eq => "=",
            Self::Ne => "<>",
            Self::Lt => "<",
            Self::Lte => "<=",
            Self::Gt => ">",
            Self::Gte => ">=",
            Self::IsNull => "IS NULL",
            Self::IsNotNull => "IS NOT NULL",
        }
    }

    /// Whether the operator takes a right-hand value
    pub fn takes_value(&self) -> bool {
        !matches!(self, Self::IsNull | Self::IsNotNull)
    }
}

/// One `field op value` clause
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub field: String,
    pub op: Comparison,
    #[serde(default)]
    pub value: Value,
}

impl Condition {
    pub fn new(field: impl Into<String>, op: Comparison, value: Value) -> Self {
        Self {
            field: field.into(),
            op,
            value,
        }
    }

    /// Evaluate the condition against a record
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        let actual = record.get(&self.field).unwrap_or(&Value::Null);
        match self.op {
            Comparison::IsNull => actual.is_null(),
            Comparison::IsNotNull => !actual.is_null(),
            _ if actual.is_null() => false,
            op => compare_values(actual, &self.value).map_or(false, |ord| match op {
                Comparison::Eq => ord == Ordering::Equal,
                Comparison::Ne => ord != Ordering::Equal,
                Comparison::Lt => ord == Ordering::Less,
                Comparison::Lte => ord != Ordering::Greater,
                Comparison::Gt => ord == Ordering::Greater,
                Comparison::Gte => ord != Ordering::Less,
                Comparison::IsNull | Comparison::IsNotNull => false,
            }),
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.op.takes_value() {
            match &self.value {
                Value::String(s) => write!(f, "{} {} '{}'", self.field, self.op.sql(), s),
                other => write!(f, "{} {} {}", self.field, self.op.sql(), other),
            }
        } else {
            write!(f, "{} {}", self.field, self.op.sql())
        }
    }
}

/// Conjunction of conditions; the empty predicate matches every record
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterPredicate {
    pub conditions: Vec<Condition>,
}

impl FilterPredicate {
    /// Predicate matching all records
    pub fn all() -> Self {
        Self::default()
    }

    /// Add a condition
    pub fn and(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Evaluate against a record
    pub fn matches(&self, record: &Map<String, Value>) -> bool {
        self.conditions.iter().all(|c| c.matches(record))
    }

    /// Parse `field op value [AND field op value ...]`
    ///
    /// Values may be single-quoted strings, numbers, `true`/`false`, or bare
    /// words (taken as strings).
    ///
    /// # Examples
    ///
    /// ```
    /// use warden::domain::filter::FilterPredicate;
    ///
    /// let p = FilterPredicate::parse("created_at < 2015-01-01 AND status = 'archived'").unwrap();
    /// assert_eq!(p.conditions.len(), 2);
    /// ```
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut predicate = Self::default();
        if input.trim().is_empty() {
            return Ok(predicate);
        }
        for clause in split_conjunction(input)? {
            predicate.conditions.push(parse_condition(&clause)?);
        }
        Ok(predicate)
    }
}

impl FromStr for FilterPredicate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for FilterPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.conditions.is_empty() {
            return f.write_str("(all records)");
        }
        let parts: Vec<String> = self.conditions.iter().map(|c| c.to_string()).collect();
        f.write_str(&parts.join(" AND "))
    }
}

/// Split on top-level `AND` keywords, ignoring quoted text
fn split_conjunction(input: &str) -> Result<Vec<String>, String> {
    let mut clauses = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if c == '\'' {
            in_quotes = !in_quotes;
            current.push(c);
            i += 1;
            continue;
        }
        if !in_quotes && c.is_whitespace() && i + 4 < chars.len() {
            let word: String = chars[i + 1..i + 4].iter().collect();
            if word.eq_ignore_ascii_case("and") && chars[i + 4].is_whitespace() {
                clauses.push(current.trim().to_string());
                current.clear();
                i += 5;
                continue;
            }
        }
        current.push(c);
        i += 1;
    }

    if in_quotes {
        return Err(format!("Unterminated quote in filter: {input}"));
    }
    clauses.push(current.trim().to_string());

    if clauses.iter().any(|c| c.is_empty()) {
        return Err(format!("Empty clause in filter: {input}"));
    }
    Ok(clauses)
}

fn parse_condition(clause: &str) -> Result<Condition, String> {
    let field_end = clause
        .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .unwrap_or(clause.len());
    let field = &clause[..field_end];
    if !is_valid_identifier(field) {
        return Err(format!("Invalid field name in filter clause: '{clause}'"));
    }
    let rest = clause[field_end..].trim_start();
    let upper = rest.to_uppercase();

    if upper == "IS NULL" {
        return Ok(Condition::new(field, Comparison::IsNull, Value::Null));
    }
    if upper == "IS NOT NULL" {
        return Ok(Condition::new(field, Comparison::IsNotNull, Value::Null));
    }

    let operators = [
        ("<=", Comparison::Lte),
        (">=", Comparison::Gte),
        ("!=", Comparison::Ne),
        ("<>", Comparison::Ne),
        ("=", Comparison::Eq),
        ("<", Comparison::Lt),
        (">", Comparison::Gt),
    ];
    for (token, op) in operators {
        if let Some(value) = rest.strip_prefix(token) {
            return Ok(Condition::new(field, op, parse_literal(value.trim())?));
        }
    }
    Err(format!("Missing comparison operator in filter clause: '{clause}'"))
}

fn parse_literal(raw: &str) -> Result<Value, String> {
    if raw.is_empty() {
        return Err("Missing value in filter clause".to_string());
    }
    if let Some(inner) = raw.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')) {
        return Ok(Value::String(inner.to_string()));
    }
    match raw.to_lowercase().as_str() {
        "true" => return Ok(Value::Bool(true)),
        "false" => return Ok(Value::Bool(false)),
        _ => {}
    }
    if let Ok(i) = raw.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(f) = raw.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Ok(Value::Number(n));
        }
    }
    Ok(Value::String(raw.to_string()))
}

/// Parse a JSON value as a point in time (RFC 3339 or plain date)
pub fn value_as_datetime(value: &Value) -> Option<DateTime<Utc>> {
    let s = value.as_str()?;
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = chrono::NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Some(dt.and_utc());
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}

fn value_as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Loose ordering between JSON values: numeric, then temporal, then textual
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    if let (Value::Bool(x), Value::Bool(y)) = (a, b) {
        return Some(x.cmp(y));
    }
    if let (Some(x), Some(y)) = (value_as_f64(a), value_as_f64(b)) {
        return x.partial_cmp(&y);
    }
    if let (Some(x), Some(y)) = (value_as_datetime(a), value_as_datetime(b)) {
        return Some(x.cmp(&y));
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}
