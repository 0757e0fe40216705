//! Date parsing, shifting and year truncation
//!
//! Values keep their textual shape: a plain date stays a plain date, a
//! local timestamp keeps its separator, and a zoned timestamp keeps RFC 3339.

use chrono::{DateTime, Datelike, Duration, FixedOffset, NaiveDate, NaiveDateTime};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Temporal {
    Date(NaiveDate),
    Local { value: NaiveDateTime, t_separator: bool },
    Zoned(DateTime<FixedOffset>),
}

impl Temporal {
    fn parse(raw: &str) -> Option<Self> {
        let raw = raw.trim();
        if let Ok(d) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
            return Some(Self::Date(d));
        }
        if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
            return Some(Self::Zoned(dt));
        }
        if let Ok(dt) = DateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f%#z") {
            return Some(Self::Zoned(dt));
        }
        if let Ok(value) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
            return Some(Self::Local {
                value,
                t_separator: true,
            });
        }
        NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
            .ok()
            .map(|value| Self::Local {
                value,
                t_separator: false,
            })
    }

    fn date(&self) -> NaiveDate {
        match self {
            Self::Date(d) => *d,
            Self::Local { value, .. } => value.date(),
            Self::Zoned(dt) => dt.date_naive(),
        }
    }

    fn shifted(self, days: i64) -> Option<Self> {
        let delta = Duration::try_days(days)?;
        Some(match self {
            Self::Date(d) => Self::Date(d.checked_add_signed(delta)?),
            Self::Local { value, t_separator } => Self::Local {
                value: value.checked_add_signed(delta)?,
                t_separator,
            },
            Self::Zoned(dt) => Self::Zoned(dt.checked_add_signed(delta)?),
        })
    }

    fn render(&self) -> String {
        match self {
            Self::Date(d) => d.format("%Y-%m-%d").to_string(),
            Self::Local {
                value,
                t_separator: true,
            } => value.format("%Y-%m-%dT%H:%M:%S%.f").to_string(),
            Self::Local { value, .. } => value.format("%Y-%m-%d %H:%M:%S%.f").to_string(),
            Self::Zoned(dt) => dt.to_rfc3339(),
        }
    }
}

/// Calendar date of a date or timestamp string
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    Temporal::parse(raw).map(|t| t.date())
}

/// Shift a date or timestamp by whole days, keeping its format
pub fn shift_by_days(raw: &str, days: i64) -> Option<String> {
    Temporal::parse(raw)?.shifted(days).map(|t| t.render())
}

/// January 1 of the value's year, as `YYYY-01-01`
pub fn truncate_to_year(raw: &str) -> Option<String> {
    parse_date(raw).map(|d| format!("{:04}-01-01", d.year()))
}

/// Whole days between two date-like strings (`b - a`)
pub fn days_between(a: &str, b: &str) -> Option<i64> {
    Some((parse_date(b)? - parse_date(a)?).num_days())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_preserves_format() {
        assert_eq!(shift_by_days("2020-03-01", -1).unwrap(), "2020-02-29");
        assert_eq!(
            shift_by_days("2020-03-01T08:30:00", 2).unwrap(),
            "2020-03-03T08:30:00"
        );
        assert_eq!(
            shift_by_days("2020-03-01 08:30:00", 2).unwrap(),
            "2020-03-03 08:30:00"
        );
        assert_eq!(
            shift_by_days("2020-03-01T08:30:00+08:00", 1).unwrap(),
            "2020-03-02T08:30:00+08:00"
        );
    }

    #[test]
    fn test_truncate_to_year() {
        assert_eq!(truncate_to_year("1987-06-15").unwrap(), "1987-01-01");
        assert_eq!(truncate_to_year("1987-06-15T10:00:00Z").unwrap(), "1987-01-01");
        assert!(truncate_to_year("15/06/1987").is_none());
    }

    #[test]
    fn test_days_between() {
        assert_eq!(days_between("2020-01-01", "2020-01-31"), Some(30));
        assert_eq!(days_between("2020-01-31", "2020-01-01"), Some(-30));
        assert_eq!(days_between("bad", "2020-01-01"), None);
    }
}
