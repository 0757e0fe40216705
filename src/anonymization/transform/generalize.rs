//! Field-specific generalizations

use crate::config::{NationalIdLayout, RegionConfig};
use std::collections::BTreeMap;

/// Fixed placeholder for removed identifier segments
pub const MASK: &str = "********";

/// Fallback bucket for free-text conditions with no known keyword
pub const OTHER_CONDITION: &str = "Other condition";

fn is_prc18(id: &[char]) -> bool {
    id.len() == 18
        && id[..17].iter().all(char::is_ascii_digit)
        && (id[17].is_ascii_digit() || id[17] == 'X' || id[17] == 'x')
}

fn is_prc15(id: &[char]) -> bool {
    id.len() == 15 && id.iter().all(char::is_ascii_digit)
}

fn is_mykad(id: &[char]) -> bool {
    id.len() == 12 && id.iter().all(char::is_ascii_digit)
}

fn segment(id: &[char], range: std::ops::Range<usize>) -> String {
    id[range].iter().collect()
}

/// Keep only the region code and birth year of a national ID
///
/// Separators and whitespace are ignored. Values that do not match the
/// layout keep their first two characters.
pub fn national_id(raw: &str, layout: NationalIdLayout) -> String {
    let id: Vec<char> = raw.chars().filter(char::is_ascii_alphanumeric).collect();

    let layout = match layout {
        NationalIdLayout::Auto if is_prc18(&id) => NationalIdLayout::Prc18,
        NationalIdLayout::Auto if is_prc15(&id) => NationalIdLayout::Prc15,
        NationalIdLayout::Auto if is_mykad(&id) => NationalIdLayout::Mykad,
        other => other,
    };

    match layout {
        NationalIdLayout::Prc18 if is_prc18(&id) => {
            format!("{}{}{MASK}", segment(&id, 0..6), segment(&id, 6..10))
        }
        NationalIdLayout::Prc15 if is_prc15(&id) => {
            format!("{}{}{MASK}", segment(&id, 0..6), segment(&id, 6..8))
        }
        // YYMMDD-PB-###G: year first, birthplace code after the date
        NationalIdLayout::Mykad if is_mykad(&id) => {
            format!("{}****-{}-****", segment(&id, 0..2), segment(&id, 6..8))
        }
        _ => format!("{}{MASK}", segment(&id, 0..id.len().min(2))),
    }
}

/// Map an address to the first known region it mentions, else the country
pub fn address(raw: &str, regions: &RegionConfig) -> String {
    let lower = raw.to_lowercase();
    regions
        .names
        .iter()
        .find(|name| !name.is_empty() && lower.contains(&name.to_lowercase()))
        .cloned()
        .unwrap_or_else(|| regions.country.clone())
}

/// Keep the three leading digits and mask the rest
///
/// Returns `None` when the value holds no digits.
pub fn phone(raw: &str) -> Option<String> {
    let digits: Vec<char> = raw.chars().filter(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        return None;
    }
    let keep = digits.len().min(3);
    let mut out: String = digits[..keep].iter().collect();
    out.extend(std::iter::repeat('*').take(digits.len() - keep));
    Some(out)
}

/// Keep only the mail domain
pub fn email(raw: &str) -> Option<String> {
    let (local, domain) = raw.trim().rsplit_once('@')?;
    if local.is_empty() || domain.is_empty() {
        return None;
    }
    Some(format!("***@{}", domain.to_lowercase()))
}

/// Whether the value looks like an ICD-style code (`E11`, `E11.9`, `j45.909`)
fn is_diagnosis_code(raw: &str) -> bool {
    let chars: Vec<char> = raw.chars().collect();
    chars.len() >= 3
        && chars[0].is_ascii_alphabetic()
        && chars[1].is_ascii_digit()
        && chars[2].is_ascii_alphanumeric()
        && (chars.len() == 3
            || (chars[3] == '.' && chars[4..].iter().all(|c| c.is_ascii_alphanumeric())))
}

/// Truncate a diagnosis code to its 3-character category plus `*`
///
/// Free text is bucketed by the first matching keyword in `categories`
/// (keyword → category), else [`OTHER_CONDITION`].
pub fn medical_code(raw: &str, categories: &BTreeMap<String, String>) -> String {
    let trimmed = raw.trim();
    if is_diagnosis_code(trimmed) {
        let category: String = trimmed.chars().take(3).collect();
        return format!("{}*", category.to_uppercase());
    }
    let lower = trimmed.to_lowercase();
    categories
        .iter()
        .find(|(keyword, _)| lower.contains(keyword.as_str()))
        .map(|(_, category)| category.clone())
        .unwrap_or_else(|| OTHER_CONDITION.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn regions() -> RegionConfig {
        RegionConfig {
            country: "China".to_string(),
            names: vec!["Beijing".to_string(), "Hubei".to_string()],
        }
    }

    #[test]
    fn test_national_id_prc18() {
        assert_eq!(
            national_id("420106198703152817", NationalIdLayout::Auto),
            "4201061987********"
        );
        assert_eq!(
            national_id("4201 0619 8703 1528 1X", NationalIdLayout::Prc18),
            "4201061987********"
        );
    }

    #[test]
    fn test_national_id_prc15_drops_month() {
        assert_eq!(
            national_id("420106870315281", NationalIdLayout::Auto),
            "42010687********"
        );
        assert_eq!(
            national_id("420106870315281", NationalIdLayout::Prc15),
            "42010687********"
        );
    }

    #[test]
    fn test_national_id_mykad_drops_birth_date() {
        assert_eq!(
            national_id("870315-14-5678", NationalIdLayout::Auto),
            "87****-14-****"
        );
        assert_eq!(
            national_id("870315145678", NationalIdLayout::Mykad),
            "87****-14-****"
        );
    }

    #[test]
    fn test_national_id_unrecognized_keeps_prefix_only() {
        assert_eq!(national_id("A123", NationalIdLayout::Auto), "A1********");
        assert_eq!(
            national_id("G12345678Q", NationalIdLayout::Auto),
            "G1********"
        );
        // Layout mismatch falls back to the prefix
        assert_eq!(
            national_id("870315-14-5678", NationalIdLayout::Prc18),
            "87********"
        );
        assert_eq!(national_id("", NationalIdLayout::Auto), MASK);
    }

    #[test]
    fn test_address_region_match() {
        assert_eq!(address("12 Zhongshan Rd, Wuhan, HUBEI", &regions()), "Hubei");
        assert_eq!(address("221B Baker Street", &regions()), "China");
    }

    #[test]
    fn test_phone_keeps_area_code() {
        assert_eq!(phone("138-1234-5678").unwrap(), "138********");
        assert_eq!(phone("12").unwrap(), "12");
        assert!(phone("n/a").is_none());
    }

    #[test]
    fn test_email_keeps_domain() {
        assert_eq!(email("li.wei@Clinic.example").unwrap(), "***@clinic.example");
        assert!(email("no-at-sign").is_none());
        assert!(email("@example.com").is_none());
    }

    #[test]
    fn test_medical_code() {
        let mut categories = BTreeMap::new();
        categories.insert("diabetes".to_string(), "Metabolic disorder".to_string());

        assert_eq!(medical_code("E11.9", &categories), "E11*");
        assert_eq!(medical_code("j45", &categories), "J45*");
        assert_eq!(
            medical_code("Type 2 diabetes, poorly controlled", &categories),
            "Metabolic disorder"
        );
        assert_eq!(medical_code("sprained ankle", &categories), OTHER_CONDITION);
    }
}
