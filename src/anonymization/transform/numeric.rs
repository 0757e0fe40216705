//! Gaussian noise and range bucketing

use crate::anonymization::random::RandomSource;
use std::f64::consts::PI;

/// Standard normal draw via Box–Muller
///
/// `u1` is kept away from zero so `ln(u1)` stays finite.
pub fn standard_normal(rng: &mut dyn RandomSource) -> f64 {
    let u1 = rng.next_unit().max(f64::MIN_POSITIVE);
    let u2 = rng.next_unit();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Add zero-mean noise with the given variance, rounded to `decimals` places
pub fn add_noise(value: f64, variance: f64, decimals: u32, rng: &mut dyn RandomSource) -> f64 {
    let noisy = value + standard_normal(rng) * variance.max(0.0).sqrt();
    round_to(noisy, decimals)
}

pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals.min(15) as i32);
    (value * factor).round() / factor
}

/// Number of fractional digits in a decimal rendering (`"12.50"` → 2)
pub fn decimal_places(rendered: &str) -> u32 {
    let mantissa = rendered.split(['e', 'E']).next().unwrap_or(rendered);
    mantissa
        .split_once('.')
        .map(|(_, frac)| frac.len() as u32)
        .unwrap_or(0)
}

/// `"start-end"` bucket containing the value
///
/// Returns `None` for a zero bucket size or a non-finite value.
pub fn range_bucket(value: f64, range_size: u64) -> Option<String> {
    if range_size == 0 || !value.is_finite() {
        return None;
    }
    let size = range_size as f64;
    let start = (value / size).floor() * size;
    let end = start + size - 1.0;
    Some(format!("{}-{}", start as i64, end as i64))
}

/// Parse a `"start-end"` bucket (negative starts included)
pub fn parse_bucket(bucket: &str) -> Option<(i64, i64)> {
    let split = bucket.char_indices().skip(1).find(|(_, c)| *c == '-')?.0;
    let start = bucket[..split].trim().parse().ok()?;
    let end = bucket[split + 1..].trim().parse().ok()?;
    Some((start, end))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anonymization::random::{SequenceSource, StdRandomSource};
    use test_case::test_case;

    #[test_case(47.0, 10, "40-49" ; "inside a decade")]
    #[test_case(40.0, 10, "40-49" ; "on the boundary")]
    #[test_case(0.0, 5, "0-4" ; "zero")]
    #[test_case(-3.0, 10, "-10--1" ; "negative value")]
    #[test_case(47.9, 10, "40-49" ; "fractional value")]
    fn test_range_bucket(value: f64, size: u64, expected: &str) {
        assert_eq!(range_bucket(value, size).unwrap(), expected);
    }

    #[test]
    fn test_range_bucket_rejects_zero_size() {
        assert!(range_bucket(47.0, 0).is_none());
    }

    #[test]
    fn test_parse_bucket() {
        assert_eq!(parse_bucket("40-49"), Some((40, 49)));
        assert_eq!(parse_bucket("-10--1"), Some((-10, -1)));
        assert_eq!(parse_bucket("forty"), None);
    }

    #[test]
    fn test_box_muller_known_draw() {
        // u1 = e^-0.5 gives sqrt(1) = 1; u2 = 0 gives cos(0) = 1
        let mut rng = SequenceSource::new(vec![(-0.5f64).exp(), 0.0]);
        let z = standard_normal(&mut rng);
        assert!((z - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_noise_scaled_by_variance_and_rounded() {
        let mut rng = SequenceSource::new(vec![(-0.5f64).exp(), 0.0]);
        // z = 1, sqrt(4) = 2
        assert_eq!(add_noise(120.0, 4.0, 0, &mut rng), 122.0);
    }

    #[test]
    fn test_noise_is_roughly_zero_mean() {
        let mut rng = StdRandomSource::seeded(42);
        let n = 20_000;
        let mean: f64 = (0..n).map(|_| standard_normal(&mut rng)).sum::<f64>() / n as f64;
        assert!(mean.abs() < 0.05, "mean was {mean}");
    }

    #[test]
    fn test_decimal_places() {
        assert_eq!(decimal_places("12"), 0);
        assert_eq!(decimal_places("12.50"), 2);
        assert_eq!(decimal_places("1.5e3"), 1);
    }
}
