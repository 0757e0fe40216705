//! Injected randomness for noise and date shifting
//!
//! Transforms never reach for a global RNG; they draw from a
//! [`RandomSource`] handed to the transformer, so tests can pin the draws.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of uniform random draws
pub trait RandomSource: Send {
    /// Uniform draw in `[0, 1)`
    fn next_unit(&mut self) -> f64;

    /// Uniform integer in `[low, high]` (inclusive)
    fn next_in_range(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        let span = (high - low + 1) as f64;
        let offset = (self.next_unit() * span).floor() as i64;
        low + offset.min(high - low)
    }
}

/// `StdRng`-backed source, seeded or from entropy
pub struct StdRandomSource {
    rng: StdRng,
}

impl StdRandomSource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Seeded when a seed is configured, entropy otherwise
    pub fn from_seed_option(seed: Option<u64>) -> Self {
        seed.map_or_else(Self::from_entropy, Self::seeded)
    }
}

impl RandomSource for StdRandomSource {
    fn next_unit(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    fn next_in_range(&mut self, low: i64, high: i64) -> i64 {
        if high <= low {
            return low;
        }
        self.rng.gen_range(low..=high)
    }
}

/// Replays a fixed sequence of unit draws, cycling when exhausted
#[derive(Debug, Clone)]
pub struct SequenceSource {
    values: Vec<f64>,
    position: usize,
}

impl SequenceSource {
    pub fn new(values: Vec<f64>) -> Self {
        Self {
            values,
            position: 0,
        }
    }
}

impl RandomSource for SequenceSource {
    fn next_unit(&mut self) -> f64 {
        if self.values.is_empty() {
            return 0.5;
        }
        let value = self.values[self.position % self.values.len()];
        self.position += 1;
        value.clamp(0.0, 1.0 - f64::EPSILON)
    }
}
