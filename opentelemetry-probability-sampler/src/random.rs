use std::fmt;

use rand::rngs::SmallRng;
use rand::{Rng, RngCore};

/// A pseudo-random source for sampling decisions.
///
/// [`ProbabilityBased`] draws from a source twice per span at most: once
/// to generate a missing trace r-value and once to choose between the two
/// neighboring power-of-two probabilities. The source is a seam for
/// determinism; tests inject scripted implementations, while production
/// samplers use an OS-entropy-seeded [`SmallRng`].
///
/// Cryptographic quality is explicitly not required.
///
/// [`ProbabilityBased`]: crate::ProbabilityBased
pub trait RandomSource: fmt::Debug + Send {
    /// Returns a uniformly distributed non-negative 63-bit integer.
    fn int63(&mut self) -> i64;

    /// Returns a uniformly distributed value in `[0.0, 1.0)`.
    fn float64(&mut self) -> f64;
}

impl RandomSource for SmallRng {
    fn int63(&mut self) -> i64 {
        (self.next_u64() >> 1) as i64
    }

    fn float64(&mut self) -> f64 {
        self.random()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn int63_is_non_negative() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..1000 {
            assert!(rng.int63() >= 0);
        }
    }

    #[test]
    fn float64_is_unit_interval() {
        let mut rng = SmallRng::seed_from_u64(11);
        for _ in 0..1000 {
            let value = rng.float64();
            assert!((0.0..1.0).contains(&value));
        }
    }
}
