//! Quantization of sampling probabilities onto powers of two.
//!
//! Consistent sampling compares small integer log-adjusted counts against
//! the trace r-value, so an arbitrary fraction is realized as a random
//! choice between the two neighboring powers of two whose expectation
//! equals the fraction.

/// Largest valid p-value; also the "zero adjusted count" sentinel.
pub(crate) const MAX_P_VALUE: u8 = 63;

/// Largest valid r-value.
pub(crate) const MAX_R_VALUE: u8 = 62;

/// Smallest sampling probability that is attributable to a p-value,
/// i.e. 2^-62. Fractions below this sample nothing.
pub(crate) const MIN_SAMPLING_PROBABILITY: f64 = 1.0 / (1u64 << 62) as f64;

const F64_EXPONENT_SHIFT: u32 = 52;
const F64_EXPONENT_MASK: u64 = 0x7ff;
const F64_EXPONENT_BIAS: i32 = 1023;

/// Returns the unique exponent `e` with `2^e <= x < 2^(e+1)`.
///
/// Only meaningful for positive, finite, normal `x`.
pub(crate) fn exp_from_float64(x: f64) -> i32 {
    ((x.to_bits() >> F64_EXPONENT_SHIFT) & F64_EXPONENT_MASK) as i32 - F64_EXPONENT_BIAS
}

/// Returns `2^e`, clamping the biased exponent into the normal range.
pub(crate) fn exp_to_float64(e: i32) -> f64 {
    let biased = (e + F64_EXPONENT_BIAS).clamp(1, 2046) as u64;
    f64::from_bits(biased << F64_EXPONENT_SHIFT)
}

/// Splits a sampling fraction into `(low, high, low_prob)`.
///
/// `low` and `high` are log-adjusted counts with `2^-low <= fraction <=
/// 2^-high`; sampling at `low` with probability `low_prob` and at `high`
/// otherwise has expectation exactly `fraction`. Fractions below
/// [`MIN_SAMPLING_PROBABILITY`] (including zero and NaN) collapse to the
/// zero-probability sentinel `(63, 63, 1.0)`.
///
/// `low == 0` only happens for a fraction of exactly 1, which forces
/// `low_prob == 1.0`, so `high` is never consulted in that case.
pub(crate) fn split_prob(fraction: f64) -> (u8, u8, f64) {
    let fraction = fraction.clamp(0.0, 1.0);
    if fraction.is_nan() || fraction < MIN_SAMPLING_PROBABILITY {
        return (MAX_P_VALUE, MAX_P_VALUE, 1.0);
    }

    let low = -exp_from_float64(fraction);
    let low_p = exp_to_float64(-low);
    let high_p = exp_to_float64(-low + 1);
    let low_prob = (high_p - fraction) / (high_p - low_p);

    (low as u8, (low as u8).saturating_sub(1), low_prob)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exponent_extraction() {
        let test_cases = vec![
            (1.0, 0),
            (0.5, -1),
            (0.25, -2),
            (0.75, -1),
            (3.0, 1),
            (MIN_SAMPLING_PROBABILITY, -62),
        ];
        for (x, expected) in test_cases {
            assert_eq!(exp_from_float64(x), expected, "exponent of {x}");
        }
    }

    #[test]
    fn exponent_reconstruction() {
        for e in -62..=10 {
            let x = exp_to_float64(e);
            assert_eq!(exp_from_float64(x), e);
        }
        assert_eq!(exp_to_float64(0), 1.0);
        assert_eq!(exp_to_float64(-2), 0.25);
    }

    #[test]
    fn split_is_unbiased() {
        let fractions = vec![
            1.0,
            0.75,
            0.5,
            1.0 / 3.0,
            0.25,
            0.1,
            0.01,
            1e-5,
            MIN_SAMPLING_PROBABILITY,
        ];
        for fraction in fractions {
            let (low, high, low_prob) = split_prob(fraction);
            let low_p = exp_to_float64(-(low as i32));
            let high_p = exp_to_float64(-(high as i32));
            assert!(
                low_p <= fraction && fraction <= high_p,
                "{fraction} outside [{low_p}, {high_p}]"
            );
            assert!((0.0..=1.0).contains(&low_prob), "low_prob {low_prob}");

            let recombined = low_prob * low_p + (1.0 - low_prob) * high_p;
            assert!(
                (recombined - fraction).abs() <= 2.0 * fraction * f64::EPSILON,
                "{fraction} recombined as {recombined}"
            );
        }
    }

    #[test]
    fn power_of_two_picks_low_always() {
        for exp in 0..62 {
            let fraction = exp_to_float64(-exp);
            let (low, _, low_prob) = split_prob(fraction);
            assert_eq!(low as i32, exp);
            assert_eq!(low_prob, 1.0);
        }
    }

    #[test]
    fn neighboring_counts() {
        let (low, high, low_prob) = split_prob(0.75);
        assert_eq!((low, high), (1, 0));
        assert_eq!(low_prob, 0.5);

        let (low, high, _) = split_prob(0.1);
        assert_eq!((low, high), (4, 3));
    }

    #[test]
    fn out_of_range_fractions() {
        assert_eq!(split_prob(0.0), (63, 63, 1.0));
        assert_eq!(split_prob(-1.0), (63, 63, 1.0));
        assert_eq!(split_prob(f64::NAN), (63, 63, 1.0));
        assert_eq!(split_prob(MIN_SAMPLING_PROBABILITY / 2.0), (63, 63, 1.0));

        // Fractions above 1 clamp to certainty.
        assert_eq!(split_prob(2.0), (0, 0, 1.0));
    }
}
