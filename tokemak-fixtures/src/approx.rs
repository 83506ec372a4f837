//! Relative comparison of on-chain amounts.
//!
//! `approx_eq(actual, expected, rel)` holds when
//! `|actual - expected| <= rel * expected`, a plain relative tolerance
//! with no absolute floor.

use alloy::primitives::U256;

/// Fixed-point scale the tolerance is converted to before multiplying.
const TOLERANCE_SCALE: u128 = 1_000_000_000_000_000_000;

/// Absolute tolerance `rel * expected`, rounded down. Saturates at
/// `U256::MAX` for `rel >= 1`.
pub fn tolerance(expected: U256, rel: f64) -> U256 {
    if rel.is_nan() || rel <= 0.0 {
        return U256::ZERO;
    }
    let scaled = (rel * TOLERANCE_SCALE as f64).round() as u128;
    let scale = U256::from(TOLERANCE_SCALE);
    // Split to avoid overflow when `expected` is close to U256::MAX.
    let whole = expected / scale;
    let rem = expected % scale;
    whole
        .saturating_mul(U256::from(scaled))
        .saturating_add(rem * U256::from(scaled) / scale)
}

pub fn approx_eq(actual: U256, expected: U256, rel: f64) -> bool {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    diff <= tolerance(expected, rel)
}
