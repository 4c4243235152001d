//! Decimal arithmetic utilities for capital bookkeeping.
//!
//! Detector math runs in `f64`; everything that touches capital is converted
//! to `Decimal` at the boundary through these helpers.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

/// Round a decimal to a specific number of decimal places.
pub fn round_to_precision(value: Decimal, decimals: u32) -> Decimal {
    value.round_dp(decimals)
}

/// Convert a detector-side float into a decimal.
///
/// Non-finite values map to zero so a bad indicator value can never turn
/// into an unbounded capital figure.
pub fn to_decimal(value: f64) -> Decimal {
    if !value.is_finite() {
        return Decimal::ZERO;
    }
    Decimal::from_f64(value).unwrap_or(Decimal::ZERO)
}

/// Safe division that returns zero if divisor is zero.
pub fn safe_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator == Decimal::ZERO {
        Decimal::ZERO
    } else {
        numerator / denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_to_decimal_handles_non_finite() {
        assert_eq!(to_decimal(f64::NAN), Decimal::ZERO);
        assert_eq!(to_decimal(f64::INFINITY), Decimal::ZERO);
        assert_eq!(round_to_precision(to_decimal(250.125), 2), dec!(250.12));
    }

    #[test]
    fn test_quantity_rounding() {
        // 875 notional at 104 entry
        assert_eq!(
            round_to_precision(safe_div(dec!(875), dec!(104)), 8),
            dec!(8.41346154)
        );
    }

    #[test]
    fn test_safe_div() {
        assert_eq!(safe_div(dec!(10), dec!(4)), dec!(2.5));
        assert_eq!(safe_div(dec!(10), Decimal::ZERO), Decimal::ZERO);
    }
}
