//! Fixed-point arithmetic and ratio helpers.
//!
//! Every product that can exceed 128 bits is computed with a 256-bit
//! intermediate and truncated back, so results match integer EVM
//! arithmetic bit for bit. Nothing in here panics: overflow and division
//! by zero surface as [`Error`] values.

use alloy_primitives::U256;
use rust_decimal::Decimal;

use crate::error::{Error, Result};
use crate::utils::constants::{
    DECIMAL_PRECISION, MAX_DECAY_MINUTES, NICR_PRECISION, TARGET_DIGITS,
};

// ═══════════════════════════════════════════════════════════════════════════════
// 256-BIT BRIDGE
// ═══════════════════════════════════════════════════════════════════════════════

/// Widens to 256 bits
pub(crate) fn wide(value: u128) -> U256 {
    U256::from(value)
}

/// Narrows back to 128 bits, failing on overflow
pub(crate) fn narrow(value: U256, operation: &str) -> Result<u128> {
    if value > U256::from(u128::MAX) {
        return Err(Error::Overflow {
            operation: operation.to_string(),
        });
    }
    let limbs = value.as_limbs();
    Ok(((limbs[1] as u128) << 64) | limbs[0] as u128)
}

// ═══════════════════════════════════════════════════════════════════════════════
// SAFE ARITHMETIC OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Safe addition with overflow check
pub fn safe_add(a: u128, b: u128) -> Result<u128> {
    a.checked_add(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} + {}", a, b),
    })
}

/// Safe subtraction with underflow check
pub fn safe_sub(a: u128, b: u128) -> Result<u128> {
    a.checked_sub(b).ok_or_else(|| Error::Underflow {
        operation: format!("{} - {}", a, b),
    })
}

/// Safe multiplication with overflow check
pub fn safe_mul(a: u128, b: u128) -> Result<u128> {
    a.checked_mul(b).ok_or_else(|| Error::Overflow {
        operation: format!("{} * {}", a, b),
    })
}

/// Safe division with zero check (truncating)
pub fn safe_div(a: u128, b: u128) -> Result<u128> {
    if b == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("{} / 0", a),
        });
    }
    Ok(a / b)
}

/// Computes `(a * b) / c` with a 256-bit intermediate, truncating
pub fn mul_div(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    let product = wide(a) * wide(b);
    narrow(product / wide(c), "mul_div")
}

/// Computes `(a * b) / c` rounding up
pub fn mul_div_up(a: u128, b: u128, c: u128) -> Result<u128> {
    if c == 0 {
        return Err(Error::DivisionByZero {
            operation: format!("({} * {}) / 0", a, b),
        });
    }
    let product = wide(a) * wide(b);
    let quotient = product / wide(c);
    let rounded = if product % wide(c) == U256::ZERO {
        quotient
    } else {
        quotient + U256::from(1u8)
    };
    narrow(rounded, "mul_div_up")
}

// ═══════════════════════════════════════════════════════════════════════════════
// DECIMAL MATH
// ═══════════════════════════════════════════════════════════════════════════════

/// Multiplies two wads, rounding half up
pub fn dec_mul(x: u128, y: u128) -> Result<u128> {
    let product = wide(x) * wide(y) + wide(DECIMAL_PRECISION / 2);
    narrow(product / wide(DECIMAL_PRECISION), "dec_mul")
}

/// Raises a wad base to an integer power by squaring.
///
/// The exponent is capped at [`MAX_DECAY_MINUTES`]; the base is expected to
/// be at most 1.0 (it is only used for decay).
pub fn dec_pow(base: u128, minutes: u64) -> Result<u128> {
    let mut n = minutes.min(MAX_DECAY_MINUTES);
    if n == 0 {
        return Ok(DECIMAL_PRECISION);
    }

    let mut y = DECIMAL_PRECISION;
    let mut x = base;
    while n > 1 {
        if n % 2 == 0 {
            x = dec_mul(x, x)?;
            n /= 2;
        } else {
            y = dec_mul(x, y)?;
            x = dec_mul(x, x)?;
            n = (n - 1) / 2;
        }
    }
    dec_mul(x, y)
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL RATIOS
// ═══════════════════════════════════════════════════════════════════════════════

/// Price-scaled collateral ratio: `coll * price / debt`.
///
/// Zero debt yields `u128::MAX` (infinite ratio).
pub fn compute_cr(coll: u128, debt: u128, price: u128) -> Result<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    mul_div(coll, price, debt)
}

/// Nominal collateral ratio used for sorting: `coll * 1e20 / debt`.
///
/// Zero debt yields `u128::MAX`.
pub fn compute_nominal_cr(coll: u128, debt: u128) -> Result<u128> {
    if debt == 0 {
        return Ok(u128::MAX);
    }
    mul_div(coll, NICR_PRECISION, debt)
}

/// Normalizes an oracle answer with `decimals` digits to 18 decimals.
///
/// Scaling down truncates.
pub fn scale_price_by_digits(price: u128, decimals: u32) -> Result<u128> {
    if decimals < TARGET_DIGITS {
        let factor = 10u128.pow(TARGET_DIGITS - decimals);
        safe_mul(price, factor)
    } else if decimals > TARGET_DIGITS {
        let exponent = decimals - TARGET_DIGITS;
        if exponent > 38 {
            return Ok(0);
        }
        Ok(price / 10u128.pow(exponent))
    } else {
        Ok(price)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// DISPLAY
// ═══════════════════════════════════════════════════════════════════════════════

/// Renders a wad as a decimal string for logs ("1234.5")
pub fn format_wad(value: u128) -> String {
    i128::try_from(value)
        .ok()
        .and_then(|v| Decimal::try_from_i128_with_scale(v, TARGET_DIGITS).ok())
        .map(|d| d.normalize().to_string())
        .unwrap_or_else(|| format!("{}e-18", value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::constants::MINUTE_DECAY_FACTOR;

    const E18: u128 = DECIMAL_PRECISION;

    #[test]
    fn test_safe_arithmetic() {
        assert_eq!(safe_add(1, 2).unwrap(), 3);
        assert!(safe_add(u128::MAX, 1).is_err());
        assert!(safe_sub(1, 2).is_err());
        assert!(safe_div(1, 0).is_err());
    }

    #[test]
    fn test_mul_div_wide_intermediate() {
        // 1e27 * 1e21 overflows u128, result does not
        let coll = 1_000_000_000 * E18;
        let price = 1_000 * E18;
        assert_eq!(mul_div(coll, price, E18).unwrap(), 1_000_000_000_000 * E18);
        assert!(mul_div(u128::MAX, 2, 1).is_err());
        assert!(mul_div(1, 1, 0).is_err());
    }

    #[test]
    fn test_mul_div_up() {
        assert_eq!(mul_div_up(10, 1, 3).unwrap(), 4);
        assert_eq!(mul_div_up(9, 1, 3).unwrap(), 3);
    }

    #[test]
    fn test_compute_cr() {
        // 1 ETH at $2000 vs 1000 debt => 200%
        assert_eq!(compute_cr(E18, 1_000 * E18, 2_000 * E18).unwrap(), 2 * E18);
        assert_eq!(compute_cr(E18, 0, 2_000 * E18).unwrap(), u128::MAX);
    }

    #[test]
    fn test_compute_nominal_cr() {
        assert_eq!(compute_nominal_cr(E18, 100 * E18).unwrap(), NICR_PRECISION / 100);
        assert_eq!(compute_nominal_cr(E18, 0).unwrap(), u128::MAX);
    }

    #[test]
    fn test_scale_price_by_digits() {
        assert_eq!(scale_price_by_digits(2_000_00000000, 8).unwrap(), 2_000 * E18);
        assert_eq!(scale_price_by_digits(2_000 * E18, 18).unwrap(), 2_000 * E18);
        assert_eq!(scale_price_by_digits(2_000 * E18 * 100 + 99, 20).unwrap(), 2_000 * E18);
    }

    #[test]
    fn test_dec_pow_half_life() {
        // 720 minutes at the minute decay factor halves the rate
        let factor = dec_pow(MINUTE_DECAY_FACTOR, 720).unwrap();
        let half = E18 / 2;
        let diff = factor.abs_diff(half);
        assert!(diff < E18 / 1_000_000, "decay after 12h was {}", factor);
        assert_eq!(dec_pow(MINUTE_DECAY_FACTOR, 0).unwrap(), E18);
        assert_eq!(dec_pow(MINUTE_DECAY_FACTOR, 1).unwrap(), MINUTE_DECAY_FACTOR);
    }

    #[test]
    fn test_format_wad() {
        assert_eq!(format_wad(1_500_000_000_000_000_000), "1.5");
        assert_eq!(format_wad(0), "0");
    }
}
