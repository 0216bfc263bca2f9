//! Protocol constants.
//!
//! All amounts, prices and ratios are unsigned integers with 18 implied
//! decimals ("wad"). Rounding is always truncation unless a helper says
//! otherwise.

// ═══════════════════════════════════════════════════════════════════════════════
// PRECISION
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed-point precision: 1e18 = 1.0
pub const DECIMAL_PRECISION: u128 = 1_000_000_000_000_000_000;

/// Precision of the nominal collateral ratio (NICR), 1e20
pub const NICR_PRECISION: u128 = 100_000_000_000_000_000_000;

/// 100% expressed as a wad ratio
pub const ONE_HUNDRED_PCT: u128 = DECIMAL_PRECISION;

/// Decimals every price is normalized to
pub const TARGET_DIGITS: u32 = 18;

/// Basis points divisor used by the redemption softening parameter (10000 = 100%)
pub const PERCENTAGE_PRECISION: u128 = 10_000;

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// Scale factor applied to P when it would fall below it (1e9)
pub const SCALE_FACTOR: u128 = 1_000_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// FEES
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-minute base-rate decay factor (half-life of 12 hours)
pub const MINUTE_DECAY_FACTOR: u128 = 999_037_758_833_783_000;

/// Redemption volume divisor in the base-rate update
pub const BETA: u128 = 2;

/// Seconds per minute (base-rate bookkeeping granularity)
pub const SECONDS_IN_ONE_MINUTE: u64 = 60;

/// Cap on the exponent passed to `dec_pow` (1000 years in minutes)
pub const MAX_DECAY_MINUTES: u64 = 525_600_000;

/// Lower bound accepted for the redemption softening parameter (96%)
pub const MIN_REDEMPTION_SOFTENING: u128 = 9_600;

/// Default redemption softening parameter (97%)
pub const DEFAULT_REDEMPTION_SOFTENING: u128 = 9_700;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL DEFAULTS
// ═══════════════════════════════════════════════════════════════════════════════

/// Default minimum collateral ratio - 110%
pub const DEFAULT_MCR: u128 = 1_100_000_000_000_000_000;

/// Default critical collateral ratio - 150%
pub const DEFAULT_CCR: u128 = 1_500_000_000_000_000_000;

/// Default borrowing fee - 0.5%
pub const DEFAULT_BORROWING_FEE: u128 = 5_000_000_000_000_000;

/// Default redemption fee floor - 0.5%
pub const DEFAULT_REDEMPTION_FEE_FLOOR: u128 = 5_000_000_000_000_000;

/// Default collateral liquidation fee divisor (coll / 200 = 0.5%)
pub const DEFAULT_PERCENT_DIVISOR: u128 = 200;

/// Default debt-token gas compensation per vessel - 200 tokens
pub const DEFAULT_GAS_COMPENSATION: u128 = 200 * DECIMAL_PRECISION;

/// Default minimum net debt - 2000 tokens
pub const DEFAULT_MIN_NET_DEBT: u128 = 2_000 * DECIMAL_PRECISION;

/// Default mint cap - 1.5M tokens
pub const DEFAULT_MINT_CAP: u128 = 1_500_000 * DECIMAL_PRECISION;

/// Safety bounds for the percent divisor
pub const PERCENT_DIVISOR_BOUNDS: (u128, u128) = (2, 200);

/// Safety bounds for the redemption fee floor (0.1% .. 10%)
pub const REDEMPTION_FEE_FLOOR_BOUNDS: (u128, u128) = (
    1_000_000_000_000_000,
    100_000_000_000_000_000,
);

/// Safety bounds for the borrowing fee (0% .. 10%)
pub const BORROWING_FEE_BOUNDS: (u128, u128) = (0, 100_000_000_000_000_000);

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Sequencer must be up this long before anyone may read prices (1 hour)
pub const SEQUENCER_BORROWING_DELAY_SECONDS: u64 = 3_600;

/// Sequencer must be up this long before liquidations may read prices (2 hours)
pub const SEQUENCER_LIQUIDATION_DELAY_SECONDS: u64 = 7_200;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_constants() {
        assert!(ONE_HUNDRED_PCT < DEFAULT_MCR);
        assert!(DEFAULT_MCR < DEFAULT_CCR);
    }

    #[test]
    fn test_fee_constants() {
        assert!(DEFAULT_REDEMPTION_FEE_FLOOR >= REDEMPTION_FEE_FLOOR_BOUNDS.0);
        assert!(DEFAULT_REDEMPTION_FEE_FLOOR <= REDEMPTION_FEE_FLOOR_BOUNDS.1);
        assert!(MINUTE_DECAY_FACTOR < DECIMAL_PRECISION);
        assert!(MIN_REDEMPTION_SOFTENING <= DEFAULT_REDEMPTION_SOFTENING);
        assert!(DEFAULT_REDEMPTION_SOFTENING <= PERCENTAGE_PRECISION);
    }

    #[test]
    fn test_sequencer_delays() {
        assert!(SEQUENCER_BORROWING_DELAY_SECONDS < SEQUENCER_LIQUIDATION_DELAY_SECONDS);
    }
}
