//! Borrowing and redemption fees.
//!
//! # Base rate
//!
//! Each collateral carries a redemption base rate. It decays every minute by
//! [`MINUTE_DECAY_FACTOR`] (a 12 hour half-life) and grows with each
//! redemption by the redeemed share of total debt divided by [`BETA`].
//! The effective redemption rate is `floor + base_rate`, capped at 100%.
//!
//! The borrowing fee is a flat per-asset percentage.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::config::CollateralParams;
use crate::core::vessel_manager::AssetLedger;
use crate::error::{Error, Result};
use crate::utils::constants::*;
use crate::utils::math::*;

/// Outcome of a fee calculation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeCalculation {
    /// Rate applied (1e18 = 100%)
    pub rate: u128,
    /// Fee amount
    pub fee: u128,
}

/// Whole minutes since the last fee operation
pub fn minutes_passed_since_last_fee_op(ledger: &AssetLedger, now: u64) -> u64 {
    now.saturating_sub(ledger.last_fee_operation_time) / SECONDS_IN_ONE_MINUTE
}

/// Base rate after decay up to `now`
pub fn calc_decayed_base_rate(ledger: &AssetLedger, now: u64) -> Result<u128> {
    let minutes = minutes_passed_since_last_fee_op(ledger, now);
    let decay_factor = dec_pow(MINUTE_DECAY_FACTOR, minutes)?;
    mul_div(ledger.base_rate, decay_factor, DECIMAL_PRECISION)
}

/// Advance the fee clock, but only once a full minute has passed
pub fn update_last_fee_op_time(ledger: &mut AssetLedger, now: u64) {
    let elapsed = now.saturating_sub(ledger.last_fee_operation_time);
    if elapsed >= SECONDS_IN_ONE_MINUTE {
        ledger.last_fee_operation_time = now;
    }
}

/// Decay the base rate and add the share of debt just redeemed.
///
/// Returns the new base rate.
pub fn update_base_rate_from_redemption(
    ledger: &mut AssetLedger,
    now: u64,
    coll_drawn: u128,
    price: u128,
    total_debt: u128,
) -> Result<u128> {
    let decayed = calc_decayed_base_rate(ledger, now)?;
    let redeemed_fraction = mul_div(coll_drawn, price, total_debt)?;
    let new_base_rate = safe_add(decayed, redeemed_fraction / BETA)?.min(DECIMAL_PRECISION);
    if new_base_rate == 0 {
        return Err(Error::Internal("base rate is zero after a redemption".into()));
    }

    ledger.base_rate = new_base_rate;
    update_last_fee_op_time(ledger, now);
    debug!(
        base_rate = %format_wad(new_base_rate),
        decayed = %format_wad(decayed),
        "base rate updated from redemption"
    );
    Ok(new_base_rate)
}

/// `min(floor + base_rate, 100%)`
pub fn redemption_rate(base_rate: u128, fee_floor: u128) -> u128 {
    fee_floor.saturating_add(base_rate).min(DECIMAL_PRECISION)
}

/// Redemption rate after decaying the base rate to `now`
pub fn redemption_rate_with_decay(
    ledger: &AssetLedger,
    params: &CollateralParams,
    now: u64,
) -> Result<u128> {
    Ok(redemption_rate(
        calc_decayed_base_rate(ledger, now)?,
        params.redemption_fee_floor,
    ))
}

/// Fee charged on `coll_drawn` at `rate`; it may never take everything
pub fn redemption_fee(rate: u128, coll_drawn: u128) -> Result<FeeCalculation> {
    let fee = mul_div(rate, coll_drawn, DECIMAL_PRECISION)?;
    if fee >= coll_drawn {
        return Err(Error::FeeEatsAllCollateral {
            fee,
            drawn: coll_drawn,
        });
    }
    Ok(FeeCalculation { rate, fee })
}

/// Flat borrowing fee on newly drawn debt
pub fn borrowing_fee(params: &CollateralParams, debt: u128) -> Result<FeeCalculation> {
    Ok(FeeCalculation {
        rate: params.borrowing_fee,
        fee: mul_div(debt, params.borrowing_fee, DECIMAL_PRECISION)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const E18: u128 = DECIMAL_PRECISION;

    #[test]
    fn test_base_rate_decay_half_life() {
        let ledger = AssetLedger {
            base_rate: E18 / 10,
            last_fee_operation_time: 1_000,
            ..AssetLedger::default()
        };
        assert_eq!(calc_decayed_base_rate(&ledger, 1_059).unwrap(), E18 / 10);
        let half = calc_decayed_base_rate(&ledger, 1_000 + 12 * 3_600).unwrap();
        assert!(half.abs_diff(E18 / 20) < E18 / 1_000_000);
    }

    #[test]
    fn test_redemption_increases_base_rate() {
        let mut ledger = AssetLedger::default();
        // 1 coll at 1000 against 10_000 debt = 10% redeemed, BETA 2 => 5%
        let rate =
            update_base_rate_from_redemption(&mut ledger, 600, E18, 1_000 * E18, 10_000 * E18)
                .unwrap();
        assert_eq!(rate, E18 / 20);
        assert_eq!(ledger.last_fee_operation_time, 600);

        // Within the same minute the fee clock stays put
        update_base_rate_from_redemption(&mut ledger, 630, E18, 1_000 * E18, 10_000 * E18)
            .unwrap();
        assert_eq!(ledger.last_fee_operation_time, 600);
        assert_eq!(ledger.base_rate, E18 / 10);
    }

    #[test]
    fn test_base_rate_capped() {
        let mut ledger = AssetLedger::default();
        let rate =
            update_base_rate_from_redemption(&mut ledger, 60, 100 * E18, 1_000 * E18, 1_000 * E18)
                .unwrap();
        assert_eq!(rate, E18);
        assert_eq!(redemption_rate(rate, DEFAULT_REDEMPTION_FEE_FLOOR), E18);
    }

    #[test]
    fn test_redemption_fee_cannot_eat_all() {
        let calc = redemption_fee(E18 / 100, 50 * E18).unwrap();
        assert_eq!(calc.fee, E18 / 2);
        assert!(matches!(
            redemption_fee(E18, 50 * E18),
            Err(Error::FeeEatsAllCollateral { .. })
        ));
    }

    #[test]
    fn test_borrowing_fee() {
        let params = CollateralParams::default();
        assert_eq!(borrowing_fee(&params, 2_000 * E18).unwrap().fee, 10 * E18);
    }
}
