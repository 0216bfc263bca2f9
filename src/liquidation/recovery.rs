//! Recovery Mode detection.
//!
//! Recovery Mode is a per-asset state entered when the Total Collateral
//! Ratio (TCR) of all vessels of that asset falls below the asset's CCR.
//! While active:
//!
//! 1. **Liquidation threshold raised**: vessels below TCR may be liquidated
//!    against the Stability Pool, capped at MCR worth of collateral
//! 2. **Borrowing restricted**: new debt needs ICR >= CCR and must improve ICR
//! 3. **Withdrawal blocked**: collateral may not leave a vessel
//!
//! TCR counts pending redistribution rewards, i.e. active plus default pools.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::core::config::AdminConfig;
use crate::core::pools::CollateralCustody;
use crate::core::vessel_manager::VesselManager;
use crate::error::Result;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// SYSTEM STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// System-wide health of one collateral asset at a given price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SystemStatus {
    /// Collateral asset
    pub asset: Address,
    /// Price used (1e18 = $1)
    pub price: u128,
    /// Active plus default pool collateral
    pub entire_system_coll: u128,
    /// Active plus default pool debt
    pub entire_system_debt: u128,
    /// Total collateral ratio
    pub tcr: u128,
    /// Critical collateral ratio of the asset
    pub ccr: u128,
    /// Whether Recovery Mode is active
    pub recovery_mode: bool,
}

impl SystemStatus {
    /// Distance to the CCR in ratio units; zero while in Recovery Mode
    pub fn headroom(&self) -> u128 {
        self.tcr.saturating_sub(self.ccr)
    }
}

/// Compute the [`SystemStatus`] of `asset` at `price`
pub fn system_status(
    asset: Address,
    price: u128,
    config: &AdminConfig,
    vessels: &VesselManager,
    pools: &impl CollateralCustody,
) -> Result<SystemStatus> {
    let ccr = config.params(&asset)?.ccr;
    let entire_system_coll = vessels.entire_system_coll(&asset, pools)?;
    let entire_system_debt = vessels.entire_system_debt(&asset, pools)?;
    let tcr = compute_cr(entire_system_coll, entire_system_debt, price)?;
    Ok(SystemStatus {
        asset,
        price,
        entire_system_coll,
        entire_system_debt,
        tcr,
        ccr,
        recovery_mode: tcr < ccr,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// PREDICATES
// ═══════════════════════════════════════════════════════════════════════════════

/// Total collateral ratio of `asset`; `u128::MAX` without debt
pub fn get_tcr(
    asset: &Address,
    price: u128,
    vessels: &VesselManager,
    pools: &impl CollateralCustody,
) -> Result<u128> {
    let coll = vessels.entire_system_coll(asset, pools)?;
    let debt = vessels.entire_system_debt(asset, pools)?;
    compute_cr(coll, debt, price)
}

/// Whether `asset` is in Recovery Mode at `price`
pub fn check_recovery_mode(
    asset: &Address,
    price: u128,
    config: &AdminConfig,
    vessels: &VesselManager,
    pools: &impl CollateralCustody,
) -> Result<bool> {
    let ccr = config.params(asset)?.ccr;
    Ok(get_tcr(asset, price, vessels, pools)? < ccr)
}

/// Whether hypothetical system totals would be in Recovery Mode
pub fn check_potential_recovery_mode(
    entire_system_coll: u128,
    entire_system_debt: u128,
    price: u128,
    ccr: u128,
) -> Result<bool> {
    Ok(compute_cr(entire_system_coll, entire_system_debt, price)? < ccr)
}

/// TCR after a vessel changes by the given deltas
#[allow(clippy::too_many_arguments)]
pub fn new_tcr_from_vessel_change(
    asset: &Address,
    price: u128,
    coll_change: u128,
    is_coll_increase: bool,
    debt_change: u128,
    is_debt_increase: bool,
    vessels: &VesselManager,
    pools: &impl CollateralCustody,
) -> Result<u128> {
    let coll = vessels.entire_system_coll(asset, pools)?;
    let debt = vessels.entire_system_debt(asset, pools)?;
    let coll = if is_coll_increase {
        safe_add(coll, coll_change)?
    } else {
        safe_sub(coll, coll_change)?
    };
    let debt = if is_debt_increase {
        safe_add(debt, debt_change)?
    } else {
        safe_sub(debt, debt_change)?
    };
    compute_cr(coll, debt, price)
}
