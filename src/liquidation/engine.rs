//! Liquidation engine.
//!
//! Liquidating a vessel splits its debt and collateral into:
//! - gas compensation for the caller (`coll / percent_divisor` plus the
//!   vessel's debt-token reserve)
//! - a part offset against the Stability Pool
//! - a part redistributed to every other vessel by stake
//! - in Recovery Mode, a collateral surplus returned to the owner
//!
//! Per-vessel values are accumulated into [`LiquidationTotals`] and moved
//! between pools once per call by [`finalize_liquidation`].

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::config::CollateralParams;
use crate::core::pools::{CollateralCustody, DebtToken, PoolId};
use crate::core::vessel::VesselStatus;
use crate::error::Result;
use crate::liquidation::recovery::{check_potential_recovery_mode, check_recovery_mode};
use crate::protocol::events::{ProtocolEvent, VesselOperation};
use crate::protocol::state::LedgerState;
use crate::utils::constants::ONE_HUNDRED_PCT;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION VALUES
// ═══════════════════════════════════════════════════════════════════════════════

/// Breakdown of one vessel's liquidation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationValues {
    /// Debt including pending rewards
    pub entire_vessel_debt: u128,
    /// Collateral including pending rewards
    pub entire_vessel_coll: u128,
    /// Collateral paid to the caller
    pub coll_gas_compensation: u128,
    /// Debt tokens paid to the caller from the gas pool
    pub debt_token_gas_compensation: u128,
    /// Debt cancelled against the Stability Pool
    pub debt_to_offset: u128,
    /// Collateral sent to the Stability Pool
    pub coll_to_send_to_sp: u128,
    /// Debt redistributed to other vessels
    pub debt_to_redistribute: u128,
    /// Collateral redistributed to other vessels
    pub coll_to_redistribute: u128,
    /// Collateral returned to the owner
    pub coll_surplus: u128,
}

/// Sum of [`LiquidationValues`] over one call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationTotals {
    /// Collateral of all liquidated vessels
    pub total_coll_in_sequence: u128,
    /// Debt of all liquidated vessels
    pub total_debt_in_sequence: u128,
    /// Collateral gas compensation
    pub total_coll_gas_compensation: u128,
    /// Debt-token gas compensation
    pub total_debt_token_gas_compensation: u128,
    /// Debt offset against the Stability Pool
    pub total_debt_to_offset: u128,
    /// Collateral sent to the Stability Pool
    pub total_coll_to_send_to_sp: u128,
    /// Debt redistributed
    pub total_debt_to_redistribute: u128,
    /// Collateral redistributed
    pub total_coll_to_redistribute: u128,
    /// Collateral escrowed for owners
    pub total_coll_surplus: u128,
    /// Owners whose vessels were liquidated, in order
    pub liquidated: Vec<Address>,
}

impl LiquidationTotals {
    /// Fold one vessel's values in
    pub fn add(&mut self, owner: Address, values: &LiquidationValues) -> Result<()> {
        self.total_coll_gas_compensation =
            safe_add(self.total_coll_gas_compensation, values.coll_gas_compensation)?;
        self.total_debt_token_gas_compensation = safe_add(
            self.total_debt_token_gas_compensation,
            values.debt_token_gas_compensation,
        )?;
        self.total_debt_in_sequence =
            safe_add(self.total_debt_in_sequence, values.entire_vessel_debt)?;
        self.total_coll_in_sequence =
            safe_add(self.total_coll_in_sequence, values.entire_vessel_coll)?;
        self.total_debt_to_offset = safe_add(self.total_debt_to_offset, values.debt_to_offset)?;
        self.total_coll_to_send_to_sp =
            safe_add(self.total_coll_to_send_to_sp, values.coll_to_send_to_sp)?;
        self.total_debt_to_redistribute =
            safe_add(self.total_debt_to_redistribute, values.debt_to_redistribute)?;
        self.total_coll_to_redistribute =
            safe_add(self.total_coll_to_redistribute, values.coll_to_redistribute)?;
        self.total_coll_surplus = safe_add(self.total_coll_surplus, values.coll_surplus)?;
        self.liquidated.push(owner);
        Ok(())
    }

    /// Whether nothing was liquidated
    pub fn is_empty(&self) -> bool {
        self.total_debt_in_sequence == 0
    }
}

/// Result of a finalized liquidation call
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationOutcome {
    /// Collateral asset
    pub asset: Address,
    /// Price used
    pub price: u128,
    /// Whether the call started in Recovery Mode
    pub recovery_mode_at_start: bool,
    /// Debt removed from liquidated vessels
    pub liquidated_debt: u128,
    /// Collateral liquidated, net of gas compensation and surplus
    pub liquidated_coll: u128,
    /// Collateral paid to the caller
    pub coll_gas_compensation: u128,
    /// Debt tokens paid to the caller
    pub debt_token_gas_compensation: u128,
    /// Owners whose vessels were liquidated
    pub liquidated: Vec<Address>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PURE SPLITS
// ═══════════════════════════════════════════════════════════════════════════════

/// Collateral paid to the liquidator: `coll / percent_divisor`
pub fn coll_gas_compensation(params: &CollateralParams, coll: u128) -> Result<u128> {
    safe_div(coll, params.percent_divisor)
}

/// Split debt and collateral between Stability Pool and redistribution.
///
/// Returns `(debt_to_offset, coll_to_send_to_sp, debt_to_redistribute,
/// coll_to_redistribute)`.
pub fn get_offset_and_redistribution_vals(
    debt: u128,
    coll: u128,
    debt_in_stability_pool: u128,
) -> Result<(u128, u128, u128, u128)> {
    if debt_in_stability_pool == 0 || debt == 0 {
        return Ok((0, 0, debt, coll));
    }
    let debt_to_offset = debt.min(debt_in_stability_pool);
    let coll_to_send_to_sp = mul_div(coll, debt_to_offset, debt)?;
    Ok((
        debt_to_offset,
        coll_to_send_to_sp,
        debt - debt_to_offset,
        coll - coll_to_send_to_sp,
    ))
}

/// Recovery Mode liquidation of a vessel between MCR and TCR.
///
/// Only `debt * MCR / price` worth of collateral is consumed; the rest is
/// surplus for the owner.
pub fn get_capped_offset_vals(
    params: &CollateralParams,
    entire_vessel_debt: u128,
    entire_vessel_coll: u128,
    price: u128,
) -> Result<LiquidationValues> {
    let capped_coll_portion = mul_div(entire_vessel_debt, params.mcr, price)?;
    let coll_gas = coll_gas_compensation(params, capped_coll_portion)?;
    Ok(LiquidationValues {
        entire_vessel_debt,
        entire_vessel_coll,
        coll_gas_compensation: coll_gas,
        debt_token_gas_compensation: params.debt_token_gas_compensation,
        debt_to_offset: entire_vessel_debt,
        coll_to_send_to_sp: safe_sub(capped_coll_portion, coll_gas)?,
        debt_to_redistribute: 0,
        coll_to_redistribute: 0,
        coll_surplus: safe_sub(entire_vessel_coll, capped_coll_portion)?,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// SINGLE VESSEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Catch the vessel up and take its stake out; returns `(debt, coll)`
fn take_vessel(state: &mut LedgerState, asset: Address, owner: Address) -> Result<(u128, u128)> {
    state
        .vessels
        .apply_pending_rewards(asset, owner, &mut state.pools)?;
    let vessel = state.vessels.require_active(&asset, &owner)?;
    let (debt, coll) = (vessel.debt, vessel.coll);
    state.vessels.remove_stake(asset, owner)?;
    Ok((debt, coll))
}

fn close_liquidated(
    state: &mut LedgerState,
    asset: Address,
    owner: Address,
    values: &LiquidationValues,
    operation: VesselOperation,
) -> Result<()> {
    state.vessels.close_vessel(
        asset,
        owner,
        VesselStatus::ClosedByLiquidation,
        &mut state.sorted,
    )?;
    state.events.push(ProtocolEvent::VesselLiquidated {
        asset,
        owner,
        debt: values.entire_vessel_debt,
        coll: values.entire_vessel_coll,
        operation,
    });
    state.events.push(ProtocolEvent::VesselUpdated {
        asset,
        owner,
        debt: 0,
        coll: 0,
        stake: 0,
        operation,
    });
    debug!(
        %asset, %owner,
        debt = %format_wad(values.entire_vessel_debt),
        coll = %format_wad(values.entire_vessel_coll),
        offset = %format_wad(values.debt_to_offset),
        redistributed = %format_wad(values.debt_to_redistribute),
        ?operation,
        "vessel liquidated"
    );
    Ok(())
}

/// Offset up to the pool, redistribute the rest
fn liquidate_with_offset(
    state: &mut LedgerState,
    asset: Address,
    owner: Address,
    debt_in_stability_pool: u128,
    operation: VesselOperation,
) -> Result<LiquidationValues> {
    let params = state.config.params(&asset)?.clone();
    let (debt, coll) = take_vessel(state, asset, owner)?;

    let coll_gas = coll_gas_compensation(&params, coll)?;
    let coll_to_liquidate = safe_sub(coll, coll_gas)?;
    let (debt_to_offset, coll_to_send_to_sp, debt_to_redistribute, coll_to_redistribute) =
        get_offset_and_redistribution_vals(debt, coll_to_liquidate, debt_in_stability_pool)?;

    let values = LiquidationValues {
        entire_vessel_debt: debt,
        entire_vessel_coll: coll,
        coll_gas_compensation: coll_gas,
        debt_token_gas_compensation: params.debt_token_gas_compensation,
        debt_to_offset,
        coll_to_send_to_sp,
        debt_to_redistribute,
        coll_to_redistribute,
        coll_surplus: 0,
    };
    close_liquidated(state, asset, owner, &values, operation)?;
    Ok(values)
}

/// Normal Mode: offset against the pool, redistribute the remainder
pub fn liquidate_normal_mode(
    state: &mut LedgerState,
    asset: Address,
    owner: Address,
    debt_in_stability_pool: u128,
) -> Result<LiquidationValues> {
    liquidate_with_offset(
        state,
        asset,
        owner,
        debt_in_stability_pool,
        VesselOperation::LiquidateInNormalMode,
    )
}

/// Recovery Mode liquidation by ICR band.
///
/// Returns zeroed values (vessel untouched) when the vessel is not
/// liquidatable: ICR at or above TCR, or a capped-band vessel the pool
/// cannot fully absorb.
pub fn liquidate_recovery_mode(
    state: &mut LedgerState,
    asset: Address,
    owner: Address,
    icr: u128,
    debt_in_stability_pool: u128,
    tcr: u128,
    price: u128,
) -> Result<LiquidationValues> {
    if state.vessels.owner_count(&asset) <= 1 {
        return Ok(LiquidationValues::default());
    }
    let params = state.config.params(&asset)?.clone();
    let operation = VesselOperation::LiquidateInRecoveryMode;

    if icr < ONE_HUNDRED_PCT {
        // Underwater: pure redistribution
        liquidate_with_offset(state, asset, owner, 0, operation)
    } else if icr < params.mcr {
        liquidate_with_offset(state, asset, owner, debt_in_stability_pool, operation)
    } else if icr < tcr {
        let entire = state.vessels.entire_debt_and_coll(&asset, &owner)?;
        if entire.debt > debt_in_stability_pool {
            return Ok(LiquidationValues::default());
        }
        let (debt, coll) = take_vessel(state, asset, owner)?;
        let values = get_capped_offset_vals(&params, debt, coll, price)?;
        close_liquidated(state, asset, owner, &values, operation)?;
        if values.coll_surplus > 0 {
            let caller = state.roles.vessel_manager_operations;
            state.coll_surplus.account_surplus(
                caller,
                asset,
                owner,
                values.coll_surplus,
                &mut state.events,
            )?;
        }
        Ok(values)
    } else {
        Ok(LiquidationValues::default())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SEQUENCES
// ═══════════════════════════════════════════════════════════════════════════════

/// Tracks the system while a Recovery Mode sequence runs
struct RecoveryTracker {
    remaining_in_sp: u128,
    entire_system_debt: u128,
    entire_system_coll: u128,
    back_to_normal_mode: bool,
}

impl RecoveryTracker {
    fn new(state: &LedgerState, asset: &Address) -> Result<Self> {
        Ok(Self {
            remaining_in_sp: state.stability_pool.total_deposits(),
            entire_system_debt: state.vessels.entire_system_debt(asset, &state.pools)?,
            entire_system_coll: state.vessels.entire_system_coll(asset, &state.pools)?,
            back_to_normal_mode: false,
        })
    }

    fn tcr(&self, price: u128) -> Result<u128> {
        compute_cr(self.entire_system_coll, self.entire_system_debt, price)
    }

    fn record(&mut self, values: &LiquidationValues, price: u128, ccr: u128) -> Result<()> {
        self.remaining_in_sp = safe_sub(self.remaining_in_sp, values.debt_to_offset)?;
        self.entire_system_debt = safe_sub(self.entire_system_debt, values.debt_to_offset)?;
        let leaving = safe_add(
            safe_add(values.coll_to_send_to_sp, values.coll_gas_compensation)?,
            values.coll_surplus,
        )?;
        self.entire_system_coll = safe_sub(self.entire_system_coll, leaving)?;
        self.back_to_normal_mode = !check_potential_recovery_mode(
            self.entire_system_coll,
            self.entire_system_debt,
            price,
            ccr,
        )?;
        Ok(())
    }
}

/// Liquidate the riskiest vessels, up to `n`, starting from the tail
pub fn totals_from_sequence(
    state: &mut LedgerState,
    asset: Address,
    price: u128,
    n: usize,
    recovery_mode: bool,
) -> Result<LiquidationTotals> {
    let params = state.config.params(&asset)?.clone();
    let mut totals = LiquidationTotals::default();

    if !recovery_mode {
        let mut remaining_in_sp = state.stability_pool.total_deposits();
        for _ in 0..n {
            if state.vessels.owner_count(&asset) <= 1 {
                break;
            }
            let owner = match state.sorted.get_last(&asset) {
                Some(owner) => owner,
                None => break,
            };
            let icr = state.vessels.current_icr(&asset, &owner, price)?;
            if icr >= params.mcr {
                break;
            }
            let values = liquidate_normal_mode(state, asset, owner, remaining_in_sp)?;
            remaining_in_sp = safe_sub(remaining_in_sp, values.debt_to_offset)?;
            totals.add(owner, &values)?;
        }
        return Ok(totals);
    }

    let mut tracker = RecoveryTracker::new(state, &asset)?;
    let first = state.sorted.get_first(&asset);
    let mut cursor = state.sorted.get_last(&asset);
    let mut i = 0;

    while let Some(owner) = cursor {
        if i >= n || Some(owner) == first {
            break;
        }
        i += 1;
        // The current vessel is likely to be removed
        let next = state.sorted.get_prev(&asset, &owner);
        let icr = state.vessels.current_icr(&asset, &owner, price)?;

        if !tracker.back_to_normal_mode {
            if icr >= params.mcr && tracker.remaining_in_sp == 0 {
                break;
            }
            let tcr = tracker.tcr(price)?;
            let values = liquidate_recovery_mode(
                state,
                asset,
                owner,
                icr,
                tracker.remaining_in_sp,
                tcr,
                price,
            )?;
            if values.entire_vessel_debt > 0 {
                tracker.record(&values, price, params.ccr)?;
                totals.add(owner, &values)?;
            }
        } else if icr < params.mcr {
            if state.vessels.owner_count(&asset) <= 1 {
                break;
            }
            let values = liquidate_normal_mode(state, asset, owner, tracker.remaining_in_sp)?;
            tracker.remaining_in_sp = safe_sub(tracker.remaining_in_sp, values.debt_to_offset)?;
            totals.add(owner, &values)?;
        } else {
            break;
        }
        cursor = next;
    }
    Ok(totals)
}

/// Liquidate an explicit list; duplicates and inactive vessels are skipped
pub fn totals_from_batch(
    state: &mut LedgerState,
    asset: Address,
    price: u128,
    owners: &[Address],
    recovery_mode: bool,
) -> Result<LiquidationTotals> {
    let params = state.config.params(&asset)?.clone();
    let mut totals = LiquidationTotals::default();

    if !recovery_mode {
        let mut remaining_in_sp = state.stability_pool.total_deposits();
        for &owner in owners {
            if !state.vessels.status(&asset, &owner).is_active()
                || state.vessels.owner_count(&asset) <= 1
            {
                continue;
            }
            let icr = state.vessels.current_icr(&asset, &owner, price)?;
            if icr < params.mcr {
                let values = liquidate_normal_mode(state, asset, owner, remaining_in_sp)?;
                remaining_in_sp = safe_sub(remaining_in_sp, values.debt_to_offset)?;
                totals.add(owner, &values)?;
            }
        }
        return Ok(totals);
    }

    let mut tracker = RecoveryTracker::new(state, &asset)?;
    for &owner in owners {
        if !state.vessels.status(&asset, &owner).is_active() {
            continue;
        }
        let icr = state.vessels.current_icr(&asset, &owner, price)?;

        if !tracker.back_to_normal_mode {
            if icr >= params.mcr && tracker.remaining_in_sp == 0 {
                continue;
            }
            let tcr = tracker.tcr(price)?;
            let values = liquidate_recovery_mode(
                state,
                asset,
                owner,
                icr,
                tracker.remaining_in_sp,
                tcr,
                price,
            )?;
            if values.entire_vessel_debt > 0 {
                tracker.record(&values, price, params.ccr)?;
                totals.add(owner, &values)?;
            }
        } else if icr < params.mcr && state.vessels.owner_count(&asset) > 1 {
            let values = liquidate_normal_mode(state, asset, owner, tracker.remaining_in_sp)?;
            tracker.remaining_in_sp = safe_sub(tracker.remaining_in_sp, values.debt_to_offset)?;
            totals.add(owner, &values)?;
        }
    }
    Ok(totals)
}

/// Whether `asset` is in Recovery Mode at `price` for `state`
pub fn recovery_mode_at(state: &LedgerState, asset: &Address, price: u128) -> Result<bool> {
    check_recovery_mode(asset, price, &state.config, &state.vessels, &state.pools)
}

// ═══════════════════════════════════════════════════════════════════════════════
// FINALIZATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Move the accumulated totals between pools and pay the liquidator
pub fn finalize_liquidation(
    state: &mut LedgerState,
    asset: Address,
    price: u128,
    recovery_mode_at_start: bool,
    totals: LiquidationTotals,
    liquidator: Address,
) -> Result<LiquidationOutcome> {
    let operator = state.roles.vessel_manager_operations;

    state.stability_pool.offset(
        operator,
        asset,
        totals.total_debt_to_offset,
        totals.total_coll_to_send_to_sp,
        &mut state.debt_token,
        &mut state.pools,
        &mut state.events,
    )?;

    if totals.total_debt_to_redistribute > 0 {
        state.vessels.redistribute_debt_and_coll(
            asset,
            totals.total_debt_to_redistribute,
            totals.total_coll_to_redistribute,
            &mut state.pools,
        )?;
        let ledger = state.vessels.ledger(&asset);
        state.events.push(ProtocolEvent::LTermsUpdated {
            asset,
            l_coll: ledger.l_coll,
            l_debt: ledger.l_debt,
        });
    }

    if totals.total_coll_surplus > 0 {
        state.pools.send_asset(
            asset,
            PoolId::Active,
            PoolId::CollSurplus,
            totals.total_coll_surplus,
        )?;
    }

    state.vessels.update_system_snapshots_exclude_coll_remainder(
        asset,
        totals.total_coll_gas_compensation,
        &state.pools,
    )?;
    let ledger = state.vessels.ledger(&asset);
    state.events.push(ProtocolEvent::TotalStakesUpdated {
        asset,
        total_stakes: ledger.total_stakes,
    });
    state.events.push(ProtocolEvent::SystemSnapshotsUpdated {
        asset,
        total_stakes_snapshot: ledger.total_stakes_snapshot,
        total_collateral_snapshot: ledger.total_collateral_snapshot,
    });

    let liquidated_debt = totals.total_debt_in_sequence;
    let liquidated_coll = safe_sub(
        safe_sub(totals.total_coll_in_sequence, totals.total_coll_gas_compensation)?,
        totals.total_coll_surplus,
    )?;
    state.events.push(ProtocolEvent::Liquidation {
        asset,
        liquidated_debt,
        liquidated_coll,
        coll_gas_compensation: totals.total_coll_gas_compensation,
        debt_token_gas_compensation: totals.total_debt_token_gas_compensation,
    });

    if totals.total_debt_token_gas_compensation > 0 {
        state.debt_token.transfer(
            state.roles.gas_pool,
            liquidator,
            totals.total_debt_token_gas_compensation,
        )?;
    }
    if totals.total_coll_gas_compensation > 0 {
        state.pools.send_asset(
            asset,
            PoolId::Active,
            PoolId::Account(liquidator),
            totals.total_coll_gas_compensation,
        )?;
    }

    info!(
        %asset,
        %liquidator,
        vessels = totals.liquidated.len(),
        debt = %format_wad(liquidated_debt),
        coll = %format_wad(liquidated_coll),
        offset = %format_wad(totals.total_debt_to_offset),
        redistributed = %format_wad(totals.total_debt_to_redistribute),
        recovery_mode = recovery_mode_at_start,
        "liquidation finalized"
    );

    Ok(LiquidationOutcome {
        asset,
        price,
        recovery_mode_at_start,
        liquidated_debt,
        liquidated_coll,
        coll_gas_compensation: totals.total_coll_gas_compensation,
        debt_token_gas_compensation: totals.total_debt_token_gas_compensation,
        liquidated: totals.liquidated,
    })
}
