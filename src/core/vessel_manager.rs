//! Position ledger and redistribution accumulators.
//!
//! The manager owns every vessel plus one [`AssetLedger`] per collateral.
//! Redistributed debt and collateral are never pushed to vessels eagerly:
//! they accrue in `L_Coll`/`L_Debt` and each vessel catches up through
//! [`VesselManager::apply_pending_rewards`] before it is read or changed.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::core::pools::{CollateralCustody, DebtPool, PoolId};
use crate::core::roles::ProtocolRoles;
use crate::core::sorted_vessels::{NominalIcrSource, SortedVessels};
use crate::core::vessel::{EntireDebtAndColl, RewardSnapshot, Vessel, VesselKey, VesselStatus};
use crate::error::{Error, Result};
use crate::utils::constants::DECIMAL_PRECISION;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// ASSET LEDGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Per-collateral accumulators and snapshots
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssetLedger {
    /// Sum of stakes of active vessels
    pub total_stakes: u128,
    /// `total_stakes` right after the last liquidation
    pub total_stakes_snapshot: u128,
    /// System collateral right after the last liquidation
    pub total_collateral_snapshot: u128,
    /// Collateral reward per unit staked
    pub l_coll: u128,
    /// Debt reward per unit staked
    pub l_debt: u128,
    /// Remainder carried into the next collateral redistribution
    pub last_coll_error_redistribution: u128,
    /// Remainder carried into the next debt redistribution
    pub last_debt_error_redistribution: u128,
    /// Redemption base rate (1e18 = 100%)
    pub base_rate: u128,
    /// Timestamp of the last base-rate bookkeeping
    pub last_fee_operation_time: u64,
    /// Owners of active vessels
    pub owners: Vec<Address>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VESSEL MANAGER
// ═══════════════════════════════════════════════════════════════════════════════

/// Owns all vessels and redistribution state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VesselManager {
    roles: ProtocolRoles,
    vessels: BTreeMap<VesselKey, Vessel>,
    ledgers: BTreeMap<Address, AssetLedger>,
}

impl VesselManager {
    /// Create an empty manager
    pub fn new(roles: ProtocolRoles) -> Self {
        Self {
            roles,
            vessels: BTreeMap::new(),
            ledgers: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LOOKUPS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Vessel record, if one was ever opened
    pub fn vessel(&self, asset: &Address, owner: &Address) -> Option<&Vessel> {
        self.vessels.get(&(*asset, *owner))
    }

    /// Status of a vessel (`NonExistent` if never opened)
    pub fn status(&self, asset: &Address, owner: &Address) -> VesselStatus {
        self.vessel(asset, owner)
            .map(|v| v.status)
            .unwrap_or_default()
    }

    /// Vessel that must be active
    pub fn require_active(&self, asset: &Address, owner: &Address) -> Result<&Vessel> {
        match self.vessel(asset, owner) {
            Some(v) if v.status.is_active() => Ok(v),
            Some(_) => Err(Error::VesselNotActive {
                asset: *asset,
                owner: *owner,
            }),
            None => Err(Error::VesselNotFound {
                asset: *asset,
                owner: *owner,
            }),
        }
    }

    fn require_active_mut(&mut self, asset: &Address, owner: &Address) -> Result<&mut Vessel> {
        self.require_active(asset, owner)?;
        self.vessels
            .get_mut(&(*asset, *owner))
            .ok_or(Error::VesselNotFound {
                asset: *asset,
                owner: *owner,
            })
    }

    /// Accumulators for `asset` (zeroed if untouched)
    pub fn ledger(&self, asset: &Address) -> AssetLedger {
        self.ledgers.get(asset).cloned().unwrap_or_default()
    }

    pub(crate) fn ledger_mut(&mut self, asset: Address) -> &mut AssetLedger {
        self.ledgers.entry(asset).or_default()
    }

    /// Owners of active vessels for `asset`
    pub fn owners(&self, asset: &Address) -> &[Address] {
        self.ledgers
            .get(asset)
            .map(|l| l.owners.as_slice())
            .unwrap_or(&[])
    }

    /// Number of active vessels for `asset`
    pub fn owner_count(&self, asset: &Address) -> usize {
        self.owners(asset).len()
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PENDING REWARDS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral reward accrued since the vessel's last snapshot
    pub fn pending_coll_reward(&self, asset: &Address, owner: &Address) -> Result<u128> {
        let vessel = match self.vessel(asset, owner) {
            Some(v) if v.status.is_active() => v,
            _ => return Ok(0),
        };
        let l_coll = self.ledgers.get(asset).map(|l| l.l_coll).unwrap_or(0);
        let per_unit = safe_sub(l_coll, vessel.snapshot.coll)?;
        if per_unit == 0 {
            return Ok(0);
        }
        mul_div(vessel.stake, per_unit, DECIMAL_PRECISION)
    }

    /// Debt reward accrued since the vessel's last snapshot
    pub fn pending_debt_reward(&self, asset: &Address, owner: &Address) -> Result<u128> {
        let vessel = match self.vessel(asset, owner) {
            Some(v) if v.status.is_active() => v,
            _ => return Ok(0),
        };
        let l_debt = self.ledgers.get(asset).map(|l| l.l_debt).unwrap_or(0);
        let per_unit = safe_sub(l_debt, vessel.snapshot.debt)?;
        if per_unit == 0 {
            return Ok(0);
        }
        mul_div(vessel.stake, per_unit, DECIMAL_PRECISION)
    }

    /// Whether the vessel has unapplied redistribution rewards
    pub fn has_pending_rewards(&self, asset: &Address, owner: &Address) -> bool {
        match self.vessel(asset, owner) {
            Some(v) if v.status.is_active() => {
                v.snapshot.coll < self.ledgers.get(asset).map(|l| l.l_coll).unwrap_or(0)
            }
            _ => false,
        }
    }

    /// Recorded debt and collateral plus pending rewards
    pub fn entire_debt_and_coll(&self, asset: &Address, owner: &Address) -> Result<EntireDebtAndColl> {
        let (debt, coll) = self
            .vessel(asset, owner)
            .map(|v| (v.debt, v.coll))
            .unwrap_or((0, 0));
        let pending_debt_reward = self.pending_debt_reward(asset, owner)?;
        let pending_coll_reward = self.pending_coll_reward(asset, owner)?;
        Ok(EntireDebtAndColl {
            debt: safe_add(debt, pending_debt_reward)?,
            coll: safe_add(coll, pending_coll_reward)?,
            pending_debt_reward,
            pending_coll_reward,
        })
    }

    /// Current ICR including pending rewards
    pub fn current_icr(&self, asset: &Address, owner: &Address, price: u128) -> Result<u128> {
        let entire = self.entire_debt_and_coll(asset, owner)?;
        compute_cr(entire.coll, entire.debt, price)
    }

    /// Fold pending rewards into the vessel and move them to the active pool.
    ///
    /// A no-op for vessels without pending rewards, so calling it twice
    /// changes nothing the second time.
    pub fn apply_pending_rewards(
        &mut self,
        asset: Address,
        owner: Address,
        pools: &mut impl CollateralCustody,
    ) -> Result<()> {
        if !self.has_pending_rewards(&asset, &owner) {
            return Ok(());
        }
        let pending_coll = self.pending_coll_reward(&asset, &owner)?;
        let pending_debt = self.pending_debt_reward(&asset, &owner)?;

        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.coll = safe_add(vessel.coll, pending_coll)?;
        vessel.debt = safe_add(vessel.debt, pending_debt)?;
        self.update_reward_snapshots(asset, owner)?;

        pools.decrease_debt(asset, DebtPool::Default, pending_debt)?;
        pools.increase_debt(asset, DebtPool::Active, pending_debt)?;
        pools.send_asset(asset, PoolId::Default, PoolId::Active, pending_coll)?;

        debug!(
            %asset, %owner,
            coll = %format_wad(pending_coll),
            debt = %format_wad(pending_debt),
            "pending rewards applied"
        );
        Ok(())
    }

    /// Snapshot the current accumulators into the vessel
    pub fn update_reward_snapshots(&mut self, asset: Address, owner: Address) -> Result<()> {
        let ledger = self.ledger(&asset);
        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.snapshot = RewardSnapshot {
            coll: ledger.l_coll,
            debt: ledger.l_debt,
        };
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDISTRIBUTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Spread `debt` and `coll` over all stakes and move them to the default pool.
    ///
    /// The remainder of each integer division is carried into the next call.
    pub fn redistribute_debt_and_coll(
        &mut self,
        asset: Address,
        debt: u128,
        coll: u128,
        pools: &mut impl CollateralCustody,
    ) -> Result<()> {
        if debt == 0 {
            return Ok(());
        }
        let ledger = self.ledger_mut(asset);
        if ledger.total_stakes == 0 {
            warn!(%asset, debt = %format_wad(debt), "redistribution skipped: no stakes");
            return Ok(());
        }

        let total_stakes = wide(ledger.total_stakes);
        let coll_numerator =
            wide(coll) * wide(DECIMAL_PRECISION) + wide(ledger.last_coll_error_redistribution);
        let debt_numerator =
            wide(debt) * wide(DECIMAL_PRECISION) + wide(ledger.last_debt_error_redistribution);

        let coll_per_unit = coll_numerator / total_stakes;
        let debt_per_unit = debt_numerator / total_stakes;

        // Remainders are below total_stakes and fit
        ledger.last_coll_error_redistribution = narrow(
            coll_numerator - coll_per_unit * total_stakes,
            "coll redistribution error",
        )?;
        ledger.last_debt_error_redistribution = narrow(
            debt_numerator - debt_per_unit * total_stakes,
            "debt redistribution error",
        )?;

        ledger.l_coll = safe_add(ledger.l_coll, narrow(coll_per_unit, "L_Coll increment")?)?;
        ledger.l_debt = safe_add(ledger.l_debt, narrow(debt_per_unit, "L_Debt increment")?)?;

        pools.decrease_debt(asset, DebtPool::Active, debt)?;
        pools.increase_debt(asset, DebtPool::Default, debt)?;
        pools.send_asset(asset, PoolId::Active, PoolId::Default, coll)?;

        debug!(
            %asset,
            debt = %format_wad(debt),
            coll = %format_wad(coll),
            l_coll = ledger.l_coll,
            l_debt = ledger.l_debt,
            "debt and collateral redistributed"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // STAKES & SNAPSHOTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Stake for a vessel holding `coll`, corrected for past liquidations
    pub fn compute_new_stake(&self, asset: &Address, coll: u128) -> Result<u128> {
        let ledger = self.ledgers.get(asset).cloned().unwrap_or_default();
        if ledger.total_collateral_snapshot == 0 {
            return Ok(coll);
        }
        if ledger.total_stakes_snapshot == 0 {
            return Err(Error::Internal(
                "total stakes snapshot is zero while collateral snapshot is not".into(),
            ));
        }
        mul_div(
            coll,
            ledger.total_stakes_snapshot,
            ledger.total_collateral_snapshot,
        )
    }

    /// Recompute the vessel's stake from its collateral
    pub fn update_stake_and_total_stakes(&mut self, asset: Address, owner: Address) -> Result<u128> {
        let coll = self.require_active(&asset, &owner)?.coll;
        let new_stake = self.compute_new_stake(&asset, coll)?;

        let vessel = self.require_active_mut(&asset, &owner)?;
        let old_stake = vessel.stake;
        vessel.stake = new_stake;

        let ledger = self.ledger_mut(asset);
        ledger.total_stakes = safe_add(safe_sub(ledger.total_stakes, old_stake)?, new_stake)?;
        Ok(new_stake)
    }

    /// Drop the vessel's stake from the total
    pub fn remove_stake(&mut self, asset: Address, owner: Address) -> Result<()> {
        let vessel = self.require_active_mut(&asset, &owner)?;
        let stake = std::mem::take(&mut vessel.stake);
        let ledger = self.ledger_mut(asset);
        ledger.total_stakes = safe_sub(ledger.total_stakes, stake)?;
        Ok(())
    }

    /// Snapshot stakes and collateral after a liquidation.
    ///
    /// `coll_remainder` is collateral still in the active pool that is about
    /// to leave the system (gas compensation).
    pub fn update_system_snapshots_exclude_coll_remainder(
        &mut self,
        asset: Address,
        coll_remainder: u128,
        pools: &impl CollateralCustody,
    ) -> Result<()> {
        let active_coll = pools.balance(&asset, PoolId::Active);
        let liquidated_coll = pools.balance(&asset, PoolId::Default);
        let ledger = self.ledger_mut(asset);
        ledger.total_stakes_snapshot = ledger.total_stakes;
        ledger.total_collateral_snapshot =
            safe_add(safe_sub(active_coll, coll_remainder)?, liquidated_coll)?;
        debug!(
            %asset,
            total_stakes_snapshot = ledger.total_stakes_snapshot,
            total_collateral_snapshot = ledger.total_collateral_snapshot,
            "system snapshots updated"
        );
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // VESSEL LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Activate a vessel with its initial amounts and append it to the owners array
    pub fn open_vessel(
        &mut self,
        asset: Address,
        owner: Address,
        coll: u128,
        debt: u128,
    ) -> Result<()> {
        if self.status(&asset, &owner).is_active() {
            return Err(Error::VesselAlreadyExists { asset, owner });
        }
        let index = self.owner_count(&asset);
        let vessel = Vessel {
            owner,
            asset,
            debt,
            coll,
            stake: 0,
            status: VesselStatus::Active,
            array_index: index,
            snapshot: RewardSnapshot::default(),
        };
        self.vessels.insert((asset, owner), vessel);
        self.ledger_mut(asset).owners.push(owner);
        self.update_reward_snapshots(asset, owner)?;
        Ok(())
    }

    /// Add collateral to a vessel
    pub fn increase_coll(&mut self, asset: Address, owner: Address, amount: u128) -> Result<u128> {
        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.coll = safe_add(vessel.coll, amount)?;
        Ok(vessel.coll)
    }

    /// Remove collateral from a vessel
    pub fn decrease_coll(&mut self, asset: Address, owner: Address, amount: u128) -> Result<u128> {
        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.coll = safe_sub(vessel.coll, amount)?;
        Ok(vessel.coll)
    }

    /// Add debt to a vessel
    pub fn increase_debt(&mut self, asset: Address, owner: Address, amount: u128) -> Result<u128> {
        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.debt = safe_add(vessel.debt, amount)?;
        Ok(vessel.debt)
    }

    /// Remove debt from a vessel
    pub fn decrease_debt(&mut self, asset: Address, owner: Address, amount: u128) -> Result<u128> {
        let vessel = self.require_active_mut(&asset, &owner)?;
        vessel.debt = safe_sub(vessel.debt, amount)?;
        Ok(vessel.debt)
    }

    /// Close a vessel: zero it, drop it from the owners array and the sorted list.
    ///
    /// Stakes must already have been removed. The last vessel of an asset
    /// can never be closed.
    pub fn close_vessel(
        &mut self,
        asset: Address,
        owner: Address,
        status: VesselStatus,
        sorted: &mut SortedVessels,
    ) -> Result<()> {
        if !status.is_closed() {
            return Err(Error::InvalidParameter {
                name: "status".into(),
                reason: format!("{:?} is not a closing status", status),
            });
        }
        if self.owner_count(&asset) <= 1 || sorted.size(&asset) <= 1 {
            return Err(Error::OnlyOneVesselInSystem(asset));
        }

        let vessel = self.require_active_mut(&asset, &owner)?;
        let index = vessel.array_index;
        vessel.status = status;
        vessel.coll = 0;
        vessel.debt = 0;
        vessel.snapshot = RewardSnapshot::default();

        self.remove_vessel_owner(asset, owner, index)?;
        sorted.remove(self.roles.vessel_manager, asset, owner)
    }

    fn remove_vessel_owner(&mut self, asset: Address, owner: Address, index: usize) -> Result<()> {
        let owners = &mut self.ledger_mut(asset).owners;
        if owners.get(index) != Some(&owner) {
            return Err(Error::Internal(format!(
                "owners array out of sync for {} at index {}",
                owner, index
            )));
        }
        owners.swap_remove(index);
        let moved = owners.get(index).copied();
        if let Some(moved) = moved {
            if let Some(v) = self.vessels.get_mut(&(asset, moved)) {
                v.array_index = index;
            }
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // SYSTEM TOTALS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Collateral in the active and default pools
    pub fn entire_system_coll(&self, asset: &Address, pools: &impl CollateralCustody) -> Result<u128> {
        safe_add(
            pools.balance(asset, PoolId::Active),
            pools.balance(asset, PoolId::Default),
        )
    }

    /// Debt in the active and default pools
    pub fn entire_system_debt(&self, asset: &Address, pools: &impl CollateralCustody) -> Result<u128> {
        safe_add(
            pools.debt(asset, DebtPool::Active),
            pools.debt(asset, DebtPool::Default),
        )
    }
}

impl NominalIcrSource for VesselManager {
    fn nominal_icr(&self, asset: &Address, owner: &Address) -> Result<u128> {
        let entire = self.entire_debt_and_coll(asset, owner)?;
        compute_nominal_cr(entire.coll, entire.debt)
    }
}
