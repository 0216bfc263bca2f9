//! Vessel (collateralized debt position) data types.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::utils::math::{compute_cr, compute_nominal_cr};

// ═══════════════════════════════════════════════════════════════════════════════
// VESSEL STATUS
// ═══════════════════════════════════════════════════════════════════════════════

/// Lifecycle status of a vessel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum VesselStatus {
    /// Never opened
    #[default]
    NonExistent,
    /// Open and carrying debt
    Active,
    /// Closed by its owner after repaying
    ClosedByOwner,
    /// Closed by a liquidation
    ClosedByLiquidation,
    /// Closed by a full redemption
    ClosedByRedemption,
}

impl VesselStatus {
    /// Check if the vessel is active
    pub fn is_active(&self) -> bool {
        matches!(self, VesselStatus::Active)
    }

    /// Check if the vessel was closed one way or another
    pub fn is_closed(&self) -> bool {
        matches!(
            self,
            VesselStatus::ClosedByOwner
                | VesselStatus::ClosedByLiquidation
                | VesselStatus::ClosedByRedemption
        )
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// VESSEL
// ═══════════════════════════════════════════════════════════════════════════════

/// Vessels are keyed by `(asset, owner)`
pub type VesselKey = (Address, Address);

/// Redistribution accumulators seen at the vessel's last touch
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardSnapshot {
    /// L_Coll at last touch
    pub coll: u128,
    /// L_Debt at last touch
    pub debt: u128,
}

/// A borrower's position for one collateral asset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Vessel {
    /// Owner
    pub owner: Address,
    /// Collateral asset
    pub asset: Address,
    /// Recorded debt (excluding pending rewards), gas compensation included
    pub debt: u128,
    /// Recorded collateral (excluding pending rewards)
    pub coll: u128,
    /// Share of redistribution rewards
    pub stake: u128,
    /// Lifecycle status
    pub status: VesselStatus,
    /// Position in the per-asset owners array
    pub array_index: usize,
    /// Reward snapshot
    pub snapshot: RewardSnapshot,
}

impl Vessel {
    /// An empty record for `(asset, owner)`
    pub fn new(asset: Address, owner: Address) -> Self {
        Self {
            owner,
            asset,
            ..Self::default()
        }
    }

    /// Collateral ratio at `price` using recorded amounts only
    pub fn recorded_icr(&self, price: u128) -> Result<u128> {
        compute_cr(self.coll, self.debt, price)
    }

    /// Nominal ratio using recorded amounts only
    pub fn recorded_nicr(&self) -> Result<u128> {
        compute_nominal_cr(self.coll, self.debt)
    }
}

/// A vessel's debt and collateral with pending rewards folded in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntireDebtAndColl {
    /// Recorded plus pending debt
    pub debt: u128,
    /// Recorded plus pending collateral
    pub coll: u128,
    /// Pending debt reward
    pub pending_debt_reward: u128,
    /// Pending collateral reward
    pub pending_coll_reward: u128,
}
