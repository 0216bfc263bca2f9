//! Privileged caller identities.
//!
//! Components check the `caller` argument of every mutator against this
//! table and fail with [`Error::Unauthorized`] otherwise.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Addresses of every component and admin allowed to mutate shared state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProtocolRoles {
    /// Position-ledger component
    pub vessel_manager: Address,
    /// Borrower entry points (open/adjust/close)
    pub borrower_operations: Address,
    /// Liquidation and redemption orchestrator
    pub vessel_manager_operations: Address,
    /// Stability Pool component
    pub stability_pool: Address,
    /// Gas pool holding debt-token gas compensation
    pub gas_pool: Address,
    /// Default pool (pending redistribution rewards)
    pub default_pool: Address,
    /// Collateral surplus escrow
    pub coll_surplus_pool: Address,
    /// Receives borrowing and redemption fees
    pub fee_collector: Address,
    /// Privileged timelock
    pub timelock: Address,
    /// Deployer / owner
    pub owner: Address,
}

impl Default for ProtocolRoles {
    fn default() -> Self {
        Self {
            vessel_manager: Address::with_last_byte(0xf1),
            borrower_operations: Address::with_last_byte(0xf2),
            vessel_manager_operations: Address::with_last_byte(0xf3),
            stability_pool: Address::with_last_byte(0xf4),
            gas_pool: Address::with_last_byte(0xf5),
            default_pool: Address::with_last_byte(0xf6),
            coll_surplus_pool: Address::with_last_byte(0xf7),
            fee_collector: Address::with_last_byte(0xf8),
            timelock: Address::with_last_byte(0xf9),
            owner: Address::with_last_byte(0xfa),
        }
    }
}

impl ProtocolRoles {
    /// Caller must be one of `allowed`
    pub fn require_one_of(&self, caller: Address, allowed: &[Address], role: &str) -> Result<()> {
        if allowed.contains(&caller) {
            Ok(())
        } else {
            Err(Error::unauthorized(caller, format!("caller is not {}", role)))
        }
    }

    /// Caller must be the vessel manager or borrower operations
    pub fn require_vm_or_borrower_ops(&self, caller: Address) -> Result<()> {
        self.require_one_of(
            caller,
            &[self.vessel_manager, self.borrower_operations],
            "VesselManager or BorrowerOperations",
        )
    }

    /// Caller must be the vessel manager or the liquidation orchestrator
    pub fn require_vm_or_vm_ops(&self, caller: Address) -> Result<()> {
        self.require_one_of(
            caller,
            &[self.vessel_manager, self.vessel_manager_operations],
            "VesselManager or VesselManagerOperations",
        )
    }

    /// Caller must be the timelock
    pub fn require_timelock(&self, caller: Address) -> Result<()> {
        self.require_one_of(caller, &[self.timelock], "Timelock")
    }

    /// Whether an address is one of the protocol's own components
    pub fn is_protocol_address(&self, account: &Address) -> bool {
        [
            self.vessel_manager,
            self.borrower_operations,
            self.vessel_manager_operations,
            self.stability_pool,
            self.gas_pool,
            self.default_pool,
            self.coll_surplus_pool,
        ]
        .contains(account)
    }
}
