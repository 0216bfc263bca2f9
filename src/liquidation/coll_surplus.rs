//! Collateral surplus left over from capped liquidations and redemptions.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::pools::{CollateralCustody, PoolId};
use crate::core::roles::ProtocolRoles;
use crate::error::{Error, Result};
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::utils::math::{format_wad, safe_add};

/// Claimable collateral per (asset, account)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollSurplusPool {
    roles: ProtocolRoles,
    balances: BTreeMap<(Address, Address), u128>,
}

impl CollSurplusPool {
    /// Create an empty pool
    pub fn new(roles: ProtocolRoles) -> Self {
        Self {
            roles,
            balances: BTreeMap::new(),
        }
    }

    /// Credit `amount` of surplus to `account`.
    ///
    /// The collateral itself must already sit in the surplus custody bucket.
    pub fn account_surplus(
        &mut self,
        caller: Address,
        asset: Address,
        account: Address,
        amount: u128,
        events: &mut EventLog,
    ) -> Result<()> {
        self.roles.require_vm_or_vm_ops(caller)?;
        let balance = self.claimable(&asset, &account);
        let new_balance = safe_add(balance, amount)?;
        self.balances.insert((asset, account), new_balance);
        events.push(ProtocolEvent::CollBalanceUpdated {
            asset,
            account,
            new_balance,
        });
        Ok(())
    }

    /// Pay out the whole surplus of `account`
    pub fn claim_coll(
        &mut self,
        caller: Address,
        asset: Address,
        account: Address,
        pools: &mut impl CollateralCustody,
        events: &mut EventLog,
    ) -> Result<u128> {
        self.roles.require_one_of(
            caller,
            &[self.roles.borrower_operations],
            "borrower operations",
        )?;
        let amount = self.claimable(&asset, &account);
        if amount == 0 {
            return Err(Error::NothingToClaim(account));
        }
        self.balances.remove(&(asset, account));
        events.push(ProtocolEvent::CollBalanceUpdated {
            asset,
            account,
            new_balance: 0,
        });
        pools.send_asset(asset, PoolId::CollSurplus, PoolId::Account(account), amount)?;
        info!(%asset, %account, amount = %format_wad(amount), "surplus collateral claimed");
        Ok(amount)
    }

    /// Surplus claimable by `account`
    pub fn claimable(&self, asset: &Address, account: &Address) -> u128 {
        self.balances.get(&(*asset, *account)).copied().unwrap_or(0)
    }

    /// Sum of all unclaimed surplus for `asset`
    pub fn total_claimable(&self, asset: &Address) -> u128 {
        self.balances
            .iter()
            .filter(|((a, _), _)| a == asset)
            .map(|(_, amount)| *amount)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pools::PoolLedger;

    #[test]
    fn test_account_and_claim() {
        let roles = ProtocolRoles::default();
        let mut pool = CollSurplusPool::new(roles);
        let mut custody = PoolLedger::new();
        let mut events = EventLog::new();
        let asset = Address::repeat_byte(0xee);
        let alice = Address::with_last_byte(1);

        custody.receive(asset, PoolId::CollSurplus, 7).unwrap();
        pool.account_surplus(roles.vessel_manager, asset, alice, 4, &mut events)
            .unwrap();
        pool.account_surplus(roles.vessel_manager_operations, asset, alice, 3, &mut events)
            .unwrap();
        assert_eq!(pool.claimable(&asset, &alice), 7);
        assert_eq!(pool.total_claimable(&asset), 7);

        let paid = pool
            .claim_coll(roles.borrower_operations, asset, alice, &mut custody, &mut events)
            .unwrap();
        assert_eq!(paid, 7);
        assert_eq!(custody.balance(&asset, PoolId::Account(alice)), 7);
        assert_eq!(
            pool.claim_coll(roles.borrower_operations, asset, alice, &mut custody, &mut events)
                .unwrap_err(),
            Error::NothingToClaim(alice)
        );
        assert_eq!(events.filter_by_type("CollBalanceUpdated").len(), 3);
    }

    #[test]
    fn test_role_checks() {
        let roles = ProtocolRoles::default();
        let mut pool = CollSurplusPool::new(roles);
        let mut custody = PoolLedger::new();
        let mut events = EventLog::new();
        let asset = Address::repeat_byte(0xee);
        let alice = Address::with_last_byte(1);

        assert!(pool.account_surplus(alice, asset, alice, 1, &mut events).is_err());
        pool.account_surplus(roles.vessel_manager, asset, alice, 1, &mut events)
            .unwrap();
        assert!(matches!(
            pool.claim_coll(alice, asset, alice, &mut custody, &mut events),
            Err(Error::Unauthorized { .. })
        ));
    }
}
