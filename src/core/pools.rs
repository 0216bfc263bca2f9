//! Collateral custody and debt-token ledgers.
//!
//! The core never holds tokens itself. It calls these two seams to move
//! collateral between custody buckets and to mint or burn debt tokens.
//! Both ledgers are plain data so the orchestrator can clone them into a
//! draft and commit atomically.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::error::{Error, Result};
use crate::utils::math::{safe_add, safe_sub};

// ═══════════════════════════════════════════════════════════════════════════════
// DEBT TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// Debt token operations the core relies on
pub trait DebtToken {
    /// Mint `amount` to `account`
    fn mint(&mut self, account: Address, amount: u128) -> Result<()>;
    /// Burn `amount` from `account`
    fn burn(&mut self, account: Address, amount: u128) -> Result<()>;
    /// Move `amount` between accounts
    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()>;
    /// Balance of `account`
    fn balance_of(&self, account: &Address) -> u128;
    /// Outstanding supply
    fn total_supply(&self) -> u128;
}

/// In-memory debt token
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebtTokenLedger {
    balances: BTreeMap<Address, u128>,
    total_supply: u128,
}

impl DebtTokenLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn debit(&mut self, account: Address, amount: u128) -> Result<()> {
        let available = self.balance_of(&account);
        if available < amount {
            return Err(Error::InsufficientBalance {
                account,
                required: amount,
                available,
            });
        }
        let remaining = available - amount;
        if remaining == 0 {
            self.balances.remove(&account);
        } else {
            self.balances.insert(account, remaining);
        }
        Ok(())
    }

    fn credit(&mut self, account: Address, amount: u128) -> Result<()> {
        let balance = safe_add(self.balance_of(&account), amount)?;
        if balance > 0 {
            self.balances.insert(account, balance);
        }
        Ok(())
    }
}

impl DebtToken for DebtTokenLedger {
    fn mint(&mut self, account: Address, amount: u128) -> Result<()> {
        self.total_supply = safe_add(self.total_supply, amount)?;
        self.credit(account, amount)?;
        trace!(%account, amount, "debt token minted");
        Ok(())
    }

    fn burn(&mut self, account: Address, amount: u128) -> Result<()> {
        self.debit(account, amount)?;
        self.total_supply = safe_sub(self.total_supply, amount)?;
        trace!(%account, amount, "debt token burned");
        Ok(())
    }

    fn transfer(&mut self, from: Address, to: Address, amount: u128) -> Result<()> {
        if from == to {
            return Ok(());
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }

    fn balance_of(&self, account: &Address) -> u128 {
        self.balances.get(account).copied().unwrap_or(0)
    }

    fn total_supply(&self) -> u128 {
        self.total_supply
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL CUSTODY
// ═══════════════════════════════════════════════════════════════════════════════

/// Where a unit of collateral currently sits
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum PoolId {
    /// Backing active vessels
    Active,
    /// Pending redistribution rewards
    Default,
    /// Liquidation gains owed to depositors
    StabilityPool,
    /// Escrowed surplus owed to former vessel owners
    CollSurplus,
    /// Paid out to an external account
    Account(Address),
}

/// Pools that carry debt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DebtPool {
    /// Debt of active vessels
    Active,
    /// Redistributed debt not yet applied to vessels
    Default,
}

/// Collateral and debt bookkeeping of the active/default pools
pub trait CollateralCustody {
    /// Collateral held in `pool`
    fn balance(&self, asset: &Address, pool: PoolId) -> u128;
    /// Bring new collateral into `pool` from outside the system
    fn receive(&mut self, asset: Address, pool: PoolId, amount: u128) -> Result<()>;
    /// Move collateral between pools
    fn send_asset(&mut self, asset: Address, from: PoolId, to: PoolId, amount: u128) -> Result<()>;
    /// Debt recorded against a pool
    fn debt(&self, asset: &Address, pool: DebtPool) -> u128;
    /// Increase recorded debt
    fn increase_debt(&mut self, asset: Address, pool: DebtPool, amount: u128) -> Result<()>;
    /// Decrease recorded debt
    fn decrease_debt(&mut self, asset: Address, pool: DebtPool, amount: u128) -> Result<()>;
}

/// In-memory custody ledger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolLedger {
    coll: BTreeMap<(Address, PoolId), u128>,
    active_debt: BTreeMap<Address, u128>,
    default_debt: BTreeMap<Address, u128>,
    received: BTreeMap<Address, u128>,
}

impl PoolLedger {
    /// Create an empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Total collateral ever brought into the system for `asset`
    pub fn total_received(&self, asset: &Address) -> u128 {
        self.received.get(asset).copied().unwrap_or(0)
    }

    /// Sum over every bucket (pools and paid-out accounts) for `asset`
    pub fn total_tracked(&self, asset: &Address) -> u128 {
        self.coll
            .iter()
            .filter(|((a, _), _)| a == asset)
            .fold(0u128, |acc, (_, v)| acc.saturating_add(*v))
    }

    fn debt_map(&mut self, pool: DebtPool) -> &mut BTreeMap<Address, u128> {
        match pool {
            DebtPool::Active => &mut self.active_debt,
            DebtPool::Default => &mut self.default_debt,
        }
    }
}

impl CollateralCustody for PoolLedger {
    fn balance(&self, asset: &Address, pool: PoolId) -> u128 {
        self.coll.get(&(*asset, pool)).copied().unwrap_or(0)
    }

    fn receive(&mut self, asset: Address, pool: PoolId, amount: u128) -> Result<()> {
        let balance = safe_add(self.balance(&asset, pool), amount)?;
        self.coll.insert((asset, pool), balance);
        let received = safe_add(self.total_received(&asset), amount)?;
        self.received.insert(asset, received);
        Ok(())
    }

    fn send_asset(&mut self, asset: Address, from: PoolId, to: PoolId, amount: u128) -> Result<()> {
        if amount == 0 || from == to {
            return Ok(());
        }
        let available = self.balance(&asset, from);
        let remaining = available.checked_sub(amount).ok_or_else(|| {
            Error::Internal(format!(
                "pool {:?} holds {} of {}, cannot send {}",
                from, available, asset, amount
            ))
        })?;
        self.coll.insert((asset, from), remaining);
        let credited = safe_add(self.balance(&asset, to), amount)?;
        self.coll.insert((asset, to), credited);
        trace!(%asset, ?from, ?to, amount, "collateral moved");
        Ok(())
    }

    fn debt(&self, asset: &Address, pool: DebtPool) -> u128 {
        let map = match pool {
            DebtPool::Active => &self.active_debt,
            DebtPool::Default => &self.default_debt,
        };
        map.get(asset).copied().unwrap_or(0)
    }

    fn increase_debt(&mut self, asset: Address, pool: DebtPool, amount: u128) -> Result<()> {
        let updated = safe_add(self.debt(&asset, pool), amount)?;
        self.debt_map(pool).insert(asset, updated);
        Ok(())
    }

    fn decrease_debt(&mut self, asset: Address, pool: DebtPool, amount: u128) -> Result<()> {
        let updated = safe_sub(self.debt(&asset, pool), amount)?;
        self.debt_map(pool).insert(asset, updated);
        Ok(())
    }
}
