//! Stability Pool implementation (Liquity-style, multi-collateral).
//!
//! Depositors lock debt tokens that absorb liquidated debt. In return they
//! receive the liquidated collateral of every asset pro rata, plus a reward
//! token stream.
//!
//! # Accounting
//!
//! Deposits are never touched on offset. Instead the pool tracks:
//! - `P`: running product of `(1 - loss per unit)`; a deposit compounds as
//!   `initial * P / P_snapshot`
//! - `S[asset]`: running sum of collateral gain per unit, scaled by `P`
//! - `G`: the same for the reward token
//!
//! When `P` would drop below [`SCALE_FACTOR`] it is multiplied by it and the
//! scale increments. When a loss empties the pool the epoch increments and
//! every older deposit compounds to zero.

use std::collections::BTreeMap;

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::core::pools::{CollateralCustody, DebtPool, DebtToken, PoolId};
use crate::core::roles::ProtocolRoles;
use crate::error::{Error, Result};
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::utils::constants::*;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// DEPOSITOR SNAPSHOT
// ═══════════════════════════════════════════════════════════════════════════════

/// Pool accumulators seen by a depositor at its last interaction
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositSnapshot {
    /// Collateral sum per asset
    pub s: BTreeMap<Address, U256>,
    /// Product factor
    pub p: u128,
    /// Reward sum
    pub g: U256,
    /// Scale
    pub scale: u128,
    /// Epoch
    pub epoch: u128,
}

/// A depositor's position
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    /// Principal at the last interaction
    pub initial: u128,
    /// Snapshot at the last interaction
    pub snapshot: DepositSnapshot,
}

/// Gains realised by a deposit or withdrawal
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositorGains {
    /// Collateral paid out per asset
    pub collateral: Vec<(Address, u128)>,
    /// Reward tokens paid out
    pub reward: u128,
    /// Principal lost to offsets since the last interaction
    pub debt_token_loss: u128,
    /// Deposit after the operation
    pub new_deposit: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL
// ═══════════════════════════════════════════════════════════════════════════════

/// The Stability Pool
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StabilityPool {
    roles: ProtocolRoles,
    total_deposits: u128,
    p: u128,
    current_scale: u128,
    current_epoch: u128,
    epoch_to_scale_to_sum: BTreeMap<(Address, u128, u128), U256>,
    epoch_to_scale_to_g: BTreeMap<(u128, u128), U256>,
    last_asset_error_offset: BTreeMap<Address, U256>,
    last_debt_loss_error_offset: U256,
    last_reward_error: U256,
    pending_reward_issuance: u128,
    coll_balances: BTreeMap<Address, u128>,
    deposits: BTreeMap<Address, Deposit>,
    reward_paid: BTreeMap<Address, u128>,
}

impl StabilityPool {
    /// Create an empty pool
    pub fn new(roles: ProtocolRoles) -> Self {
        Self {
            roles,
            total_deposits: 0,
            p: DECIMAL_PRECISION,
            current_scale: 0,
            current_epoch: 0,
            epoch_to_scale_to_sum: BTreeMap::new(),
            epoch_to_scale_to_g: BTreeMap::new(),
            last_asset_error_offset: BTreeMap::new(),
            last_debt_loss_error_offset: U256::ZERO,
            last_reward_error: U256::ZERO,
            pending_reward_issuance: 0,
            coll_balances: BTreeMap::new(),
            deposits: BTreeMap::new(),
            reward_paid: BTreeMap::new(),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // DEPOSITS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Deposit `amount` debt tokens, realising pending gains first
    pub fn provide_to_sp(
        &mut self,
        depositor: Address,
        amount: u128,
        token: &mut impl DebtToken,
        pools: &mut impl CollateralCustody,
        events: &mut EventLog,
    ) -> Result<DepositorGains> {
        if amount == 0 {
            return Err(Error::ZeroAmount);
        }
        self.trigger_reward_issuance(events)?;

        let initial = self.initial_deposit(&depositor);
        let collateral = self.depositor_gains(&depositor)?;
        let compounded = self.compounded_deposit(&depositor)?;
        let reward = self.pay_out_reward_gains(depositor, events)?;

        token.transfer(depositor, self.roles.stability_pool, amount)?;
        self.total_deposits = safe_add(self.total_deposits, amount)?;
        events.push(ProtocolEvent::StabilityPoolDebtBalanceUpdated {
            total_deposits: self.total_deposits,
        });

        let new_deposit = safe_add(compounded, amount)?;
        self.update_deposit_and_snapshots(depositor, new_deposit);
        events.push(ProtocolEvent::UserDepositChanged {
            depositor,
            new_deposit,
        });

        let debt_token_loss = safe_sub(initial, compounded)?;
        self.send_gains_to_depositor(depositor, &collateral, debt_token_loss, pools, events)?;
        info!(
            %depositor,
            amount = %format_wad(amount),
            new_deposit = %format_wad(new_deposit),
            "stability pool deposit"
        );
        Ok(DepositorGains {
            collateral,
            reward,
            debt_token_loss,
            new_deposit,
        })
    }

    /// Withdraw up to `amount` debt tokens, realising pending gains first.
    ///
    /// A zero `amount` only claims gains.
    pub fn withdraw_from_sp(
        &mut self,
        depositor: Address,
        amount: u128,
        token: &mut impl DebtToken,
        pools: &mut impl CollateralCustody,
        events: &mut EventLog,
    ) -> Result<DepositorGains> {
        let initial = self.initial_deposit(&depositor);
        if initial == 0 {
            return Err(Error::NoDeposit(depositor));
        }
        self.trigger_reward_issuance(events)?;

        let collateral = self.depositor_gains(&depositor)?;
        let compounded = self.compounded_deposit(&depositor)?;
        let to_withdraw = amount.min(compounded);
        let reward = self.pay_out_reward_gains(depositor, events)?;

        if to_withdraw > 0 {
            token.transfer(self.roles.stability_pool, depositor, to_withdraw)?;
            self.total_deposits = safe_sub(self.total_deposits, to_withdraw)?;
            events.push(ProtocolEvent::StabilityPoolDebtBalanceUpdated {
                total_deposits: self.total_deposits,
            });
        }

        let new_deposit = compounded - to_withdraw;
        self.update_deposit_and_snapshots(depositor, new_deposit);
        events.push(ProtocolEvent::UserDepositChanged {
            depositor,
            new_deposit,
        });

        let debt_token_loss = safe_sub(initial, compounded)?;
        self.send_gains_to_depositor(depositor, &collateral, debt_token_loss, pools, events)?;
        info!(
            %depositor,
            withdrawn = %format_wad(to_withdraw),
            new_deposit = %format_wad(new_deposit),
            "stability pool withdrawal"
        );
        Ok(DepositorGains {
            collateral,
            reward,
            debt_token_loss,
            new_deposit,
        })
    }

    fn update_deposit_and_snapshots(&mut self, depositor: Address, new_value: u128) {
        if new_value == 0 {
            self.deposits.remove(&depositor);
            return;
        }
        let s = self
            .epoch_to_scale_to_sum
            .iter()
            .filter(|((_, e, sc), _)| *e == self.current_epoch && *sc == self.current_scale)
            .map(|((asset, _, _), sum)| (*asset, *sum))
            .collect();
        let snapshot = DepositSnapshot {
            s,
            p: self.p,
            g: self.g_at(self.current_epoch, self.current_scale),
            scale: self.current_scale,
            epoch: self.current_epoch,
        };
        self.deposits.insert(
            depositor,
            Deposit {
                initial: new_value,
                snapshot,
            },
        );
    }

    fn send_gains_to_depositor(
        &mut self,
        depositor: Address,
        gains: &[(Address, u128)],
        debt_token_loss: u128,
        pools: &mut impl CollateralCustody,
        events: &mut EventLog,
    ) -> Result<()> {
        for &(asset, amount) in gains {
            if amount == 0 {
                continue;
            }
            let balance = self.coll_balances.get(&asset).copied().unwrap_or(0);
            self.coll_balances.insert(asset, safe_sub(balance, amount)?);
            pools.send_asset(asset, PoolId::StabilityPool, PoolId::Account(depositor), amount)?;
        }
        events.push(ProtocolEvent::GainsWithdrawn {
            depositor,
            gains: gains.to_vec(),
            debt_token_loss,
        });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REWARD TOKEN
    // ═══════════════════════════════════════════════════════════════════════════

    /// Queue reward tokens to be spread over depositors at the next interaction
    pub fn add_reward_issuance(&mut self, amount: u128) -> Result<()> {
        self.pending_reward_issuance = safe_add(self.pending_reward_issuance, amount)?;
        Ok(())
    }

    /// Fold queued issuance into `G`; kept queued while the pool is empty
    pub fn trigger_reward_issuance(&mut self, events: &mut EventLog) -> Result<()> {
        let issuance = self.pending_reward_issuance;
        if self.total_deposits == 0 || issuance == 0 {
            return Ok(());
        }
        self.pending_reward_issuance = 0;

        let total = wide(self.total_deposits);
        let numerator = wide(issuance) * wide(DECIMAL_PRECISION) + self.last_reward_error;
        let per_unit = numerator / total;
        self.last_reward_error = numerator - per_unit * total;

        let marginal = per_unit * wide(self.p);
        let key = (self.current_epoch, self.current_scale);
        let g = self.g_at(key.0, key.1) + marginal;
        self.epoch_to_scale_to_g.insert(key, g);
        events.push(ProtocolEvent::GainUpdated {
            g,
            epoch: key.0,
            scale: key.1,
        });
        Ok(())
    }

    fn pay_out_reward_gains(&mut self, depositor: Address, events: &mut EventLog) -> Result<u128> {
        let gain = self.depositor_reward_gain(&depositor)?;
        if gain > 0 {
            let paid = self.reward_paid.get(&depositor).copied().unwrap_or(0);
            self.reward_paid.insert(depositor, safe_add(paid, gain)?);
            events.push(ProtocolEvent::RewardPaidToDepositor {
                depositor,
                amount: gain,
            });
        }
        Ok(gain)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION ABSORPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Cancel `debt_to_offset` against deposits and take `coll_to_add` as gains.
    ///
    /// Burns the offset debt from the pool's tokens and moves the collateral
    /// from the active pool. A no-op when either the pool or the debt is zero.
    #[allow(clippy::too_many_arguments)]
    pub fn offset(
        &mut self,
        caller: Address,
        asset: Address,
        debt_to_offset: u128,
        coll_to_add: u128,
        token: &mut impl DebtToken,
        pools: &mut impl CollateralCustody,
        events: &mut EventLog,
    ) -> Result<()> {
        self.roles.require_vm_or_vm_ops(caller)?;
        let total = self.total_deposits;
        if total == 0 || debt_to_offset == 0 {
            return Ok(());
        }
        if debt_to_offset > total {
            return Err(Error::Internal(format!(
                "offset of {} exceeds pool deposits {}",
                debt_to_offset, total
            )));
        }
        self.trigger_reward_issuance(events)?;

        let (coll_gain_per_unit, debt_loss_per_unit) =
            self.compute_rewards_per_unit_staked(asset, coll_to_add, debt_to_offset, total)?;
        self.update_reward_sum_and_product(asset, coll_gain_per_unit, debt_loss_per_unit, events)?;

        pools.decrease_debt(asset, DebtPool::Active, debt_to_offset)?;
        self.total_deposits = total - debt_to_offset;
        events.push(ProtocolEvent::StabilityPoolDebtBalanceUpdated {
            total_deposits: self.total_deposits,
        });
        token.burn(self.roles.stability_pool, debt_to_offset)?;

        pools.send_asset(asset, PoolId::Active, PoolId::StabilityPool, coll_to_add)?;
        let balance = self.coll_balances.get(&asset).copied().unwrap_or(0);
        self.coll_balances.insert(asset, safe_add(balance, coll_to_add)?);

        debug!(
            %asset,
            debt = %format_wad(debt_to_offset),
            coll = %format_wad(coll_to_add),
            p = self.p,
            scale = self.current_scale,
            epoch = self.current_epoch,
            "stability pool offset"
        );
        Ok(())
    }

    fn compute_rewards_per_unit_staked(
        &mut self,
        asset: Address,
        coll_to_add: u128,
        debt_to_offset: u128,
        total_deposits: u128,
    ) -> Result<(U256, u128)> {
        let total = wide(total_deposits);
        let last_error = self
            .last_asset_error_offset
            .get(&asset)
            .copied()
            .unwrap_or(U256::ZERO);
        let coll_numerator = wide(coll_to_add) * wide(DECIMAL_PRECISION) + last_error;

        let debt_loss_per_unit = if debt_to_offset == total_deposits {
            self.last_debt_loss_error_offset = U256::ZERO;
            DECIMAL_PRECISION
        } else {
            // Rounded up so the pool never owes more than it holds
            let debt_loss_numerator = (wide(debt_to_offset) * wide(DECIMAL_PRECISION))
                .checked_sub(self.last_debt_loss_error_offset)
                .ok_or_else(|| Error::Underflow {
                    operation: "debt loss numerator".into(),
                })?;
            let per_unit = debt_loss_numerator / total + U256::from(1u8);
            self.last_debt_loss_error_offset = per_unit * total - debt_loss_numerator;
            narrow(per_unit, "debt loss per unit")?
        };

        let coll_gain_per_unit = coll_numerator / total;
        self.last_asset_error_offset
            .insert(asset, coll_numerator - coll_gain_per_unit * total);
        Ok((coll_gain_per_unit, debt_loss_per_unit))
    }

    fn update_reward_sum_and_product(
        &mut self,
        asset: Address,
        coll_gain_per_unit: U256,
        debt_loss_per_unit: u128,
        events: &mut EventLog,
    ) -> Result<()> {
        if debt_loss_per_unit > DECIMAL_PRECISION {
            return Err(Error::Internal("debt loss per unit exceeds 1.0".into()));
        }
        let current_p = self.p;
        let new_product_factor = DECIMAL_PRECISION - debt_loss_per_unit;

        let key = (asset, self.current_epoch, self.current_scale);
        let current_s = self.epoch_to_scale_to_sum.get(&key).copied().unwrap_or(U256::ZERO);
        let new_s = current_s + coll_gain_per_unit * wide(current_p);
        self.epoch_to_scale_to_sum.insert(key, new_s);
        events.push(ProtocolEvent::SumUpdated {
            asset,
            s: new_s,
            epoch: self.current_epoch,
            scale: self.current_scale,
        });

        let new_p = if new_product_factor == 0 {
            self.current_epoch += 1;
            self.current_scale = 0;
            events.push(ProtocolEvent::EpochUpdated {
                epoch: self.current_epoch,
            });
            events.push(ProtocolEvent::ScaleUpdated { scale: 0 });
            DECIMAL_PRECISION
        } else {
            let scaled = mul_div(current_p, new_product_factor, DECIMAL_PRECISION)?;
            if scaled < SCALE_FACTOR {
                self.current_scale += 1;
                events.push(ProtocolEvent::ScaleUpdated {
                    scale: self.current_scale,
                });
                mul_div(safe_mul(current_p, new_product_factor)?, SCALE_FACTOR, DECIMAL_PRECISION)?
            } else {
                scaled
            }
        };

        if new_p == 0 {
            return Err(Error::Internal("product factor reached zero".into()));
        }
        self.p = new_p;
        events.push(ProtocolEvent::ProductUpdated { p: new_p });
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    fn g_at(&self, epoch: u128, scale: u128) -> U256 {
        self.epoch_to_scale_to_g
            .get(&(epoch, scale))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    fn s_at(&self, asset: Address, epoch: u128, scale: u128) -> U256 {
        self.epoch_to_scale_to_sum
            .get(&(asset, epoch, scale))
            .copied()
            .unwrap_or(U256::ZERO)
    }

    /// Principal recorded at the last interaction
    pub fn initial_deposit(&self, depositor: &Address) -> u128 {
        self.deposits.get(depositor).map(|d| d.initial).unwrap_or(0)
    }

    /// Deposit after all offsets since the last interaction
    pub fn compounded_deposit(&self, depositor: &Address) -> Result<u128> {
        let deposit = match self.deposits.get(depositor) {
            Some(d) if d.initial > 0 => d,
            _ => return Ok(0),
        };
        let snapshot = &deposit.snapshot;
        if snapshot.epoch < self.current_epoch {
            return Ok(0);
        }

        let compounded = match self.current_scale - snapshot.scale {
            0 => mul_div(deposit.initial, self.p, snapshot.p)?,
            1 => mul_div(deposit.initial, self.p, snapshot.p)? / SCALE_FACTOR,
            _ => 0,
        };

        // Below a billionth of the principal the value is rounding noise
        if compounded < deposit.initial / 1_000_000_000 {
            return Ok(0);
        }
        Ok(compounded)
    }

    /// Collateral gains per asset owed to `depositor`
    pub fn depositor_gains(&self, depositor: &Address) -> Result<Vec<(Address, u128)>> {
        let deposit = match self.deposits.get(depositor) {
            Some(d) if d.initial > 0 => d,
            _ => return Ok(Vec::new()),
        };
        let snapshot = &deposit.snapshot;
        let mut gains = Vec::new();
        for asset in self.known_assets() {
            let s_snapshot = snapshot.s.get(&asset).copied().unwrap_or(U256::ZERO);
            let first = self
                .s_at(asset, snapshot.epoch, snapshot.scale)
                .saturating_sub(s_snapshot);
            let second = self.s_at(asset, snapshot.epoch, snapshot.scale + 1) / wide(SCALE_FACTOR);
            let gain = gain_from_snapshot(deposit.initial, first + second, snapshot.p)?;
            if gain > 0 {
                gains.push((asset, gain));
            }
        }
        Ok(gains)
    }

    /// Reward-token gain owed to `depositor`
    pub fn depositor_reward_gain(&self, depositor: &Address) -> Result<u128> {
        let deposit = match self.deposits.get(depositor) {
            Some(d) if d.initial > 0 => d,
            _ => return Ok(0),
        };
        let snapshot = &deposit.snapshot;
        let first = self
            .g_at(snapshot.epoch, snapshot.scale)
            .saturating_sub(snapshot.g);
        let second = self.g_at(snapshot.epoch, snapshot.scale + 1) / wide(SCALE_FACTOR);
        gain_from_snapshot(deposit.initial, first + second, snapshot.p)
    }

    fn known_assets(&self) -> Vec<Address> {
        let mut assets: Vec<Address> = self
            .epoch_to_scale_to_sum
            .keys()
            .map(|(asset, _, _)| *asset)
            .collect();
        assets.dedup();
        assets
    }

    /// Total deposits
    pub fn total_deposits(&self) -> u128 {
        self.total_deposits
    }

    /// Collateral held for depositors
    pub fn collateral_balance(&self, asset: &Address) -> u128 {
        self.coll_balances.get(asset).copied().unwrap_or(0)
    }

    /// Current product factor
    pub fn p(&self) -> u128 {
        self.p
    }

    /// Current scale
    pub fn current_scale(&self) -> u128 {
        self.current_scale
    }

    /// Current epoch
    pub fn current_epoch(&self) -> u128 {
        self.current_epoch
    }

    /// Collateral sum for `(asset, epoch, scale)`
    pub fn epoch_to_scale_to_sum(&self, asset: &Address, epoch: u128, scale: u128) -> U256 {
        self.s_at(*asset, epoch, scale)
    }

    /// Reward sum for `(epoch, scale)`
    pub fn epoch_to_scale_to_g(&self, epoch: u128, scale: u128) -> U256 {
        self.g_at(epoch, scale)
    }

    /// Snapshot recorded for `depositor`
    pub fn deposit(&self, depositor: &Address) -> Option<&Deposit> {
        self.deposits.get(depositor)
    }

    /// Reward tokens paid to `depositor` so far
    pub fn reward_paid(&self, depositor: &Address) -> u128 {
        self.reward_paid.get(depositor).copied().unwrap_or(0)
    }

    /// Number of depositors
    pub fn depositor_count(&self) -> usize {
        self.deposits.len()
    }
}

/// `initial * sum_delta / p_snapshot / 1e18`
fn gain_from_snapshot(initial: u128, sum_delta: U256, p_snapshot: u128) -> Result<u128> {
    if sum_delta.is_zero() || p_snapshot == 0 {
        return Ok(0);
    }
    let gain = wide(initial) * sum_delta / wide(p_snapshot) / wide(DECIMAL_PRECISION);
    narrow(gain, "depositor gain")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::pools::{DebtTokenLedger, PoolLedger};
    use proptest::prelude::*;

    const E18: u128 = DECIMAL_PRECISION;

    struct Fixture {
        sp: StabilityPool,
        token: DebtTokenLedger,
        pools: PoolLedger,
        events: EventLog,
        roles: ProtocolRoles,
    }

    fn asset() -> Address {
        Address::repeat_byte(0xee)
    }

    fn user(n: u8) -> Address {
        Address::with_last_byte(n)
    }

    impl Fixture {
        fn new() -> Self {
            let roles = ProtocolRoles::default();
            Self {
                sp: StabilityPool::new(roles),
                token: DebtTokenLedger::new(),
                pools: PoolLedger::new(),
                events: EventLog::new(),
                roles,
            }
        }

        fn deposit(&mut self, who: Address, amount: u128) {
            self.token.mint(who, amount).unwrap();
            self.sp
                .provide_to_sp(who, amount, &mut self.token, &mut self.pools, &mut self.events)
                .unwrap();
        }

        /// Liquidated vessel whose debt and collateral sit in the active pool
        fn offset(&mut self, debt: u128, coll: u128) {
            self.pools.receive(asset(), PoolId::Active, coll).unwrap();
            self.pools.increase_debt(asset(), DebtPool::Active, debt).unwrap();
            let caller = self.roles.vessel_manager_operations;
            self.sp
                .offset(caller, asset(), debt, coll, &mut self.token, &mut self.pools, &mut self.events)
                .unwrap();
        }
    }

    #[test]
    fn test_offset_splits_loss_and_gain() {
        let mut f = Fixture::new();
        f.deposit(user(1), 6_000 * E18);
        f.deposit(user(2), 4_000 * E18);

        f.offset(5_000 * E18, 50 * E18);

        let a = f.sp.compounded_deposit(&user(1)).unwrap();
        let b = f.sp.compounded_deposit(&user(2)).unwrap();
        assert!(a.abs_diff(3_000 * E18) < 1_000_000);
        assert!(b.abs_diff(2_000 * E18) < 1_000_000);

        let gains = f.sp.depositor_gains(&user(1)).unwrap();
        assert_eq!(gains.len(), 1);
        assert!(gains[0].1.abs_diff(30 * E18) < 1_000_000);
        assert_eq!(f.sp.total_deposits(), 5_000 * E18);
        assert_eq!(f.token.balance_of(&f.roles.stability_pool), 5_000 * E18);
        assert_eq!(f.pools.balance(&asset(), PoolId::StabilityPool), 50 * E18);
    }

    #[test]
    fn test_withdraw_pays_gains_and_caps_amount() {
        let mut f = Fixture::new();
        f.deposit(user(1), 10_000 * E18);
        f.deposit(user(2), 10_000 * E18);
        assert_eq!(f.sp.depositor_count(), 2);
        f.offset(10_000 * E18, 100 * E18);

        let gains = f
            .sp
            .withdraw_from_sp(user(1), u128::MAX, &mut f.token, &mut f.pools, &mut f.events)
            .unwrap();
        assert_eq!(gains.new_deposit, 0);
        assert!(gains.debt_token_loss.abs_diff(5_000 * E18) < 1_000_000);
        assert!(f.token.balance_of(&user(1)).abs_diff(5_000 * E18) < 1_000_000);
        assert!(f
            .pools
            .balance(&asset(), PoolId::Account(user(1)))
            .abs_diff(50 * E18)
            < 1_000_000);
        assert!(f.sp.deposit(&user(1)).is_none());
        assert_eq!(f.sp.depositor_count(), 1);

        let err = f
            .sp
            .withdraw_from_sp(user(3), 1, &mut f.token, &mut f.pools, &mut f.events)
            .unwrap_err();
        assert_eq!(err, Error::NoDeposit(user(3)));
    }

    #[test]
    fn test_full_offset_starts_new_epoch() {
        let mut f = Fixture::new();
        f.deposit(user(1), 1_000 * E18);
        f.offset(1_000 * E18, 10 * E18);

        assert_eq!(f.sp.current_epoch(), 1);
        assert_eq!(f.sp.current_scale(), 0);
        assert_eq!(f.sp.p(), E18);
        assert_eq!(f.sp.compounded_deposit(&user(1)).unwrap(), 0);
        // Gains from the emptied epoch remain claimable
        let gains = f.sp.depositor_gains(&user(1)).unwrap();
        assert_eq!(gains, vec![(asset(), 10 * E18)]);

        // New depositors in the new epoch are unaffected
        f.deposit(user(2), 500 * E18);
        assert_eq!(f.sp.compounded_deposit(&user(2)).unwrap(), 500 * E18);
    }

    #[test]
    fn test_scale_change_keeps_later_deposit_value() {
        let mut f = Fixture::new();
        let big = 100_000 * E18;
        f.deposit(user(1), big);
        // Leaves one token: P drops to ~1e13
        f.offset(big - E18, E18);
        assert_eq!(f.sp.current_scale(), 0);

        f.deposit(user(2), big - E18);
        // Same relative loss pushes P under 1e9 and rescales
        f.offset(big - E18, E18);
        assert_eq!(f.sp.current_scale(), 1);

        let later = f.sp.compounded_deposit(&user(2)).unwrap();
        assert!(later.abs_diff(E18) < E18 / 10_000, "compounded {}", later);
        // The first deposit is below a billionth of its principal
        assert_eq!(f.sp.compounded_deposit(&user(1)).unwrap(), 0);
    }

    #[test]
    fn test_gains_across_scale_change_and_epoch_reset() {
        fn coll_gain(f: &Fixture, who: Address) -> u128 {
            f.sp.depositor_gains(&who)
                .unwrap()
                .first()
                .map(|(_, gain)| *gain)
                .unwrap_or(0)
        }
        fn near(actual: u128, expected: u128) -> bool {
            actual.abs_diff(expected) < E18 / 1_000
        }

        let mut f = Fixture::new();
        f.deposit(user(1), 1_000_000 * E18);
        f.offset(999_999 * E18, 10 * E18);
        assert_eq!(f.sp.current_scale(), 0);

        // P sits near 1e12; a 99.99% loss takes it under 1e9
        f.deposit(user(2), 999_999 * E18);
        f.offset(999_900 * E18, 20 * E18);
        assert_eq!(f.sp.current_scale(), 1);
        assert_eq!(f.sp.current_epoch(), 0);
        assert!(f.sp.p() >= SCALE_FACTOR);

        assert!(near(coll_gain(&f, user(1)), 10 * E18));
        assert!(near(coll_gain(&f, user(2)), 20 * E18));
        assert_eq!(f.sp.compounded_deposit(&user(1)).unwrap(), 0);
        assert!(near(f.sp.compounded_deposit(&user(2)).unwrap(), 100 * E18));

        // Joins at scale 1; user 2's snapshot is still at scale 0
        f.deposit(user(3), 100 * E18);
        f.sp.add_reward_issuance(20 * E18).unwrap();
        f.sp.trigger_reward_issuance(&mut f.events).unwrap();
        f.offset(100 * E18, 10 * E18);
        assert_eq!(f.sp.current_scale(), 1);

        assert!(near(coll_gain(&f, user(2)), 25 * E18));
        assert!(near(coll_gain(&f, user(3)), 5 * E18));
        assert!(near(f.sp.depositor_reward_gain(&user(2)).unwrap(), 10 * E18));
        assert!(near(f.sp.depositor_reward_gain(&user(3)).unwrap(), 10 * E18));
        assert!(near(f.sp.compounded_deposit(&user(2)).unwrap(), 50 * E18));
        assert!(near(f.sp.compounded_deposit(&user(3)).unwrap(), 50 * E18));

        // Emptying the pool opens epoch 1
        let total = f.sp.total_deposits();
        f.offset(total, 2 * E18);
        assert_eq!(f.sp.current_epoch(), 1);
        assert_eq!(f.sp.current_scale(), 0);
        assert_eq!(f.sp.compounded_deposit(&user(2)).unwrap(), 0);
        assert_eq!(f.sp.compounded_deposit(&user(3)).unwrap(), 0);
        assert!(near(coll_gain(&f, user(2)), 26 * E18));
        assert!(near(coll_gain(&f, user(3)), 6 * E18));

        let paid = coll_gain(&f, user(1)) + coll_gain(&f, user(2)) + coll_gain(&f, user(3));
        assert!(near(paid, 42 * E18));

        f.deposit(user(4), 10 * E18);
        assert_eq!(f.sp.compounded_deposit(&user(4)).unwrap(), 10 * E18);
        assert!(f.sp.depositor_gains(&user(4)).unwrap().is_empty());
        assert_eq!(f.sp.depositor_reward_gain(&user(4)).unwrap(), 0);
    }

    #[test]
    fn test_unauthorized_offset() {
        let mut f = Fixture::new();
        f.deposit(user(1), 1_000 * E18);
        let err = f
            .sp
            .offset(user(9), asset(), 1, 1, &mut f.token, &mut f.pools, &mut f.events)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));
    }

    #[test]
    fn test_reward_issuance() {
        let mut f = Fixture::new();
        f.sp.add_reward_issuance(100 * E18).unwrap();
        // Empty pool keeps the issuance queued
        f.deposit(user(1), 1_000 * E18);
        f.deposit(user(2), 3_000 * E18);
        assert_eq!(f.sp.depositor_reward_gain(&user(1)).unwrap(), 0);

        f.sp.add_reward_issuance(100 * E18).unwrap();
        f.sp.trigger_reward_issuance(&mut f.events).unwrap();
        let gain_1 = f.sp.depositor_reward_gain(&user(1)).unwrap();
        let gain_2 = f.sp.depositor_reward_gain(&user(2)).unwrap();
        // The first 100 went to user 1 alone when user 2 joined
        assert!(gain_1.abs_diff(125 * E18) < 1_000);
        assert!(gain_2.abs_diff(75 * E18) < 1_000);
    }

    proptest! {
        #[test]
        fn prop_offset_split_matches_single_offset(
            deposit in 1_000u128..1_000_000,
            d1 in 1u128..500,
            d2 in 1u128..500,
        ) {
            let deposit = deposit * E18;
            let (d1, d2) = (d1 * E18, d2 * E18);

            let mut split = Fixture::new();
            split.deposit(user(1), deposit);
            split.offset(d1, E18);
            split.offset(d2, E18);

            let mut once = Fixture::new();
            once.deposit(user(1), deposit);
            once.offset(d1 + d2, 2 * E18);

            let a = split.sp.compounded_deposit(&user(1)).unwrap();
            let b = once.sp.compounded_deposit(&user(1)).unwrap();
            prop_assert!(a.abs_diff(b) <= deposit / 1_000_000_000_000 + 10);
            prop_assert!(a <= deposit - d1 - d2 + 10);
        }

        #[test]
        fn prop_product_never_zero(losses in proptest::collection::vec(1u128..=100, 1..30)) {
            let mut f = Fixture::new();
            for (i, pct) in losses.iter().enumerate() {
                if f.sp.total_deposits() == 0 {
                    f.deposit(user(i as u8 + 1), 1_000 * E18);
                }
                let debt = f.sp.total_deposits() * pct / 100;
                if debt > 0 {
                    f.offset(debt, E18);
                }
                prop_assert!(f.sp.p() > 0);
            }
        }
    }
}
