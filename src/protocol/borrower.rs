//! Borrower-side vessel management.
//!
//! Opening, adjusting and closing vessels, plus claiming collateral surplus.
//! Each call fetches its price first and then runs as one ledger
//! transaction.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::core::config::CollateralParams;
use crate::core::fees::borrowing_fee;
use crate::core::pools::{CollateralCustody, DebtPool, DebtToken, PoolId};
use crate::core::roles::ProtocolRoles;
use crate::core::vessel::{Vessel, VesselStatus};
use crate::error::{Error, Result};
use crate::liquidation::recovery::{check_recovery_mode, new_tcr_from_vessel_change};
use crate::oracle::price_feed::PriceSource;
use crate::protocol::events::{ProtocolEvent, VesselOperation};
use crate::protocol::state::{LedgerState, SharedLedger};
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// ADJUSTMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// One change to an existing vessel
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VesselAdjustment {
    /// Collateral deposited
    pub coll_added: u128,
    /// Collateral withdrawn
    pub coll_withdrawal: u128,
    /// Debt tokens drawn or repaid
    pub debt_change: u128,
    /// Whether `debt_change` is drawn
    pub is_debt_increase: bool,
}

impl VesselAdjustment {
    fn validate(&self) -> Result<()> {
        if self.coll_added > 0 && self.coll_withdrawal > 0 {
            return Err(Error::InvalidParameter {
                name: "collateral".into(),
                reason: "cannot add and withdraw collateral at once".into(),
            });
        }
        if self.is_debt_increase && self.debt_change == 0 {
            return Err(Error::ZeroAmount);
        }
        if self.coll_added == 0 && self.coll_withdrawal == 0 && self.debt_change == 0 {
            return Err(Error::ZeroAmount);
        }
        Ok(())
    }

    /// `(amount, is_increase)` of the collateral change
    fn coll_change(&self) -> (u128, bool) {
        if self.coll_added > 0 {
            (self.coll_added, true)
        } else {
            (self.coll_withdrawal, false)
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// BORROWER OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Entry points for vessel owners
pub struct BorrowerOperations<P: PriceSource> {
    ledger: SharedLedger,
    price_feed: Arc<P>,
    roles: ProtocolRoles,
}

impl<P: PriceSource> BorrowerOperations<P> {
    /// Bind to a shared ledger
    pub fn new(ledger: SharedLedger, price_feed: Arc<P>) -> Result<Self> {
        let roles = ledger.read(|state| Ok(state.roles))?;
        Ok(Self {
            ledger,
            price_feed,
            roles,
        })
    }

    /// The ledger this front-end mutates
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    fn fetch_price(&self, asset: &Address) -> Result<u128> {
        self.price_feed
            .fetch_price(asset, &self.roles.borrower_operations)
    }

    /// Open a vessel with `coll_amount` and draw `debt_token_amount`.
    ///
    /// Recorded debt is the drawn amount plus the borrowing fee (Normal Mode
    /// only) plus gas compensation.
    pub fn open_vessel(
        &self,
        borrower: Address,
        asset: Address,
        coll_amount: u128,
        debt_token_amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            let params = state.config.active_params(&asset)?.clone();
            let recovery_mode =
                check_recovery_mode(&asset, price, &state.config, &state.vessels, &state.pools)?;
            if state.vessels.status(&asset, &borrower).is_active() {
                return Err(Error::VesselAlreadyExists {
                    asset,
                    owner: borrower,
                });
            }

            let fee = if recovery_mode {
                0
            } else {
                borrowing_fee(&params, debt_token_amount)?.fee
            };
            let net_debt = safe_add(debt_token_amount, fee)?;
            require_at_least_min_net_debt(&params, net_debt)?;
            let composite_debt = safe_add(net_debt, params.debt_token_gas_compensation)?;

            let icr = compute_cr(coll_amount, composite_debt, price)?;
            let nicr = compute_nominal_cr(coll_amount, composite_debt)?;
            if recovery_mode {
                require_icr_above_ccr(&params, icr)?;
            } else {
                require_icr_above_mcr(&params, icr)?;
                let new_tcr = new_tcr_from_vessel_change(
                    &asset,
                    price,
                    coll_amount,
                    true,
                    composite_debt,
                    true,
                    &state.vessels,
                    &state.pools,
                )?;
                require_new_tcr_above_ccr(&params, new_tcr)?;
            }
            require_within_mint_cap(state, &asset, &params, composite_debt)?;

            // Record the vessel
            state
                .vessels
                .open_vessel(asset, borrower, coll_amount, composite_debt)?;
            let stake = state.vessels.update_stake_and_total_stakes(asset, borrower)?;
            state.sorted.insert(
                self.roles.borrower_operations,
                asset,
                borrower,
                nicr,
                upper_hint,
                lower_hint,
                &state.vessels,
            )?;

            // Move collateral and mint debt
            state.pools.receive(asset, PoolId::Active, coll_amount)?;
            state
                .pools
                .increase_debt(asset, DebtPool::Active, composite_debt)?;
            state.debt_token.mint(borrower, debt_token_amount)?;
            if fee > 0 {
                state.debt_token.mint(self.roles.fee_collector, fee)?;
            }
            state
                .debt_token
                .mint(self.roles.gas_pool, params.debt_token_gas_compensation)?;

            state.events.push(ProtocolEvent::VesselUpdated {
                asset,
                owner: borrower,
                debt: composite_debt,
                coll: coll_amount,
                stake,
                operation: VesselOperation::Open,
            });
            info!(
                %asset,
                %borrower,
                coll = %format_wad(coll_amount),
                debt = %format_wad(composite_debt),
                fee = %format_wad(fee),
                recovery_mode,
                "vessel opened"
            );
            vessel_snapshot(state, &asset, &borrower)
        })
    }

    /// Deposit more collateral
    pub fn add_collateral(
        &self,
        borrower: Address,
        asset: Address,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        let adjustment = VesselAdjustment {
            coll_added: amount,
            ..VesselAdjustment::default()
        };
        self.adjust_vessel(borrower, asset, adjustment, upper_hint, lower_hint)
    }

    /// Withdraw collateral
    pub fn withdraw_collateral(
        &self,
        borrower: Address,
        asset: Address,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        let adjustment = VesselAdjustment {
            coll_withdrawal: amount,
            ..VesselAdjustment::default()
        };
        self.adjust_vessel(borrower, asset, adjustment, upper_hint, lower_hint)
    }

    /// Draw more debt tokens
    pub fn withdraw_debt_tokens(
        &self,
        borrower: Address,
        asset: Address,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        let adjustment = VesselAdjustment {
            debt_change: amount,
            is_debt_increase: true,
            ..VesselAdjustment::default()
        };
        self.adjust_vessel(borrower, asset, adjustment, upper_hint, lower_hint)
    }

    /// Repay debt tokens
    pub fn repay_debt_tokens(
        &self,
        borrower: Address,
        asset: Address,
        amount: u128,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        let adjustment = VesselAdjustment {
            debt_change: amount,
            ..VesselAdjustment::default()
        };
        self.adjust_vessel(borrower, asset, adjustment, upper_hint, lower_hint)
    }

    /// Apply an arbitrary [`VesselAdjustment`]
    pub fn adjust_vessel(
        &self,
        borrower: Address,
        asset: Address,
        adjustment: VesselAdjustment,
        upper_hint: Option<Address>,
        lower_hint: Option<Address>,
    ) -> Result<Vessel> {
        adjustment.validate()?;
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            let params = state.config.params(&asset)?.clone();
            let recovery_mode =
                check_recovery_mode(&asset, price, &state.config, &state.vessels, &state.pools)?;
            state.vessels.require_active(&asset, &borrower)?;
            state
                .vessels
                .apply_pending_rewards(asset, borrower, &mut state.pools)?;

            let (coll_change, is_coll_increase) = adjustment.coll_change();
            let is_debt_increase = adjustment.is_debt_increase;
            let mut net_debt_change = adjustment.debt_change;
            let mut fee = 0;
            if is_debt_increase {
                // New debt needs an active collateral
                state.config.active_params(&asset)?;
                if !recovery_mode {
                    fee = borrowing_fee(&params, adjustment.debt_change)?.fee;
                    net_debt_change = safe_add(net_debt_change, fee)?;
                }
            }

            let vessel = state.vessels.require_active(&asset, &borrower)?;
            let (debt, coll) = (vessel.debt, vessel.coll);
            if adjustment.coll_withdrawal > coll {
                return Err(Error::InsufficientBalance {
                    account: borrower,
                    required: adjustment.coll_withdrawal,
                    available: coll,
                });
            }
            let new_coll = apply_change(coll, coll_change, is_coll_increase)?;
            let new_debt = apply_change(debt, net_debt_change, is_debt_increase)?;
            let old_icr = compute_cr(coll, debt, price)?;
            let new_icr = compute_cr(new_coll, new_debt, price)?;

            // Mode-specific checks
            if recovery_mode {
                if adjustment.coll_withdrawal > 0 {
                    return Err(Error::RecoveryMode(
                        "collateral withdrawal not permitted".into(),
                    ));
                }
                if is_debt_increase {
                    require_icr_above_ccr(&params, new_icr)?;
                    if new_icr < old_icr {
                        return Err(Error::RecoveryMode(
                            "cannot decrease ICR".into(),
                        ));
                    }
                }
            } else {
                require_icr_above_mcr(&params, new_icr)?;
                let new_tcr = new_tcr_from_vessel_change(
                    &asset,
                    price,
                    coll_change,
                    is_coll_increase,
                    net_debt_change,
                    is_debt_increase,
                    &state.vessels,
                    &state.pools,
                )?;
                require_new_tcr_above_ccr(&params, new_tcr)?;
            }

            if !is_debt_increase && adjustment.debt_change > 0 {
                let repay = adjustment.debt_change;
                let max_repay = safe_sub(debt, params.debt_token_gas_compensation)?;
                if repay > max_repay {
                    return Err(Error::InvalidParameter {
                        name: "debt_change".into(),
                        reason: "amount repaid must not exceed the vessel's net debt".into(),
                    });
                }
                require_at_least_min_net_debt(&params, max_repay - repay)?;
                let available = state.debt_token.balance_of(&borrower);
                if available < repay {
                    return Err(Error::InsufficientBalance {
                        account: borrower,
                        required: repay,
                        available,
                    });
                }
            }
            if is_debt_increase {
                require_within_mint_cap(state, &asset, &params, net_debt_change)?;
            }

            // Update the vessel
            if is_coll_increase {
                state.vessels.increase_coll(asset, borrower, coll_change)?;
            } else if coll_change > 0 {
                state.vessels.decrease_coll(asset, borrower, coll_change)?;
            }
            if is_debt_increase {
                state.vessels.increase_debt(asset, borrower, net_debt_change)?;
            } else if net_debt_change > 0 {
                state.vessels.decrease_debt(asset, borrower, net_debt_change)?;
            }
            let stake = state.vessels.update_stake_and_total_stakes(asset, borrower)?;
            let new_nicr = compute_nominal_cr(new_coll, new_debt)?;
            state.sorted.reinsert(
                self.roles.borrower_operations,
                asset,
                borrower,
                new_nicr,
                upper_hint,
                lower_hint,
                &state.vessels,
            )?;

            // Move tokens and collateral
            if is_debt_increase {
                state
                    .pools
                    .increase_debt(asset, DebtPool::Active, net_debt_change)?;
                state.debt_token.mint(borrower, adjustment.debt_change)?;
                if fee > 0 {
                    state.debt_token.mint(self.roles.fee_collector, fee)?;
                }
            } else if net_debt_change > 0 {
                state
                    .pools
                    .decrease_debt(asset, DebtPool::Active, net_debt_change)?;
                state.debt_token.burn(borrower, net_debt_change)?;
            }
            if is_coll_increase {
                state.pools.receive(asset, PoolId::Active, coll_change)?;
            } else if coll_change > 0 {
                state.pools.send_asset(
                    asset,
                    PoolId::Active,
                    PoolId::Account(borrower),
                    coll_change,
                )?;
            }

            state.events.push(ProtocolEvent::VesselUpdated {
                asset,
                owner: borrower,
                debt: new_debt,
                coll: new_coll,
                stake,
                operation: VesselOperation::Adjust,
            });
            info!(
                %asset,
                %borrower,
                coll = %format_wad(new_coll),
                debt = %format_wad(new_debt),
                fee = %format_wad(fee),
                "vessel adjusted"
            );
            vessel_snapshot(state, &asset, &borrower)
        })
    }

    /// Repay everything and take the collateral back
    pub fn close_vessel(&self, borrower: Address, asset: Address) -> Result<u128> {
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            let params = state.config.params(&asset)?.clone();
            state.vessels.require_active(&asset, &borrower)?;
            if check_recovery_mode(&asset, price, &state.config, &state.vessels, &state.pools)? {
                return Err(Error::RecoveryMode(
                    "closing a vessel is not permitted".into(),
                ));
            }
            state
                .vessels
                .apply_pending_rewards(asset, borrower, &mut state.pools)?;

            let vessel = state.vessels.require_active(&asset, &borrower)?;
            let (debt, coll) = (vessel.debt, vessel.coll);
            let gas = params.debt_token_gas_compensation;
            let net_debt = safe_sub(debt, gas)?;

            let available = state.debt_token.balance_of(&borrower);
            if available < net_debt {
                return Err(Error::InsufficientBalance {
                    account: borrower,
                    required: net_debt,
                    available,
                });
            }
            let new_tcr = new_tcr_from_vessel_change(
                &asset,
                price,
                coll,
                false,
                debt,
                false,
                &state.vessels,
                &state.pools,
            )?;
            require_new_tcr_above_ccr(&params, new_tcr)?;

            state.vessels.remove_stake(asset, borrower)?;
            state.vessels.close_vessel(
                asset,
                borrower,
                VesselStatus::ClosedByOwner,
                &mut state.sorted,
            )?;

            // Burn the repaid debt and the gas reserve
            state.pools.decrease_debt(asset, DebtPool::Active, debt)?;
            state.debt_token.burn(borrower, net_debt)?;
            state.debt_token.burn(self.roles.gas_pool, gas)?;
            state
                .pools
                .send_asset(asset, PoolId::Active, PoolId::Account(borrower), coll)?;

            state.events.push(ProtocolEvent::VesselUpdated {
                asset,
                owner: borrower,
                debt: 0,
                coll: 0,
                stake: 0,
                operation: VesselOperation::Close,
            });
            info!(%asset, %borrower, coll = %format_wad(coll), "vessel closed");
            Ok(coll)
        })
    }

    /// Withdraw collateral surplus left by a liquidation or redemption
    pub fn claim_collateral(&self, borrower: Address, asset: Address) -> Result<u128> {
        self.ledger.transact(|state| {
            state.coll_surplus.claim_coll(
                self.roles.borrower_operations,
                asset,
                borrower,
                &mut state.pools,
                &mut state.events,
            )
        })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHECKS
// ═══════════════════════════════════════════════════════════════════════════════

fn apply_change(value: u128, change: u128, is_increase: bool) -> Result<u128> {
    if is_increase {
        safe_add(value, change)
    } else {
        safe_sub(value, change)
    }
}

fn vessel_snapshot(state: &LedgerState, asset: &Address, owner: &Address) -> Result<Vessel> {
    state.vessels.require_active(asset, owner).cloned()
}

fn require_at_least_min_net_debt(params: &CollateralParams, net_debt: u128) -> Result<()> {
    if net_debt < params.min_net_debt {
        return Err(Error::NetDebtBelowMinimum {
            net_debt,
            minimum: params.min_net_debt,
        });
    }
    Ok(())
}

fn require_icr_above_mcr(params: &CollateralParams, icr: u128) -> Result<()> {
    if icr < params.mcr {
        return Err(Error::IcrBelowMcr {
            icr,
            mcr: params.mcr,
        });
    }
    Ok(())
}

fn require_icr_above_ccr(params: &CollateralParams, icr: u128) -> Result<()> {
    if icr < params.ccr {
        return Err(Error::IcrBelowCcr {
            icr,
            ccr: params.ccr,
        });
    }
    Ok(())
}

fn require_new_tcr_above_ccr(params: &CollateralParams, tcr: u128) -> Result<()> {
    if tcr < params.ccr {
        return Err(Error::TcrBelowCcr {
            tcr,
            ccr: params.ccr,
        });
    }
    Ok(())
}

fn require_within_mint_cap(
    state: &LedgerState,
    asset: &Address,
    params: &CollateralParams,
    increase: u128,
) -> Result<()> {
    let total_debt = safe_add(
        state.vessels.entire_system_debt(asset, &state.pools)?,
        increase,
    )?;
    if total_debt > params.mint_cap {
        return Err(Error::MintCapExceeded {
            asset: *asset,
            total_debt,
            cap: params.mint_cap,
        });
    }
    Ok(())
}
