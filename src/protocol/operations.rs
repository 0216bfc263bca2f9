//! Liquidation, redemption and Stability Pool entry points.
//!
//! Prices are fetched before the ledger is locked. Every mutation then runs
//! inside [`SharedLedger::transact`], so a failing call leaves the ledger
//! exactly as it was.

use std::sync::Arc;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::core::clock::Clock;
use crate::core::config::CollateralParams;
use crate::core::fees::{
    redemption_fee, redemption_rate, redemption_rate_with_decay, update_base_rate_from_redemption,
};
use crate::core::pools::{CollateralCustody, DebtPool, DebtToken, PoolId};
use crate::core::roles::ProtocolRoles;
use crate::core::sorted_vessels::NominalIcrSource;
use crate::core::vessel::{EntireDebtAndColl, VesselStatus};
use crate::error::{Error, Result};
use crate::liquidation::engine::{self, LiquidationOutcome, LiquidationTotals};
use crate::liquidation::recovery::{get_tcr, system_status, SystemStatus};
use crate::liquidation::stability_pool::DepositorGains;
use crate::oracle::price_feed::PriceSource;
use crate::protocol::events::{EventLog, ProtocolEvent, VesselOperation};
use crate::protocol::state::{LedgerState, SharedLedger};
use crate::utils::constants::*;
use crate::utils::math::*;

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// Arguments of a redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionRequest {
    /// Collateral to receive
    pub asset: Address,
    /// Debt tokens to redeem
    pub debt_amount: u128,
    /// First vessel to redeem from, if still valid
    pub first_redemption_hint: Option<Address>,
    /// Reinsert hint for the partially redeemed vessel
    pub upper_partial_hint: Option<Address>,
    /// Reinsert hint for the partially redeemed vessel
    pub lower_partial_hint: Option<Address>,
    /// Expected NICR of the partially redeemed vessel
    pub partial_redemption_hint_nicr: u128,
    /// Vessels to visit at most (0 = no limit)
    pub max_iterations: usize,
    /// Highest acceptable fee (1e18 = 100%)
    pub max_fee_percentage: u128,
}

impl RedemptionRequest {
    /// Request without hints or iteration limit
    pub fn new(asset: Address, debt_amount: u128, max_fee_percentage: u128) -> Self {
        Self {
            asset,
            debt_amount,
            first_redemption_hint: None,
            upper_partial_hint: None,
            lower_partial_hint: None,
            partial_redemption_hint_nicr: 0,
            max_iterations: 0,
            max_fee_percentage,
        }
    }

    /// Use hints computed by [`VesselManagerOperations::redemption_hints`]
    pub fn with_hints(mut self, hints: &RedemptionHints) -> Self {
        self.first_redemption_hint = hints.first_redemption_hint;
        self.partial_redemption_hint_nicr = hints.partial_redemption_hint_nicr;
        self
    }

    /// Limit the number of vessels visited
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }
}

/// Hints for a redemption, computed off the live ledger
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionHints {
    /// Highest-risk vessel with ICR >= MCR
    pub first_redemption_hint: Option<Address>,
    /// NICR the last, partially redeemed vessel will end at
    pub partial_redemption_hint_nicr: u128,
    /// Amount that can actually be redeemed without cancelling the partial step
    pub truncated_amount: u128,
}

/// Result of a redemption
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RedemptionOutcome {
    /// Amount asked for
    pub attempted_debt: u128,
    /// Debt actually redeemed
    pub actual_debt: u128,
    /// Collateral drawn from vessels
    pub coll_drawn: u128,
    /// Collateral kept as fee
    pub coll_fee: u128,
    /// Vessels touched, in order
    pub redeemed: Vec<Address>,
}

/// What one vessel gave up
struct SingleRedemption {
    debt_lot: u128,
    coll_lot: u128,
}

// ═══════════════════════════════════════════════════════════════════════════════
// VESSEL MANAGER OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Liquidation and redemption orchestrator
pub struct VesselManagerOperations<P: PriceSource> {
    ledger: SharedLedger,
    price_feed: Arc<P>,
    clock: Arc<dyn Clock>,
    roles: ProtocolRoles,
}

impl<P: PriceSource> VesselManagerOperations<P> {
    /// Bind to a shared ledger
    pub fn new(ledger: SharedLedger, price_feed: Arc<P>, clock: Arc<dyn Clock>) -> Result<Self> {
        let roles = ledger.read(|state| Ok(state.roles))?;
        Ok(Self {
            ledger,
            price_feed,
            clock,
            roles,
        })
    }

    /// The ledger this orchestrator mutates
    pub fn ledger(&self) -> &SharedLedger {
        &self.ledger
    }

    /// Price as seen by the liquidation operator
    pub fn fetch_price(&self, asset: &Address) -> Result<u128> {
        self.price_feed
            .fetch_price(asset, &self.roles.vessel_manager_operations)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIQUIDATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Liquidate one vessel
    pub fn liquidate(
        &self,
        liquidator: Address,
        asset: Address,
        owner: Address,
    ) -> Result<LiquidationOutcome> {
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            state.vessels.require_active(&asset, &owner)?;
            if state.vessels.owner_count(&asset) <= 1 {
                return Err(Error::OnlyOneVesselInSystem(asset));
            }
            let recovery_mode = engine::recovery_mode_at(state, &asset, price)?;
            let totals = engine::totals_from_batch(state, asset, price, &[owner], recovery_mode)?;
            finish_liquidation(state, asset, price, recovery_mode, totals, liquidator)
        })
    }

    /// Liquidate up to `n` of the riskiest vessels
    pub fn liquidate_vessels(
        &self,
        liquidator: Address,
        asset: Address,
        n: usize,
    ) -> Result<LiquidationOutcome> {
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            state.config.params(&asset)?;
            let recovery_mode = engine::recovery_mode_at(state, &asset, price)?;
            let totals = engine::totals_from_sequence(state, asset, price, n, recovery_mode)?;
            finish_liquidation(state, asset, price, recovery_mode, totals, liquidator)
        })
    }

    /// Liquidate an explicit list of vessels
    pub fn batch_liquidate_vessels(
        &self,
        liquidator: Address,
        asset: Address,
        owners: &[Address],
    ) -> Result<LiquidationOutcome> {
        if owners.is_empty() {
            return Err(Error::InvalidParameter {
                name: "owners".into(),
                reason: "vessel array must not be empty".into(),
            });
        }
        let price = self.fetch_price(&asset)?;
        self.ledger.transact(|state| {
            state.config.params(&asset)?;
            let recovery_mode = engine::recovery_mode_at(state, &asset, price)?;
            let totals = engine::totals_from_batch(state, asset, price, owners, recovery_mode)?;
            finish_liquidation(state, asset, price, recovery_mode, totals, liquidator)
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REDEMPTION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Swap debt tokens for collateral, riskiest eligible vessels first
    pub fn redeem_collateral(
        &self,
        redeemer: Address,
        request: &RedemptionRequest,
    ) -> Result<RedemptionOutcome> {
        let price = self.fetch_price(&request.asset)?;
        let now = self.clock.now();
        self.ledger
            .transact(|state| redeem(state, redeemer, request, price, now))
    }

    /// Walk the list the way a redemption of `debt_amount` would
    pub fn redemption_hints(
        &self,
        asset: Address,
        debt_amount: u128,
        price: u128,
        max_iterations: usize,
    ) -> Result<RedemptionHints> {
        self.ledger.read(|state| {
            let params = state.config.params(&asset)?;
            let softening = state.config.redemption_softening();
            let gas = params.debt_token_gas_compensation;

            let mut current = state.sorted.get_last(&asset);
            while let Some(owner) = current {
                if state.vessels.current_icr(&asset, &owner, price)? >= params.mcr {
                    break;
                }
                current = state.sorted.get_prev(&asset, &owner);
            }
            let first_redemption_hint = current;

            let mut remaining = debt_amount;
            let mut partial_redemption_hint_nicr = 0;
            let mut visited = 0;
            while let Some(owner) = current {
                if remaining == 0 || (max_iterations != 0 && visited == max_iterations) {
                    break;
                }
                visited += 1;
                let entire = state.vessels.entire_debt_and_coll(&asset, &owner)?;
                let net_debt = safe_sub(entire.debt, gas)?;

                if net_debt <= remaining {
                    remaining -= net_debt;
                } else {
                    if net_debt > params.min_net_debt {
                        let max_redeemable = remaining.min(net_debt - params.min_net_debt);
                        let coll_lot = softened_coll_lot(max_redeemable, price, softening)?;
                        let new_coll = safe_sub(entire.coll, coll_lot)?;
                        let new_debt = safe_add(net_debt - max_redeemable, gas)?;
                        partial_redemption_hint_nicr = compute_nominal_cr(new_coll, new_debt)?;
                        remaining -= max_redeemable;
                    }
                    break;
                }
                current = state.sorted.get_prev(&asset, &owner);
            }

            Ok(RedemptionHints {
                first_redemption_hint,
                partial_redemption_hint_nicr,
                truncated_amount: debt_amount - remaining,
            })
        })
    }

    /// Change the share of oracle value paid to redeemers (timelock only)
    pub fn set_redemption_softening(&self, caller: Address, softening: u128) -> Result<()> {
        self.roles.require_timelock(caller)?;
        self.ledger.transact(|state| {
            state.config.set_redemption_softening(softening)?;
            state
                .events
                .push(ProtocolEvent::RedemptionSofteningUpdated { softening });
            info!(softening, "redemption softening updated");
            Ok(())
        })
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// ICR including pending rewards
    pub fn current_icr(&self, asset: &Address, owner: &Address, price: u128) -> Result<u128> {
        self.ledger
            .read(|state| state.vessels.current_icr(asset, owner, price))
    }

    /// NICR including pending rewards
    pub fn nominal_icr(&self, asset: &Address, owner: &Address) -> Result<u128> {
        self.ledger
            .read(|state| state.vessels.nominal_icr(asset, owner))
    }

    /// Total collateral ratio
    pub fn tcr(&self, asset: &Address, price: u128) -> Result<u128> {
        self.ledger
            .read(|state| get_tcr(asset, price, &state.vessels, &state.pools))
    }

    /// Whether `asset` is in Recovery Mode at `price`
    pub fn check_recovery_mode(&self, asset: &Address, price: u128) -> Result<bool> {
        self.ledger
            .read(|state| engine::recovery_mode_at(state, asset, price))
    }

    /// TCR, CCR and mode in one snapshot
    pub fn system_status(&self, asset: &Address, price: u128) -> Result<SystemStatus> {
        self.ledger.read(|state| {
            system_status(*asset, price, &state.config, &state.vessels, &state.pools)
        })
    }

    /// Pending `(coll, debt)` redistribution rewards
    pub fn pending_rewards(&self, asset: &Address, owner: &Address) -> Result<(u128, u128)> {
        self.ledger.read(|state| {
            Ok((
                state.vessels.pending_coll_reward(asset, owner)?,
                state.vessels.pending_debt_reward(asset, owner)?,
            ))
        })
    }

    /// Debt and collateral including pending rewards
    pub fn entire_debt_and_coll(&self, asset: &Address, owner: &Address) -> Result<EntireDebtAndColl> {
        self.ledger
            .read(|state| state.vessels.entire_debt_and_coll(asset, owner))
    }

    /// Redemption rate with the base rate decayed to now
    pub fn redemption_rate(&self, asset: &Address) -> Result<u128> {
        let now = self.clock.now();
        self.ledger.read(|state| {
            let params = state.config.params(asset)?;
            redemption_rate_with_decay(&state.vessels.ledger(asset), params, now)
        })
    }

    /// Drain events recorded by committed calls
    pub fn take_events(&self) -> Result<EventLog> {
        self.ledger.take_events()
    }
}

fn finish_liquidation(
    state: &mut LedgerState,
    asset: Address,
    price: u128,
    recovery_mode: bool,
    totals: LiquidationTotals,
    liquidator: Address,
) -> Result<LiquidationOutcome> {
    if totals.is_empty() {
        debug!(%asset, price = %format_wad(price), recovery_mode, "nothing to liquidate");
        return Err(Error::NothingToLiquidate);
    }
    engine::finalize_liquidation(state, asset, price, recovery_mode, totals, liquidator)
}

/// `debt * 1e18 / price`, softened
fn softened_coll_lot(debt_lot: u128, price: u128, softening: u128) -> Result<u128> {
    let coll_lot = mul_div(debt_lot, DECIMAL_PRECISION, price)?;
    mul_div(coll_lot, softening, PERCENTAGE_PRECISION)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION INTERNALS
// ═══════════════════════════════════════════════════════════════════════════════

fn require_valid_redemption(
    state: &LedgerState,
    redeemer: Address,
    request: &RedemptionRequest,
    params: &CollateralParams,
    price: u128,
    now: u64,
) -> Result<()> {
    let asset = request.asset;
    if params.redemption_block_timestamp > now {
        return Err(Error::RedemptionNotAllowed {
            asset,
            opens_at: params.redemption_block_timestamp,
        });
    }
    if request.max_fee_percentage < params.redemption_fee_floor
        || request.max_fee_percentage > DECIMAL_PRECISION
    {
        return Err(Error::FeePercentOutOfBounds {
            max_fee_percentage: request.max_fee_percentage,
            floor: params.redemption_fee_floor,
        });
    }
    if request.debt_amount == 0 {
        return Err(Error::ZeroAmount);
    }
    let available = state.debt_token.balance_of(&redeemer);
    if available < request.debt_amount {
        return Err(Error::InsufficientBalance {
            account: redeemer,
            required: request.debt_amount,
            available,
        });
    }
    let tcr = get_tcr(&asset, price, &state.vessels, &state.pools)?;
    if tcr < params.mcr {
        return Err(Error::TcrBelowMcr {
            tcr,
            mcr: params.mcr,
        });
    }
    Ok(())
}

/// The hint must be the riskiest vessel still at or above MCR
fn is_valid_first_redemption_hint(
    state: &LedgerState,
    asset: &Address,
    hint: Option<Address>,
    price: u128,
    mcr: u128,
) -> Result<bool> {
    let hint = match hint {
        Some(hint) if state.sorted.contains(asset, &hint) => hint,
        _ => return Ok(false),
    };
    if state.vessels.current_icr(asset, &hint, price)? < mcr {
        return Ok(false);
    }
    match state.sorted.get_next(asset, &hint) {
        None => Ok(true),
        Some(next) => Ok(state.vessels.current_icr(asset, &next, price)? < mcr),
    }
}

fn redeem(
    state: &mut LedgerState,
    redeemer: Address,
    request: &RedemptionRequest,
    price: u128,
    now: u64,
) -> Result<RedemptionOutcome> {
    let asset = request.asset;
    let params = state.config.params(&asset)?.clone();
    require_valid_redemption(state, redeemer, request, &params, price, now)?;

    let total_debt_at_start = state.vessels.entire_system_debt(&asset, &state.pools)?;
    let softening = state.config.redemption_softening();

    // Find the first vessel with ICR >= MCR
    let mut current =
        if is_valid_first_redemption_hint(state, &asset, request.first_redemption_hint, price, params.mcr)? {
            request.first_redemption_hint
        } else {
            let mut candidate = state.sorted.get_last(&asset);
            while let Some(owner) = candidate {
                if state.vessels.current_icr(&asset, &owner, price)? >= params.mcr {
                    break;
                }
                candidate = state.sorted.get_prev(&asset, &owner);
            }
            candidate
        };

    let mut remaining = request.debt_amount;
    let mut total_debt_to_redeem = 0u128;
    let mut total_coll_drawn = 0u128;
    let mut redeemed = Vec::new();
    let mut iterations = 0usize;

    while let Some(owner) = current {
        if remaining == 0 || (request.max_iterations != 0 && iterations == request.max_iterations) {
            break;
        }
        iterations += 1;
        // Save the next vessel before this one is reinserted or closed
        let next = state.sorted.get_prev(&asset, &owner);

        state
            .vessels
            .apply_pending_rewards(asset, owner, &mut state.pools)?;

        let single = match redeem_from_vessel(
            state, &params, request, owner, remaining, price, softening,
        )? {
            Some(single) => single,
            None => break,
        };
        total_debt_to_redeem = safe_add(total_debt_to_redeem, single.debt_lot)?;
        total_coll_drawn = safe_add(total_coll_drawn, single.coll_lot)?;
        remaining = safe_sub(remaining, single.debt_lot)?;
        redeemed.push(owner);
        current = next;
    }

    if total_coll_drawn == 0 {
        return Err(Error::UnableToRedeemAnyAmount);
    }

    // Fee from the updated base rate
    let base_rate = update_base_rate_from_redemption(
        state.vessels.ledger_mut(asset),
        now,
        total_coll_drawn,
        price,
        total_debt_at_start,
    )?;
    state
        .events
        .push(ProtocolEvent::BaseRateUpdated { asset, base_rate });
    let fee = redemption_fee(
        redemption_rate(base_rate, params.redemption_fee_floor),
        total_coll_drawn,
    )?;
    let fee_percentage = mul_div(fee.fee, DECIMAL_PRECISION, total_coll_drawn)?;
    if fee_percentage > request.max_fee_percentage {
        return Err(Error::FeeExceedsMax {
            fee_percentage,
            max_fee_percentage: request.max_fee_percentage,
        });
    }

    // Burn the redeemed debt and pay out
    state.debt_token.burn(redeemer, total_debt_to_redeem)?;
    state
        .pools
        .decrease_debt(asset, DebtPool::Active, total_debt_to_redeem)?;
    if fee.fee > 0 {
        state.pools.send_asset(
            asset,
            PoolId::Active,
            PoolId::Account(state.roles.fee_collector),
            fee.fee,
        )?;
    }
    let coll_to_redeemer = total_coll_drawn - fee.fee;
    state
        .pools
        .send_asset(asset, PoolId::Active, PoolId::Account(redeemer), coll_to_redeemer)?;

    state.events.push(ProtocolEvent::Redemption {
        asset,
        attempted_debt: request.debt_amount,
        actual_debt: total_debt_to_redeem,
        coll_sent: coll_to_redeemer,
        coll_fee: fee.fee,
    });
    info!(
        %asset,
        %redeemer,
        vessels = redeemed.len(),
        debt = %format_wad(total_debt_to_redeem),
        coll = %format_wad(coll_to_redeemer),
        fee = %format_wad(fee.fee),
        "collateral redeemed"
    );

    Ok(RedemptionOutcome {
        attempted_debt: request.debt_amount,
        actual_debt: total_debt_to_redeem,
        coll_drawn: total_coll_drawn,
        coll_fee: fee.fee,
        redeemed,
    })
}

/// Redeem as much of `remaining` as the vessel allows.
///
/// Returns `None` when a partial redemption has to be cancelled.
fn redeem_from_vessel(
    state: &mut LedgerState,
    params: &CollateralParams,
    request: &RedemptionRequest,
    owner: Address,
    remaining: u128,
    price: u128,
    softening: u128,
) -> Result<Option<SingleRedemption>> {
    let asset = request.asset;
    let gas = params.debt_token_gas_compensation;
    let vessel = state.vessels.require_active(&asset, &owner)?;
    let (debt, coll) = (vessel.debt, vessel.coll);

    // Never touch the gas compensation reserve
    let debt_lot = remaining.min(safe_sub(debt, gas)?);
    let coll_lot = softened_coll_lot(debt_lot, price, softening)?;
    let new_debt = debt - debt_lot;
    let new_coll = safe_sub(coll, coll_lot)?;

    if new_debt == gas {
        state.vessels.remove_stake(asset, owner)?;
        state.vessels.close_vessel(
            asset,
            owner,
            VesselStatus::ClosedByRedemption,
            &mut state.sorted,
        )?;
        state.debt_token.burn(state.roles.gas_pool, gas)?;
        state.pools.decrease_debt(asset, DebtPool::Active, gas)?;
        if new_coll > 0 {
            let caller = state.roles.vessel_manager;
            state
                .coll_surplus
                .account_surplus(caller, asset, owner, new_coll, &mut state.events)?;
            state
                .pools
                .send_asset(asset, PoolId::Active, PoolId::CollSurplus, new_coll)?;
        }
        state.events.push(ProtocolEvent::VesselUpdated {
            asset,
            owner,
            debt: 0,
            coll: 0,
            stake: 0,
            operation: VesselOperation::RedeemCollateral,
        });
        debug!(%asset, %owner, surplus = %format_wad(new_coll), "vessel fully redeemed");
    } else {
        let new_nicr = compute_nominal_cr(new_coll, new_debt)?;
        let net_debt = safe_sub(new_debt, gas)?;
        if new_nicr != request.partial_redemption_hint_nicr || net_debt < params.min_net_debt {
            warn!(
                %asset,
                %owner,
                new_nicr,
                hint_nicr = request.partial_redemption_hint_nicr,
                "partial redemption cancelled"
            );
            return Ok(None);
        }

        state.vessels.decrease_debt(asset, owner, debt_lot)?;
        state.vessels.decrease_coll(asset, owner, coll_lot)?;
        let stake = state.vessels.update_stake_and_total_stakes(asset, owner)?;
        let caller = state.roles.vessel_manager;
        state.sorted.reinsert(
            caller,
            asset,
            owner,
            new_nicr,
            request.upper_partial_hint,
            request.lower_partial_hint,
            &state.vessels,
        )?;
        state.events.push(ProtocolEvent::VesselUpdated {
            asset,
            owner,
            debt: new_debt,
            coll: new_coll,
            stake,
            operation: VesselOperation::RedeemCollateral,
        });
    }

    Ok(Some(SingleRedemption { debt_lot, coll_lot }))
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Depositor-facing Stability Pool entry points
pub struct StabilityPoolOperations<P: PriceSource> {
    ledger: SharedLedger,
    price_feed: Arc<P>,
    roles: ProtocolRoles,
}

impl<P: PriceSource> StabilityPoolOperations<P> {
    /// Bind to a shared ledger
    pub fn new(ledger: SharedLedger, price_feed: Arc<P>) -> Result<Self> {
        let roles = ledger.read(|state| Ok(state.roles))?;
        Ok(Self {
            ledger,
            price_feed,
            roles,
        })
    }

    /// Deposit debt tokens
    pub fn provide_to_sp(&self, depositor: Address, amount: u128) -> Result<DepositorGains> {
        self.ledger.transact(|state| {
            state.stability_pool.provide_to_sp(
                depositor,
                amount,
                &mut state.debt_token,
                &mut state.pools,
                &mut state.events,
            )
        })
    }

    /// Withdraw debt tokens; a zero amount only claims gains.
    ///
    /// Withdrawals are refused while any asset has a vessel below MCR.
    pub fn withdraw_from_sp(&self, depositor: Address, amount: u128) -> Result<DepositorGains> {
        let prices = if amount > 0 {
            let assets: Vec<Address> = self.ledger.read(|state| {
                Ok(state
                    .config
                    .assets()
                    .filter(|asset| state.sorted.get_last(asset).is_some())
                    .copied()
                    .collect())
            })?;
            assets
                .into_iter()
                .map(|asset| {
                    let price = self
                        .price_feed
                        .fetch_price(&asset, &self.roles.stability_pool)?;
                    Ok((asset, price))
                })
                .collect::<Result<Vec<_>>>()?
        } else {
            Vec::new()
        };

        self.ledger.transact(|state| {
            for (asset, price) in &prices {
                if let Some(lowest) = state.sorted.get_last(asset) {
                    let mcr = state.config.params(asset)?.mcr;
                    if state.vessels.current_icr(asset, &lowest, *price)? < mcr {
                        return Err(Error::UndercollateralizedVessels(*asset));
                    }
                }
            }
            state.stability_pool.withdraw_from_sp(
                depositor,
                amount,
                &mut state.debt_token,
                &mut state.pools,
                &mut state.events,
            )
        })
    }

    /// Queue reward tokens for depositors (owner or timelock)
    pub fn add_reward_issuance(&self, caller: Address, amount: u128) -> Result<()> {
        self.roles
            .require_one_of(caller, &[self.roles.owner, self.roles.timelock], "owner or Timelock")?;
        self.ledger.transact(|state| {
            state.stability_pool.add_reward_issuance(amount)?;
            state.stability_pool.trigger_reward_issuance(&mut state.events)
        })
    }

    /// Current compounded deposit
    pub fn compounded_deposit(&self, depositor: &Address) -> Result<u128> {
        self.ledger
            .read(|state| state.stability_pool.compounded_deposit(depositor))
    }

    /// Pending collateral gains per asset
    pub fn depositor_gains(&self, depositor: &Address) -> Result<Vec<(Address, u128)>> {
        self.ledger
            .read(|state| state.stability_pool.depositor_gains(depositor))
    }

    /// Pending reward-token gain
    pub fn depositor_reward_gain(&self, depositor: &Address) -> Result<u128> {
        self.ledger
            .read(|state| state.stability_pool.depositor_reward_gain(depositor))
    }

    /// Total debt tokens deposited
    pub fn total_deposits(&self) -> Result<u128> {
        self.ledger
            .read(|state| Ok(state.stability_pool.total_deposits()))
    }
}
