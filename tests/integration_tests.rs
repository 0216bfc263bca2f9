//! Integration tests for the Gravita accounting core.
//!
//! Each test drives the public entry points (borrower operations,
//! liquidations, redemptions, Stability Pool) against one shared ledger and
//! a manual oracle.

use std::sync::Arc;

use alloy_primitives::Address;
use gravita_core::prelude::*;
use gravita_core::utils::constants::{DEFAULT_MCR, DEFAULT_REDEMPTION_FEE_FLOOR};
use gravita_core::utils::math::mul_div;
use proptest::prelude::*;
use tracing_subscriber::EnvFilter;

const E18: u128 = WAD;
const NOW: u64 = 1_700_000_000;

// ═══════════════════════════════════════════════════════════════════════════════
// TEST HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn weth() -> Address {
    Address::repeat_byte(0x11)
}

fn alice() -> Address {
    Address::repeat_byte(0xa1)
}

fn bob() -> Address {
    Address::repeat_byte(0xb0)
}

fn carol() -> Address {
    Address::repeat_byte(0xc0)
}

fn dave() -> Address {
    Address::repeat_byte(0xd0)
}

fn erin() -> Address {
    Address::repeat_byte(0xe0)
}

fn keeper() -> Address {
    Address::repeat_byte(0x4b)
}

/// Whole dollars as an 8-decimal oracle answer
fn usd(dollars: i128) -> i128 {
    dollars * 100_000_000
}

struct Fixture {
    clock: Arc<ManualClock>,
    oracle: Arc<ManualOracle>,
    roles: ProtocolRoles,
    ledger: SharedLedger,
    borrower_ops: BorrowerOperations<PriceFeed>,
    vessel_ops: VesselManagerOperations<PriceFeed>,
    sp_ops: StabilityPoolOperations<PriceFeed>,
}

impl Fixture {
    fn new() -> Self {
        Self::with_params(CollateralParams::default())
    }

    fn with_params(params: CollateralParams) -> Self {
        init_tracing();
        let roles = ProtocolRoles::default();
        let clock = Arc::new(ManualClock::new(NOW));
        let oracle = Arc::new(ManualOracle::new(usd(2_000), 8, NOW));

        let feed = Arc::new(PriceFeed::new(roles, clock.clone()));
        feed.set_oracle(
            roles.timelock,
            weth(),
            oracle.clone(),
            ProviderType::Chainlink,
            3_600,
            false,
            false,
        )
        .unwrap();

        let config = AdminConfig::new().with_collateral(weth(), params);
        let ledger = SharedLedger::new(LedgerState::new(config, roles).unwrap());
        let borrower_ops = BorrowerOperations::new(ledger.clone(), feed.clone()).unwrap();
        let vessel_ops =
            VesselManagerOperations::new(ledger.clone(), feed.clone(), clock.clone()).unwrap();
        let sp_ops = StabilityPoolOperations::new(ledger.clone(), feed).unwrap();

        Self {
            clock,
            oracle,
            roles,
            ledger,
            borrower_ops,
            vessel_ops,
            sp_ops,
        }
    }

    fn set_price(&self, answer: i128) {
        self.oracle.set_price(answer, self.clock.now()).unwrap();
    }

    fn open(&self, owner: Address, coll: u128, draw: u128) -> Vessel {
        self.borrower_ops
            .open_vessel(owner, weth(), coll, draw, None, None)
            .unwrap()
    }

    fn state(&self) -> LedgerState {
        self.ledger.snapshot().unwrap()
    }

    fn hash(&self) -> [u8; 32] {
        self.ledger.state_hash().unwrap()
    }

    fn assert_conserved(&self) {
        let state = self.state();
        assert_eq!(
            state.collateral_accounted(&weth()),
            state.collateral_received(&weth()),
            "collateral leaked out of the custody buckets"
        );
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// LIQUIDATION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_underwater_vessel_redistributed_in_recovery_mode() {
    let f = Fixture::new();
    let a = f.open(alice(), 20 * E18, 10_000 * E18);
    let b = f.open(bob(), 2 * E18, 2_000 * E18);
    assert_eq!(a.debt, 10_250 * E18);
    assert_eq!(b.debt, 2_210 * E18);
    assert_eq!(f.state().vessels.ledger(&weth()).total_stakes, 22 * E18);

    f.set_price(usd(800));
    let price = 800 * E18;
    assert!(f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());
    assert!(f.vessel_ops.current_icr(&weth(), &bob(), price).unwrap() < E18);

    let outcome = f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap();
    assert!(outcome.recovery_mode_at_start);
    assert_eq!(outcome.liquidated, vec![bob()]);
    assert_eq!(outcome.coll_gas_compensation, E18 / 100);
    assert_eq!(outcome.debt_token_gas_compensation, 200 * E18);

    let state = f.state();
    assert_eq!(state.vessels.ledger(&weth()).total_stakes, 20 * E18);
    assert_eq!(
        state.vessels.vessel(&weth(), &alice()).unwrap().stake,
        a.stake
    );
    assert_eq!(
        state.vessels.status(&weth(), &bob()),
        VesselStatus::ClosedByLiquidation
    );

    // Alice inherits the whole vessel minus the gas compensation
    let (pending_coll, pending_debt) = f.vessel_ops.pending_rewards(&weth(), &alice()).unwrap();
    assert_eq!(pending_debt, 2_210 * E18);
    assert_eq!(pending_coll, 2 * E18 - E18 / 100);

    assert_eq!(state.debt_token.balance_of(&keeper()), 200 * E18);
    assert_eq!(
        state.pools.balance(&weth(), PoolId::Account(keeper())),
        E18 / 100
    );
    assert_eq!(state.coll_surplus.claimable(&weth(), &bob()), 0);
    f.assert_conserved();
}

#[test]
fn test_offset_against_stability_pool() {
    let f = Fixture::new();
    f.open(alice(), 20 * E18, 10_000 * E18);
    f.open(bob(), 2 * E18, 2_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 5_000 * E18).unwrap();

    // $1160.25 puts Bob at exactly 105%
    f.set_price(116_025_000_000);
    let price = 116_025 * E18 / 100;
    assert_eq!(
        f.vessel_ops.current_icr(&weth(), &bob(), price).unwrap(),
        105 * E18 / 100
    );
    assert!(!f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());

    let outcome = f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap();
    assert!(!outcome.recovery_mode_at_start);
    assert_eq!(outcome.liquidated_debt, 2_210 * E18);

    assert_eq!(f.sp_ops.total_deposits().unwrap(), 2_790 * E18);
    let deposit = f.sp_ops.compounded_deposit(&alice()).unwrap();
    assert!(deposit.abs_diff(2_790 * E18) < 1_000_000, "deposit {}", deposit);

    let gains = f.sp_ops.depositor_gains(&alice()).unwrap();
    let gain = gains
        .iter()
        .find(|(asset, _)| *asset == weth())
        .map(|(_, amount)| *amount)
        .unwrap();
    assert!(gain.abs_diff(2 * E18 - E18 / 100) < 1_000_000, "gain {}", gain);

    // Nothing was redistributed
    let (pending_coll, pending_debt) = f.vessel_ops.pending_rewards(&weth(), &alice()).unwrap();
    assert_eq!((pending_coll, pending_debt), (0, 0));

    // A zero withdrawal just pays out the gains
    f.sp_ops.withdraw_from_sp(alice(), 0).unwrap();
    let state = f.state();
    assert_eq!(state.pools.balance(&weth(), PoolId::Account(alice())), gain);
    assert_eq!(state.stability_pool.collateral_balance(&weth()), 1_990 * E18 / 1_000 - gain);
    f.assert_conserved();
}

#[test]
fn test_capped_liquidation_leaves_claimable_surplus() {
    let f = Fixture::new();
    f.open(alice(), 10 * E18, 10_000 * E18);
    f.open(bob(), 3 * E18, 3_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 5_000 * E18).unwrap();

    f.set_price(usd(1_400));
    let price = 1_400 * E18;
    let tcr = f.vessel_ops.tcr(&weth(), price).unwrap();
    let icr = f.vessel_ops.current_icr(&weth(), &bob(), price).unwrap();
    assert!(f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());
    assert!(icr > DEFAULT_MCR && icr < tcr);

    let outcome = f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap();
    assert_eq!(outcome.liquidated, vec![bob()]);

    let capped = 3_215 * E18 * 11 / 14_000;
    let surplus = 3 * E18 - capped;
    let state = f.state();
    assert_eq!(state.coll_surplus.claimable(&weth(), &bob()), surplus);
    assert_eq!(
        state.pools.balance(&weth(), PoolId::Account(keeper())),
        capped / 200
    );
    assert_eq!(state.stability_pool.total_deposits(), 1_785 * E18);
    f.assert_conserved();

    let claimed = f.borrower_ops.claim_collateral(bob(), weth()).unwrap();
    assert_eq!(claimed, surplus);
    let state = f.state();
    assert_eq!(state.coll_surplus.claimable(&weth(), &bob()), 0);
    assert_eq!(state.pools.balance(&weth(), PoolId::Account(bob())), surplus);
    assert!(f.borrower_ops.claim_collateral(bob(), weth()).is_err());
    f.assert_conserved();
}

#[test]
fn test_capped_band_skipped_when_pool_too_small() {
    let f = Fixture::new();
    f.open(alice(), 10 * E18, 10_000 * E18);
    f.open(bob(), 3 * E18, 3_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 3_000 * E18).unwrap();
    f.set_price(usd(1_400));

    let before = f.hash();
    let err = f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap_err();
    assert_eq!(err, Error::NothingToLiquidate);
    assert_eq!(f.hash(), before);
    assert!(f.state().vessels.status(&weth(), &bob()).is_active());
}

#[test]
fn test_batch_and_sequence_liquidation() {
    let f = Fixture::new();
    f.open(alice(), 50 * E18, 20_000 * E18);
    f.open(carol(), 2 * E18, 2_000 * E18);
    f.open(dave(), 2 * E18, 2_000 * E18);
    f.open(erin(), 2 * E18, 2_000 * E18);

    f.set_price(usd(1_200));
    assert!(!f.vessel_ops.check_recovery_mode(&weth(), 1_200 * E18).unwrap());

    // Duplicates are skipped
    let outcome = f
        .vessel_ops
        .batch_liquidate_vessels(keeper(), weth(), &[carol(), carol(), dave()])
        .unwrap();
    assert_eq!(outcome.liquidated, vec![carol(), dave()]);
    assert!(f.state().vessels.status(&weth(), &erin()).is_active());

    let outcome = f.vessel_ops.liquidate_vessels(keeper(), weth(), 10).unwrap();
    assert_eq!(outcome.liquidated, vec![erin()]);
    // Erin's vessel carried its share of the first redistribution
    assert_eq!(outcome.liquidated_debt, 2_380 * E18);
    let erin_gas = outcome.coll_gas_compensation;
    assert!(erin_gas > E18 / 100);

    // Only the whale is left and the last vessel is never liquidated
    let err = f.vessel_ops.liquidate_vessels(keeper(), weth(), 10).unwrap_err();
    assert_eq!(err, Error::NothingToLiquidate);

    let state = f.state();
    assert_eq!(state.vessels.owner_count(&weth()), 1);
    assert_eq!(state.debt_token.balance_of(&keeper()), 600 * E18);
    let keeper_coll = state.pools.balance(&weth(), PoolId::Account(keeper()));
    assert_eq!(keeper_coll, 2 * E18 / 100 + erin_gas);

    // The whale ends up with everything the keeper did not take
    let (pending_coll, pending_debt) = f.vessel_ops.pending_rewards(&weth(), &alice()).unwrap();
    assert_eq!(pending_debt, 6_630 * E18);
    assert!(pending_coll.abs_diff(6 * E18 - keeper_coll) <= 1_000);
    f.assert_conserved();

    let events = f.vessel_ops.take_events().unwrap();
    assert_eq!(events.filter_by_type("Liquidation").len(), 2);
    assert_eq!(events.filter_by_type("VesselLiquidated").len(), 3);
}

/// Recovery Mode at $1300 with 3000 in the pool: Bob's capped vessel is too
/// large for the pool, Carol's fits, Erin sits above the TCR.
fn recovery_with_short_pool() -> Fixture {
    let f = Fixture::new();
    f.open(alice(), 100 * E18, 100_000 * E18);
    f.open(bob(), 4 * E18, 4_000 * E18);
    f.open(carol(), 21 * E18 / 10, 2_000 * E18);
    f.open(erin(), 10 * E18, 8_000 * E18);
    f.open(dave(), 10 * E18, 4_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 3_000 * E18).unwrap();
    f.set_price(usd(1_300));

    let price = 1_300 * E18;
    let tcr = f.vessel_ops.tcr(&weth(), price).unwrap();
    let bob_icr = f.vessel_ops.current_icr(&weth(), &bob(), price).unwrap();
    let carol_icr = f.vessel_ops.current_icr(&weth(), &carol(), price).unwrap();
    assert!(f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());
    assert!(DEFAULT_MCR < bob_icr && bob_icr < carol_icr && carol_icr < tcr);
    f
}

fn assert_only_carol_capped(f: &Fixture, outcome: &LiquidationOutcome) {
    assert!(outcome.recovery_mode_at_start);
    assert_eq!(outcome.liquidated, vec![carol()]);
    assert_eq!(outcome.liquidated_debt, 2_210 * E18);

    // 2210 * 1.1 / 1300 = 1.87 consumed out of 2.1
    let state = f.state();
    assert_eq!(state.coll_surplus.claimable(&weth(), &carol()), 23 * E18 / 100);
    assert_eq!(state.coll_surplus.claimable(&weth(), &bob()), 0);
    assert_eq!(
        state.pools.balance(&weth(), PoolId::Account(keeper())),
        187 * E18 / 100 / 200
    );
    assert_eq!(state.debt_token.balance_of(&keeper()), 200 * E18);
    assert_eq!(state.stability_pool.total_deposits(), 790 * E18);
    for owner in [alice(), bob(), erin(), dave()] {
        assert!(state.vessels.status(&weth(), &owner).is_active());
    }
    assert_eq!(
        state.vessels.status(&weth(), &carol()),
        VesselStatus::ClosedByLiquidation
    );

    // Erin was reached with the pool still non-empty and left alone
    let price = 1_300 * E18;
    let erin_icr = f.vessel_ops.current_icr(&weth(), &erin(), price).unwrap();
    assert!(erin_icr >= f.vessel_ops.tcr(&weth(), price).unwrap());
    let (pending_coll, pending_debt) = f.vessel_ops.pending_rewards(&weth(), &erin()).unwrap();
    assert_eq!((pending_coll, pending_debt), (0, 0));
    f.assert_conserved();
}

#[test]
fn test_recovery_sequence_skips_uncovered_capped_vessel() {
    let f = recovery_with_short_pool();
    let outcome = f.vessel_ops.liquidate_vessels(keeper(), weth(), 10).unwrap();
    assert_only_carol_capped(&f, &outcome);
}

#[test]
fn test_recovery_batch_skips_uncovered_capped_vessel() {
    let f = recovery_with_short_pool();
    let outcome = f
        .vessel_ops
        .batch_liquidate_vessels(keeper(), weth(), &[bob(), carol(), erin(), alice()])
        .unwrap();
    assert_only_carol_capped(&f, &outcome);
}

/// Recovery Mode at $1000 with 9500 in the pool. Offsetting Bob (ICR < MCR)
/// lifts the TCR back over CCR; Dave is also under MCR, Carol is not.
fn recovery_restored_by_first_offset() -> Fixture {
    let f = Fixture::new();
    f.open(alice(), 18 * E18, 10_000 * E18);
    f.open(bob(), 5 * E18, 4_500 * E18);
    f.open(carol(), 3 * E18, 2_300 * E18);
    f.open(dave(), 24 * E18 / 10, 2_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 9_500 * E18).unwrap();
    f.set_price(usd(1_000));

    let price = 1_000 * E18;
    assert!(f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());
    assert!(f.vessel_ops.current_icr(&weth(), &bob(), price).unwrap() < DEFAULT_MCR);
    assert!(f.vessel_ops.current_icr(&weth(), &dave(), price).unwrap() < DEFAULT_MCR);
    assert!(f.vessel_ops.current_icr(&weth(), &carol(), price).unwrap() > DEFAULT_MCR);
    f
}

fn assert_carol_spared_after_recovery(f: &Fixture, outcome: &LiquidationOutcome) {
    assert!(outcome.recovery_mode_at_start);
    assert_eq!(outcome.liquidated, vec![bob(), dave()]);
    assert_eq!(outcome.liquidated_debt, 47_225 * E18 / 10 + 2_210 * E18);

    let price = 1_000 * E18;
    assert!(!f.vessel_ops.check_recovery_mode(&weth(), price).unwrap());

    // Carol would still qualify for a capped liquidation under Recovery rules
    let carol_vessel = f.vessel_ops.entire_debt_and_coll(&weth(), &carol()).unwrap();
    let carol_icr = f.vessel_ops.current_icr(&weth(), &carol(), price).unwrap();
    assert!(carol_icr < f.vessel_ops.tcr(&weth(), price).unwrap());
    assert_eq!(f.sp_ops.total_deposits().unwrap(), 25_675 * E18 / 10);
    assert!(carol_vessel.debt <= f.sp_ops.total_deposits().unwrap());

    let state = f.state();
    assert!(state.vessels.status(&weth(), &carol()).is_active());
    assert_eq!(state.coll_surplus.claimable(&weth(), &carol()), 0);
    assert_eq!(state.vessels.owner_count(&weth()), 2);
    f.assert_conserved();
}

#[test]
fn test_recovery_sequence_returns_to_normal_mode() {
    let f = recovery_restored_by_first_offset();
    let outcome = f.vessel_ops.liquidate_vessels(keeper(), weth(), 10).unwrap();
    assert_carol_spared_after_recovery(&f, &outcome);
}

#[test]
fn test_recovery_batch_returns_to_normal_mode() {
    let f = recovery_restored_by_first_offset();
    let outcome = f
        .vessel_ops
        .batch_liquidate_vessels(keeper(), weth(), &[bob(), carol(), dave()])
        .unwrap();
    assert_carol_spared_after_recovery(&f, &outcome);
}

#[test]
fn test_recovery_batch_order_decides_capped_liquidation() {
    let f = recovery_restored_by_first_offset();
    // Listed first, Carol is still judged under Recovery Mode
    let outcome = f
        .vessel_ops
        .batch_liquidate_vessels(keeper(), weth(), &[carol(), bob(), dave()])
        .unwrap();
    assert_eq!(outcome.liquidated, vec![carol(), bob(), dave()]);

    // 2511.5 * 1.1 / 1000 = 2.76265 consumed out of 3
    let state = f.state();
    assert_eq!(
        state.coll_surplus.claimable(&weth(), &carol()),
        23_735 * E18 / 100_000
    );
    assert_eq!(state.vessels.owner_count(&weth()), 1);
    assert_eq!(f.sp_ops.total_deposits().unwrap(), 56 * E18);
    f.assert_conserved();
}

#[test]
fn test_empty_batch_rejected() {
    let f = Fixture::new();
    let err = f
        .vessel_ops
        .batch_liquidate_vessels(keeper(), weth(), &[])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidParameter { .. }));
}

// ═══════════════════════════════════════════════════════════════════════════════
// REDEMPTION TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_redemption_partially_redeems_riskiest_vessel() {
    let f = Fixture::new();
    f.open(alice(), 10 * E18, 5_000 * E18);
    f.open(bob(), 10 * E18, 4_000 * E18);

    let price = 2_000 * E18;
    let hints = f
        .vessel_ops
        .redemption_hints(weth(), 1_000 * E18, price, 0)
        .unwrap();
    assert_eq!(hints.first_redemption_hint, Some(alice()));
    assert_eq!(hints.truncated_amount, 1_000 * E18);

    let request = RedemptionRequest::new(weth(), 1_000 * E18, E18).with_hints(&hints);
    let outcome = f.vessel_ops.redeem_collateral(bob(), &request).unwrap();
    assert_eq!(outcome.actual_debt, 1_000 * E18);
    assert_eq!(outcome.redeemed, vec![alice()]);
    // 1000 / 2000 softened to 97%
    assert_eq!(outcome.coll_drawn, 485 * E18 / 1_000);
    assert!(outcome.coll_drawn <= 1_000 * E18 / 2_000);
    assert!(outcome.coll_fee > 0);

    let state = f.state();
    let a = state.vessels.vessel(&weth(), &alice()).unwrap();
    assert_eq!(a.debt, 4_225 * E18);
    assert_eq!(a.coll, 9_515 * E18 / 1_000);
    assert_eq!(state.debt_token.balance_of(&bob()), 3_000 * E18);
    assert_eq!(
        state.pools.balance(&weth(), PoolId::Account(f.roles.fee_collector)),
        outcome.coll_fee
    );
    assert_eq!(
        state.pools.balance(&weth(), PoolId::Account(bob())),
        outcome.coll_drawn - outcome.coll_fee
    );
    let base_rate = state.vessels.ledger(&weth()).base_rate;
    assert!(base_rate > 0);
    f.assert_conserved();

    // Half-life of twelve hours
    f.clock.advance(12 * 3_600);
    let rate = f.vessel_ops.redemption_rate(&weth()).unwrap();
    let expected = DEFAULT_REDEMPTION_FEE_FLOOR + base_rate / 2;
    assert!(rate.abs_diff(expected) < E18 / 1_000_000, "rate {}", rate);
}

#[test]
fn test_failed_redemption_leaves_state_untouched() {
    let f = Fixture::new();
    f.open(alice(), 10 * E18, 5_000 * E18);
    f.open(bob(), 10 * E18, 4_000 * E18);
    let before = f.hash();

    // The base-rate bump alone exceeds a floor-level max fee
    let request = RedemptionRequest::new(weth(), 1_000 * E18, DEFAULT_REDEMPTION_FEE_FLOOR);
    let err = f.vessel_ops.redeem_collateral(bob(), &request).unwrap_err();
    assert!(matches!(err, Error::FeeExceedsMax { .. }));
    assert_eq!(f.hash(), before);

    let err = f.vessel_ops.liquidate(keeper(), weth(), alice()).unwrap_err();
    assert_eq!(err, Error::NothingToLiquidate);
    assert_eq!(f.hash(), before);
}

#[test]
fn test_redemption_blocked_until_start() {
    let f = Fixture::with_params(CollateralParams::default().with_redemption_start(NOW + 1_000));
    f.open(alice(), 10 * E18, 5_000 * E18);
    f.open(bob(), 10 * E18, 4_000 * E18);

    let request = RedemptionRequest::new(weth(), 1_000 * E18, E18);
    let err = f.vessel_ops.redeem_collateral(bob(), &request).unwrap_err();
    assert!(matches!(err, Error::RedemptionNotAllowed { .. }));

    f.clock.advance(1_000);
    f.set_price(usd(2_000));
    assert!(f.vessel_ops.redeem_collateral(bob(), &request).is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════════
// STABILITY POOL TESTS
// ═══════════════════════════════════════════════════════════════════════════════

#[test]
fn test_withdraw_refused_while_undercollateralized_vessels_exist() {
    let f = Fixture::new();
    f.open(alice(), 20 * E18, 10_000 * E18);
    f.open(bob(), 2 * E18, 2_000 * E18);
    f.sp_ops.provide_to_sp(alice(), 5_000 * E18).unwrap();

    f.set_price(usd(1_100));
    let err = f.sp_ops.withdraw_from_sp(alice(), 500 * E18).unwrap_err();
    assert_eq!(err, Error::UndercollateralizedVessels(weth()));

    f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap();
    assert!(f.sp_ops.withdraw_from_sp(alice(), 500 * E18).is_ok());
}

// ═══════════════════════════════════════════════════════════════════════════════
// PROPERTY TESTS
// ═══════════════════════════════════════════════════════════════════════════════

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn prop_pending_rewards_apply_once(
        a_coll in 20u128..60,
        b_draw in 2_000u128..4_000,
    ) {
        let f = Fixture::new();
        f.open(alice(), a_coll * E18, 10_000 * E18);
        f.open(bob(), 3 * E18, b_draw * E18);

        // Bob falls below MCR for any draw in range
        f.set_price(usd(800));
        f.vessel_ops.liquidate(keeper(), weth(), bob()).unwrap();

        let state = f.state();
        let ledger = state.vessels.ledger(&weth());
        let stake = state.vessels.vessel(&weth(), &alice()).unwrap().stake;
        let (_, pending_debt) = f.vessel_ops.pending_rewards(&weth(), &alice()).unwrap();
        prop_assert_eq!(pending_debt, mul_div(stake, ledger.l_debt, E18).unwrap());

        let apply = |state: &mut LedgerState| {
            state.vessels.apply_pending_rewards(weth(), alice(), &mut state.pools)
        };
        f.ledger.transact(apply).unwrap();
        let once = f.hash();
        f.ledger.transact(apply).unwrap();
        prop_assert_eq!(f.hash(), once);
        f.assert_conserved();
    }
}
