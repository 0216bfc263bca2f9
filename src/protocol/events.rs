//! Protocol events for state change notifications.
//!
//! Every mutating operation records what it changed so callers can index
//! activity without diffing ledger state. Logs are drained by the caller.

use alloy_primitives::{Address, U256};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// What touched a vessel
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VesselOperation {
    /// Opened by its owner
    Open,
    /// Collateral or debt adjusted by its owner
    Adjust,
    /// Closed by its owner
    Close,
    /// Liquidated in Normal Mode
    LiquidateInNormalMode,
    /// Liquidated in Recovery Mode
    LiquidateInRecoveryMode,
    /// Partially or fully redeemed against
    RedeemCollateral,
}

/// All protocol event types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProtocolEvent {
    // Vessel Events
    /// Vessel amounts changed
    VesselUpdated {
        /// Collateral asset
        asset: Address,
        /// Owner
        owner: Address,
        /// New debt
        debt: u128,
        /// New collateral
        coll: u128,
        /// New stake
        stake: u128,
        /// Cause
        operation: VesselOperation,
    },
    /// Vessel closed by liquidation
    VesselLiquidated {
        /// Collateral asset
        asset: Address,
        /// Owner
        owner: Address,
        /// Debt liquidated
        debt: u128,
        /// Collateral liquidated
        coll: u128,
        /// Liquidation mode
        operation: VesselOperation,
    },
    /// Totals of one liquidation call
    Liquidation {
        /// Collateral asset
        asset: Address,
        /// Debt liquidated
        liquidated_debt: u128,
        /// Collateral liquidated (gas compensation excluded)
        liquidated_coll: u128,
        /// Collateral paid to the liquidator
        coll_gas_compensation: u128,
        /// Debt tokens paid to the liquidator
        debt_token_gas_compensation: u128,
    },
    /// Totals of one redemption call
    Redemption {
        /// Collateral asset
        asset: Address,
        /// Debt the redeemer asked for
        attempted_debt: u128,
        /// Debt actually redeemed
        actual_debt: u128,
        /// Collateral sent to the redeemer
        coll_sent: u128,
        /// Collateral fee taken
        coll_fee: u128,
    },
    /// Redistribution accumulators changed
    LTermsUpdated {
        /// Collateral asset
        asset: Address,
        /// L_Coll
        l_coll: u128,
        /// L_Debt
        l_debt: u128,
    },
    /// Total stakes changed
    TotalStakesUpdated {
        /// Collateral asset
        asset: Address,
        /// New total
        total_stakes: u128,
    },
    /// Post-liquidation snapshots taken
    SystemSnapshotsUpdated {
        /// Collateral asset
        asset: Address,
        /// Total stakes snapshot
        total_stakes_snapshot: u128,
        /// Total collateral snapshot
        total_collateral_snapshot: u128,
    },
    /// Redemption base rate changed
    BaseRateUpdated {
        /// Collateral asset
        asset: Address,
        /// New base rate
        base_rate: u128,
    },
    /// Redemption softening changed
    RedemptionSofteningUpdated {
        /// New value in basis points
        softening: u128,
    },

    // Stability Pool Events
    /// Product factor changed
    ProductUpdated {
        /// New P
        p: u128,
    },
    /// Collateral gain sum changed
    SumUpdated {
        /// Collateral asset
        asset: Address,
        /// New S
        s: U256,
        /// Epoch
        epoch: u128,
        /// Scale
        scale: u128,
    },
    /// Reward gain sum changed
    GainUpdated {
        /// New G
        g: U256,
        /// Epoch
        epoch: u128,
        /// Scale
        scale: u128,
    },
    /// Pool emptied, new epoch started
    EpochUpdated {
        /// New epoch
        epoch: u128,
    },
    /// P rescaled
    ScaleUpdated {
        /// New scale
        scale: u128,
    },
    /// Total deposits changed
    StabilityPoolDebtBalanceUpdated {
        /// New total
        total_deposits: u128,
    },
    /// Depositor principal changed
    UserDepositChanged {
        /// Depositor
        depositor: Address,
        /// New compounded deposit
        new_deposit: u128,
    },
    /// Depositor gains paid out
    GainsWithdrawn {
        /// Depositor
        depositor: Address,
        /// Collateral gains per asset
        gains: Vec<(Address, u128)>,
        /// Deposit lost to liquidations since last touch
        debt_token_loss: u128,
    },
    /// Reward tokens paid to a depositor
    RewardPaidToDepositor {
        /// Depositor
        depositor: Address,
        /// Amount
        amount: u128,
    },

    // Surplus Events
    /// Claimable surplus changed
    CollBalanceUpdated {
        /// Collateral asset
        asset: Address,
        /// Owner
        account: Address,
        /// New claimable balance
        new_balance: u128,
    },

    // Oracle Events
    /// Oracle registered or replaced
    OracleRegistered {
        /// Collateral asset
        asset: Address,
        /// Oracle decimals
        decimals: u8,
        /// Staleness timeout
        timeout_seconds: u64,
        /// Answer is denominated in ETH
        is_eth_indexed: bool,
        /// Registered as fallback
        is_fallback: bool,
    },
}

impl ProtocolEvent {
    /// Get the event type as a string
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::VesselUpdated { .. } => "VesselUpdated",
            Self::VesselLiquidated { .. } => "VesselLiquidated",
            Self::Liquidation { .. } => "Liquidation",
            Self::Redemption { .. } => "Redemption",
            Self::LTermsUpdated { .. } => "LTermsUpdated",
            Self::TotalStakesUpdated { .. } => "TotalStakesUpdated",
            Self::SystemSnapshotsUpdated { .. } => "SystemSnapshotsUpdated",
            Self::BaseRateUpdated { .. } => "BaseRateUpdated",
            Self::RedemptionSofteningUpdated { .. } => "RedemptionSofteningUpdated",
            Self::ProductUpdated { .. } => "ProductUpdated",
            Self::SumUpdated { .. } => "SumUpdated",
            Self::GainUpdated { .. } => "GainUpdated",
            Self::EpochUpdated { .. } => "EpochUpdated",
            Self::ScaleUpdated { .. } => "ScaleUpdated",
            Self::StabilityPoolDebtBalanceUpdated { .. } => "StabilityPoolDebtBalanceUpdated",
            Self::UserDepositChanged { .. } => "UserDepositChanged",
            Self::GainsWithdrawn { .. } => "GainsWithdrawn",
            Self::RewardPaidToDepositor { .. } => "RewardPaidToDepositor",
            Self::CollBalanceUpdated { .. } => "CollBalanceUpdated",
            Self::OracleRegistered { .. } => "OracleRegistered",
        }
    }

    /// SHA-256 of the bincode encoding
    pub fn hash(&self) -> [u8; 32] {
        let data = bincode::serialize(self).unwrap_or_default();
        Sha256::digest(&data).into()
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// EVENT LOG
// ═══════════════════════════════════════════════════════════════════════════════

/// Collection of events from one or more operations
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    events: Vec<ProtocolEvent>,
}

impl EventLog {
    /// Create a new empty event log
    pub fn new() -> Self {
        Self { events: Vec::new() }
    }

    /// Add an event to the log
    pub fn push(&mut self, event: ProtocolEvent) {
        self.events.push(event);
    }

    /// Get all events
    pub fn events(&self) -> &[ProtocolEvent] {
        &self.events
    }

    /// Get events of a specific type
    pub fn filter_by_type(&self, event_type: &str) -> Vec<&ProtocolEvent> {
        self.events
            .iter()
            .filter(|e| e.event_type() == event_type)
            .collect()
    }

    /// Get the number of events
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Merge another event log into this one
    pub fn merge(&mut self, other: EventLog) {
        self.events.extend(other.events);
    }

    /// Remove and return every event
    pub fn take(&mut self) -> Vec<ProtocolEvent> {
        std::mem::take(&mut self.events)
    }

    /// Chained hash over all events
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        for event in &self.events {
            hasher.update(event.hash());
        }
        hasher.finalize().into()
    }
}
