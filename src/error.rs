//! Error types for the Gravita accounting core.
//!
//! Every failure aborts the whole call: the orchestrator only commits a draft
//! ledger when the operation returns `Ok`, so none of these errors leave
//! partial state behind.

use alloy_primitives::Address;
use thiserror::Error;

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for the accounting core
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    // ═══════════════════════════════════════════════════════════════════
    // Vessel Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Vessel does not exist for this (asset, owner)
    #[error("Vessel not found: asset {asset}, owner {owner}")]
    VesselNotFound {
        /// Collateral asset
        asset: Address,
        /// Vessel owner
        owner: Address,
    },

    /// Vessel is already open
    #[error("Vessel already active: asset {asset}, owner {owner}")]
    VesselAlreadyExists {
        /// Collateral asset
        asset: Address,
        /// Vessel owner
        owner: Address,
    },

    /// Vessel exists but is not active
    #[error("Vessel is not active: asset {asset}, owner {owner}")]
    VesselNotActive {
        /// Collateral asset
        asset: Address,
        /// Vessel owner
        owner: Address,
    },

    /// Closing the last active vessel of an asset is not allowed
    #[error("Only one vessel left in the system for asset {0}")]
    OnlyOneVesselInSystem(Address),

    /// Individual collateral ratio below MCR
    #[error("ICR {icr} below MCR {mcr}")]
    IcrBelowMcr {
        /// Resulting ICR (1e18 = 100%)
        icr: u128,
        /// Minimum collateral ratio
        mcr: u128,
    },

    /// Individual collateral ratio below CCR (Recovery Mode opening)
    #[error("ICR {icr} below CCR {ccr}")]
    IcrBelowCcr {
        /// Resulting ICR
        icr: u128,
        /// Critical collateral ratio
        ccr: u128,
    },

    /// Operation would push TCR below CCR
    #[error("TCR {tcr} would fall below CCR {ccr}")]
    TcrBelowCcr {
        /// Resulting TCR
        tcr: u128,
        /// Critical collateral ratio
        ccr: u128,
    },

    /// Net debt below the per-asset minimum
    #[error("Net debt {net_debt} below minimum {minimum}")]
    NetDebtBelowMinimum {
        /// Resulting net debt
        net_debt: u128,
        /// Minimum net debt
        minimum: u128,
    },

    /// Per-asset mint cap reached
    #[error("Mint cap exceeded for asset {asset}: total debt {total_debt}, cap {cap}")]
    MintCapExceeded {
        /// Collateral asset
        asset: Address,
        /// Debt after the operation
        total_debt: u128,
        /// Configured mint cap
        cap: u128,
    },

    /// Operation not allowed in Recovery Mode
    #[error("Operation not permitted in Recovery Mode: {0}")]
    RecoveryMode(String),

    // ═══════════════════════════════════════════════════════════════════
    // Liquidation & Redemption Errors
    // ═══════════════════════════════════════════════════════════════════

    /// No vessel satisfied the liquidation eligibility rules
    #[error("Nothing to liquidate")]
    NothingToLiquidate,

    /// Redemption fee above the caller's accepted maximum
    #[error("Fee {fee_percentage} exceeds max {max_fee_percentage}")]
    FeeExceedsMax {
        /// Effective fee percentage (1e18 = 100%)
        fee_percentage: u128,
        /// Accepted maximum
        max_fee_percentage: u128,
    },

    /// Max fee percentage outside [floor, 100%]
    #[error("Max fee percentage {max_fee_percentage} out of bounds [{floor}, 1e18]")]
    FeePercentOutOfBounds {
        /// Requested maximum
        max_fee_percentage: u128,
        /// Redemption fee floor
        floor: u128,
    },

    /// The redemption fee would consume all drawn collateral
    #[error("Fee {fee} would eat up all returned collateral {drawn}")]
    FeeEatsAllCollateral {
        /// Fee amount
        fee: u128,
        /// Collateral drawn
        drawn: u128,
    },

    /// Redemptions disabled (bootstrap period)
    #[error("Redemptions not allowed for asset {asset} before {opens_at}")]
    RedemptionNotAllowed {
        /// Collateral asset
        asset: Address,
        /// Timestamp at which redemptions open
        opens_at: u64,
    },

    /// TCR below MCR blocks redemptions
    #[error("Cannot redeem when TCR {tcr} < MCR {mcr}")]
    TcrBelowMcr {
        /// Current TCR
        tcr: u128,
        /// Minimum collateral ratio
        mcr: u128,
    },

    /// The redemption loop drew no collateral
    #[error("Unable to redeem any amount")]
    UnableToRedeemAnyAmount,

    /// Stability Pool withdrawals wait until unhealthy vessels are liquidated
    #[error("Cannot withdraw while asset {0} has vessels with ICR < MCR")]
    UndercollateralizedVessels(Address),

    // ═══════════════════════════════════════════════════════════════════
    // Oracle Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Oracle answer older than its timeout
    #[error("Stale oracle for asset {asset}: updated {age}s ago, timeout {timeout}s")]
    StaleOracle {
        /// Collateral asset
        asset: Address,
        /// Seconds since the answer was updated
        age: u64,
        /// Configured timeout
        timeout: u64,
    },

    /// L2 sequencer reports downtime
    #[error("Sequencer is down")]
    SequencerDown,

    /// L2 sequencer recently restarted, grace period still running
    #[error("Sequencer grace period: up for {up_for}s, required {required}s")]
    SequencerGracePeriod {
        /// Seconds since the sequencer came back up
        up_for: u64,
        /// Delay applying to this caller
        required: u64,
    },

    /// Oracle returned an unusable answer
    #[error("Invalid oracle response for asset {asset}: {reason}")]
    InvalidOracleResponse {
        /// Collateral asset
        asset: Address,
        /// Reason the response was rejected
        reason: String,
    },

    /// Oracle configuration is inconsistent
    #[error("Invalid oracle config for asset {asset}: {reason}")]
    InvalidOracleConfig {
        /// Collateral asset
        asset: Address,
        /// Reason the configuration was rejected
        reason: String,
    },

    /// No oracle (or no collateral parameters) registered for asset
    #[error("Unknown asset: {0}")]
    UnknownAsset(Address),

    // ═══════════════════════════════════════════════════════════════════
    // Authorization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Caller does not hold the required role
    #[error("Unauthorized caller {caller}: {reason}")]
    Unauthorized {
        /// Offending caller
        caller: Address,
        /// Role that was required
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Validation Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Collateral asset is configured but inactive
    #[error("Collateral {0} is not active")]
    CollateralNotActive(Address),

    /// Balance too low for a transfer or burn
    #[error("Insufficient balance for {account}: required {required}, available {available}")]
    InsufficientBalance {
        /// Account being debited
        account: Address,
        /// Amount required
        required: u128,
        /// Amount available
        available: u128,
    },

    /// Depositor has no Stability Pool deposit
    #[error("No stability pool deposit for {0}")]
    NoDeposit(Address),

    /// No surplus collateral to claim
    #[error("No collateral available to claim for {0}")]
    NothingToClaim(Address),

    /// Invalid input parameter
    #[error("Invalid parameter {name}: {reason}")]
    InvalidParameter {
        /// Parameter name
        name: String,
        /// Reason for invalidity
        reason: String,
    },

    /// Amount is zero
    #[error("Amount cannot be zero")]
    ZeroAmount,

    /// Overflow in calculation
    #[error("Arithmetic overflow in {operation}")]
    Overflow {
        /// Operation that overflowed
        operation: String,
    },

    /// Underflow in calculation
    #[error("Arithmetic underflow in {operation}")]
    Underflow {
        /// Operation that underflowed
        operation: String,
    },

    /// Division by zero
    #[error("Division by zero in {operation}")]
    DivisionByZero {
        /// Operation that divided by zero
        operation: String,
    },

    // ═══════════════════════════════════════════════════════════════════
    // Serialization Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Deserialization failed
    #[error("Deserialization error: {0}")]
    Deserialization(String),

    // ═══════════════════════════════════════════════════════════════════
    // Internal Errors
    // ═══════════════════════════════════════════════════════════════════

    /// Internal error (broken invariant)
    #[error("Internal error: {0}")]
    Internal(String),

    /// Lock acquisition failed
    #[error("Failed to acquire ledger lock")]
    Lock,
}

impl Error {
    /// Shorthand for an unauthorized caller
    pub fn unauthorized(caller: Address, reason: impl Into<String>) -> Self {
        Error::Unauthorized {
            caller,
            reason: reason.into(),
        }
    }

    /// Returns true if retrying later (or with other inputs) may succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::StaleOracle { .. }
                | Error::SequencerGracePeriod { .. }
                | Error::SequencerDown
                | Error::NothingToLiquidate
                | Error::FeeExceedsMax { .. }
                | Error::RedemptionNotAllowed { .. }
                | Error::InsufficientBalance { .. }
                | Error::UndercollateralizedVessels(_)
        )
    }

    /// Returns true if this is a critical error requiring immediate attention
    pub fn is_critical(&self) -> bool {
        matches!(
            self,
            Error::Internal(_)
                | Error::Overflow { .. }
                | Error::Underflow { .. }
                | Error::Lock
        )
    }

    /// Returns the error code for external systems
    pub fn code(&self) -> u32 {
        match self {
            // Vessel errors: 1xxx
            Error::VesselNotFound { .. } => 1001,
            Error::VesselAlreadyExists { .. } => 1002,
            Error::VesselNotActive { .. } => 1003,
            Error::OnlyOneVesselInSystem(_) => 1004,
            Error::IcrBelowMcr { .. } => 1005,
            Error::IcrBelowCcr { .. } => 1006,
            Error::TcrBelowCcr { .. } => 1007,
            Error::NetDebtBelowMinimum { .. } => 1008,
            Error::MintCapExceeded { .. } => 1009,
            Error::RecoveryMode(_) => 1010,

            // Liquidation & redemption errors: 2xxx
            Error::NothingToLiquidate => 2001,
            Error::FeeExceedsMax { .. } => 2002,
            Error::FeePercentOutOfBounds { .. } => 2003,
            Error::FeeEatsAllCollateral { .. } => 2004,
            Error::RedemptionNotAllowed { .. } => 2005,
            Error::TcrBelowMcr { .. } => 2006,
            Error::UnableToRedeemAnyAmount => 2007,
            Error::UndercollateralizedVessels(_) => 2008,

            // Oracle errors: 3xxx
            Error::StaleOracle { .. } => 3001,
            Error::SequencerDown => 3002,
            Error::SequencerGracePeriod { .. } => 3003,
            Error::InvalidOracleResponse { .. } => 3004,
            Error::InvalidOracleConfig { .. } => 3005,
            Error::UnknownAsset(_) => 3006,

            // Authorization errors: 4xxx
            Error::Unauthorized { .. } => 4001,

            // Validation errors: 5xxx
            Error::CollateralNotActive(_) => 5001,
            Error::InsufficientBalance { .. } => 5002,
            Error::NoDeposit(_) => 5003,
            Error::NothingToClaim(_) => 5004,
            Error::InvalidParameter { .. } => 5005,
            Error::ZeroAmount => 5006,
            Error::Overflow { .. } => 5007,
            Error::Underflow { .. } => 5008,
            Error::DivisionByZero { .. } => 5009,

            // Serialization errors: 7xxx
            Error::Serialization(_) => 7001,
            Error::Deserialization(_) => 7002,

            // Internal errors: 9xxx
            Error::Internal(_) => 9001,
            Error::Lock => 9002,
        }
    }
}
