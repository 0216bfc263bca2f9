//! # Gravita Core
//!
//! Accounting core of a multi-collateral lending protocol. Borrowers lock
//! collateral in vessels and draw a debt token against it; unhealthy
//! vessels are liquidated against a Stability Pool or redistributed to the
//! remaining vessels; debt tokens can always be redeemed for collateral.
//!
//! ## Architecture
//!
//! - **Core**: configuration, roles, vessels, the sorted vessel index,
//!   reward distribution, custody seams and fees
//! - **Oracle**: price resolution with staleness, fallback, ETH indexing
//!   and sequencer gating
//! - **Liquidation**: liquidation engine, Stability Pool, collateral
//!   surplus and Recovery Mode predicates
//! - **Protocol**: the composed ledger state and its atomic entry points
//!
//! All amounts are 18-decimal fixed point integers ("wad").
//!
//! ## Example
//!
//! ```rust,ignore
//! use gravita_core::prelude::*;
//!
//! let ledger = SharedLedger::new(LedgerState::new(config, roles)?);
//! let borrower_ops = BorrowerOperations::new(ledger.clone(), feed.clone())?;
//! let vessel_ops = VesselManagerOperations::new(ledger, feed, clock)?;
//!
//! borrower_ops.open_vessel(alice, weth, 10 * WAD, 5_000 * WAD, None, None)?;
//! vessel_ops.liquidate_vessels(keeper, weth, 10)?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    trivial_casts,
    unused_lifetimes,
    unused_qualifications
)]

pub mod core;
pub mod error;
pub mod liquidation;
pub mod oracle;
pub mod protocol;
pub mod utils;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::core::{
        clock::{Clock, ManualClock, SystemClock},
        config::{AdminConfig, CollateralParams},
        pools::{CollateralCustody, DebtPool, DebtToken, DebtTokenLedger, PoolId, PoolLedger},
        roles::ProtocolRoles,
        sorted_vessels::SortedVessels,
        vessel::{EntireDebtAndColl, Vessel, VesselStatus},
        vessel_manager::VesselManager,
    };
    pub use crate::error::{Error, Result};
    pub use crate::liquidation::{
        coll_surplus::CollSurplusPool,
        engine::{LiquidationOutcome, LiquidationValues},
        recovery::SystemStatus,
        stability_pool::{DepositorGains, StabilityPool},
    };
    pub use crate::oracle::{
        price_feed::{PriceFeed, PriceSource},
        sources::{ManualOracle, OracleResponse, OracleSource, ProviderType},
    };
    pub use crate::protocol::{
        borrower::BorrowerOperations,
        events::{EventLog, ProtocolEvent, VesselOperation},
        operations::{
            RedemptionHints, RedemptionOutcome, RedemptionRequest, StabilityPoolOperations,
            VesselManagerOperations,
        },
        state::{LedgerState, SharedLedger},
    };
    pub use crate::utils::constants::DECIMAL_PRECISION as WAD;
}

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Protocol name
pub const PROTOCOL_NAME: &str = "Gravita";
