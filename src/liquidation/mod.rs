//! Liquidation module.
//!
//! This module handles liquidations and the pools that absorb them:
//! - Liquidation engine for vessels below MCR (and below TCR in Recovery Mode)
//! - Stability Pool for offsetting liquidated debt
//! - Collateral surplus escrow for capped liquidations and redemptions
//! - Recovery Mode predicates over the total collateral ratio

pub mod coll_surplus;
pub mod engine;
pub mod recovery;
pub mod stability_pool;

pub use coll_surplus::*;
pub use engine::*;
pub use recovery::*;
pub use stability_pool::*;
