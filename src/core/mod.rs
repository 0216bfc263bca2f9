//! Core modules of the accounting engine.
//!
//! This module contains the fundamental building blocks:
//! - Per-collateral configuration and privileged roles
//! - Vessels, the position ledger and the sorted vessel index
//! - Collateral custody and debt-token seams
//! - Redemption base rate and borrowing fees

pub mod clock;
pub mod config;
pub mod fees;
pub mod pools;
pub mod roles;
pub mod sorted_vessels;
pub mod vessel;
pub mod vessel_manager;

pub use clock::*;
pub use config::*;
pub use fees::*;
pub use pools::*;
pub use roles::*;
pub use sorted_vessels::*;
pub use vessel::*;
pub use vessel_manager::*;
