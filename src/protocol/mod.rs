//! Protocol module - ledger state and orchestration.
//!
//! This module composes every component into one [`state::LedgerState`]
//! and exposes the entry points that mutate it atomically.

pub mod borrower;
pub mod events;
pub mod operations;
pub mod state;

pub use borrower::*;
pub use events::*;
pub use operations::*;
pub use state::*;
