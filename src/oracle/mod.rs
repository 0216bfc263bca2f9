//! Oracle module for price feeds.
//!
//! - Oracle source abstraction (Chainlink-style and API3 providers)
//! - Price resolution with staleness checks, fallback and ETH indexing
//! - L2 sequencer uptime gating

pub mod price_feed;
pub mod sources;

pub use price_feed::*;
pub use sources::*;
