//! Oracle source definitions and interfaces.
//!
//! An [`OracleSource`] is anything that can report its latest round: a
//! Chainlink-style aggregator, an API3 data feed, or a sequencer uptime
//! feed. The price feed only ever sees this trait.

use std::fmt;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// PROVIDERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Kind of oracle behind a source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderType {
    /// Round-based aggregator with its own decimals
    Chainlink,
    /// Signed 18-decimal value with a timestamp and no rounds
    Api3,
}

impl ProviderType {
    /// Get provider name
    pub fn name(&self) -> &str {
        match self {
            ProviderType::Chainlink => "Chainlink",
            ProviderType::Api3 => "API3",
        }
    }

    /// Whether responses carry meaningful round ids
    pub fn has_rounds(&self) -> bool {
        matches!(self, ProviderType::Chainlink)
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RESPONSES
// ═══════════════════════════════════════════════════════════════════════════════

/// Latest round reported by a source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OracleResponse {
    /// Round identifier
    pub round_id: u128,
    /// Raw signed answer in the source's decimals
    pub answer: i128,
    /// Unix time the answer was produced (or the sequencer status started)
    pub updated_at: u64,
    /// Round in which the answer was computed
    pub answered_in_round: u128,
}

/// A price or status source
pub trait OracleSource: Send + Sync + fmt::Debug {
    /// Latest round data
    fn latest_round(&self) -> Result<OracleResponse>;

    /// Decimals of `answer`
    fn decimals(&self) -> Result<u8>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// MANUAL ORACLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Settable source for simulations and tests
#[derive(Debug)]
pub struct ManualOracle {
    response: RwLock<OracleResponse>,
    decimals: u8,
}

impl ManualOracle {
    /// Source answering `answer` at `updated_at` in round 1
    pub fn new(answer: i128, decimals: u8, updated_at: u64) -> Self {
        Self {
            response: RwLock::new(OracleResponse {
                round_id: 1,
                answer,
                updated_at,
                answered_in_round: 1,
            }),
            decimals,
        }
    }

    /// Publish a new answer in the next round
    pub fn set_price(&self, answer: i128, updated_at: u64) -> Result<()> {
        let mut response = self.response.write().map_err(|_| Error::Lock)?;
        response.round_id += 1;
        response.answered_in_round = response.round_id;
        response.answer = answer;
        response.updated_at = updated_at;
        Ok(())
    }

    /// Replace the whole response
    pub fn set_response(&self, new_response: OracleResponse) -> Result<()> {
        *self.response.write().map_err(|_| Error::Lock)? = new_response;
        Ok(())
    }
}

impl OracleSource for ManualOracle {
    fn latest_round(&self) -> Result<OracleResponse> {
        self.response.read().map(|r| *r).map_err(|_| Error::Lock)
    }

    fn decimals(&self) -> Result<u8> {
        Ok(self.decimals)
    }
}
