//! Composed ledger state and its transactional handle.
//!
//! [`LedgerState`] aggregates every component. Mutating entry points never
//! touch it directly: they go through [`SharedLedger::transact`], which runs
//! the operation on a draft copy and swaps it in only on success.

use std::sync::{Arc, RwLock};

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::info;

use crate::core::config::AdminConfig;
use crate::core::pools::{DebtTokenLedger, PoolLedger};
use crate::core::roles::ProtocolRoles;
use crate::core::sorted_vessels::SortedVessels;
use crate::core::vessel_manager::VesselManager;
use crate::error::{Error, Result};
use crate::liquidation::coll_surplus::CollSurplusPool;
use crate::liquidation::stability_pool::StabilityPool;
use crate::protocol::events::EventLog;
use crate::{PROTOCOL_NAME, VERSION};

// ═══════════════════════════════════════════════════════════════════════════════
// LEDGER STATE
// ═══════════════════════════════════════════════════════════════════════════════

/// Every component of the accounting core
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Per-asset parameters
    pub config: AdminConfig,
    /// Privileged callers
    pub roles: ProtocolRoles,
    /// Vessels and redistribution accumulators
    pub vessels: VesselManager,
    /// NICR-ordered vessel lists
    pub sorted: SortedVessels,
    /// Collateral custody and pool debt
    pub pools: PoolLedger,
    /// Debt token balances
    pub debt_token: DebtTokenLedger,
    /// Stability Pool
    pub stability_pool: StabilityPool,
    /// Collateral surplus escrow
    pub coll_surplus: CollSurplusPool,
    /// Events recorded by the operation in flight
    #[serde(skip)]
    pub events: EventLog,
}

impl LedgerState {
    /// Empty ledger for `config`
    pub fn new(config: AdminConfig, roles: ProtocolRoles) -> Result<Self> {
        config.validate()?;
        info!(
            protocol = PROTOCOL_NAME,
            version = VERSION,
            owner = %roles.owner,
            "ledger initialized"
        );
        Ok(Self {
            config,
            roles,
            vessels: VesselManager::new(roles),
            sorted: SortedVessels::new(roles),
            pools: PoolLedger::new(),
            debt_token: DebtTokenLedger::new(),
            stability_pool: StabilityPool::new(roles),
            coll_surplus: CollSurplusPool::new(roles),
            events: EventLog::new(),
        })
    }

    /// SHA-256 over the bincode encoding; events are excluded
    pub fn state_hash(&self) -> Result<[u8; 32]> {
        let bytes = self.to_bytes()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        Ok(hasher.finalize().into())
    }

    /// Serialize to bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Deserialize from bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        bincode::deserialize(bytes).map_err(|e| Error::Deserialization(e.to_string()))
    }

    /// Collateral of `asset` held across pools, escrows and payouts
    pub fn collateral_accounted(&self, asset: &Address) -> u128 {
        self.pools.total_tracked(asset)
    }

    /// Collateral of `asset` ever deposited; equals
    /// [`collateral_accounted`](Self::collateral_accounted) while nothing is
    /// created or lost
    pub fn collateral_received(&self, asset: &Address) -> u128 {
        self.pools.total_received(asset)
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SHARED HANDLE
// ═══════════════════════════════════════════════════════════════════════════════

/// Lock-guarded ledger shared by the operation front-ends
#[derive(Debug, Clone)]
pub struct SharedLedger {
    inner: Arc<RwLock<LedgerState>>,
}

impl SharedLedger {
    /// Wrap a ledger
    pub fn new(state: LedgerState) -> Self {
        Self {
            inner: Arc::new(RwLock::new(state)),
        }
    }

    /// Run a read-only closure against the committed state
    pub fn read<T>(&self, f: impl FnOnce(&LedgerState) -> Result<T>) -> Result<T> {
        let guard = self.inner.read().map_err(|_| Error::Lock)?;
        f(&guard)
    }

    /// Run `f` against a draft; commit it only if `f` succeeds.
    ///
    /// Events recorded by `f` are appended to the committed log.
    pub fn transact<T>(&self, f: impl FnOnce(&mut LedgerState) -> Result<T>) -> Result<T> {
        let mut guard = self.inner.write().map_err(|_| Error::Lock)?;
        let mut draft = guard.clone();
        draft.events = EventLog::new();

        let output = f(&mut draft)?;

        let mut committed_events = std::mem::take(&mut guard.events);
        committed_events.merge(std::mem::take(&mut draft.events));
        draft.events = committed_events;
        *guard = draft;
        Ok(output)
    }

    /// Copy of the committed state
    pub fn snapshot(&self) -> Result<LedgerState> {
        self.read(|state| Ok(state.clone()))
    }

    /// Hash of the committed state
    pub fn state_hash(&self) -> Result<[u8; 32]> {
        self.read(LedgerState::state_hash)
    }

    /// Drain events committed so far
    pub fn take_events(&self) -> Result<EventLog> {
        let mut guard = self.inner.write().map_err(|_| Error::Lock)?;
        Ok(std::mem::take(&mut guard.events))
    }
}
