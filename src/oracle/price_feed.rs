//! Price feed implementation.
//!
//! Resolves an 18-decimal USD price per collateral:
//! - primary oracle, then an optional fallback when the primary is stale
//!   or returns garbage
//! - ETH-indexed answers multiplied by the ETH/USD price
//! - L2 sequencer uptime gating with a longer grace period for liquidations

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use alloy_primitives::Address;
use tracing::{info, warn};

use crate::core::clock::Clock;
use crate::core::roles::ProtocolRoles;
use crate::error::{Error, Result};
use crate::oracle::sources::{OracleSource, ProviderType};
use crate::protocol::events::{EventLog, ProtocolEvent};
use crate::utils::constants::*;
use crate::utils::math::{format_wad, mul_div, scale_price_by_digits};

/// Key under which the ETH/USD oracle is registered
pub const ETH_INDEX_ASSET: Address = Address::ZERO;

/// Decimals of every API3 answer
pub const API3_DECIMALS: u8 = 18;

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE SOURCE TRAIT
// ═══════════════════════════════════════════════════════════════════════════════

/// Anything the orchestrators can ask for a price
pub trait PriceSource: Send + Sync {
    /// 18-decimal USD price of `asset` as seen by `caller`
    fn fetch_price(&self, asset: &Address, caller: &Address) -> Result<u128>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// ORACLE RECORD
// ═══════════════════════════════════════════════════════════════════════════════

/// A registered oracle
#[derive(Debug, Clone)]
pub struct OracleRecord {
    /// Where answers come from
    pub source: Arc<dyn OracleSource>,
    /// Provider kind
    pub provider_type: ProviderType,
    /// Decimals of the raw answer
    pub decimals: u8,
    /// Answers older than this are stale
    pub timeout_seconds: u64,
    /// Answer is denominated in ETH
    pub is_eth_indexed: bool,
    /// Registered as a fallback
    pub is_fallback: bool,
}

// ═══════════════════════════════════════════════════════════════════════════════
// PRICE FEED
// ═══════════════════════════════════════════════════════════════════════════════

/// Oracle registry and price resolution
#[derive(Debug)]
pub struct PriceFeed {
    roles: ProtocolRoles,
    clock: Arc<dyn Clock>,
    primaries: RwLock<BTreeMap<Address, OracleRecord>>,
    fallbacks: RwLock<BTreeMap<Address, OracleRecord>>,
    sequencer: RwLock<Option<Arc<dyn OracleSource>>>,
    events: RwLock<EventLog>,
}

impl PriceFeed {
    /// Create an empty feed
    pub fn new(roles: ProtocolRoles, clock: Arc<dyn Clock>) -> Self {
        Self {
            roles,
            clock,
            primaries: RwLock::new(BTreeMap::new()),
            fallbacks: RwLock::new(BTreeMap::new()),
            sequencer: RwLock::new(None),
            events: RwLock::new(EventLog::new()),
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // REGISTRATION
    // ═══════════════════════════════════════════════════════════════════════════

    /// Register or replace the primary or fallback oracle of `asset`.
    ///
    /// The first registration of a slot is open; replacing an existing
    /// oracle requires the timelock. The source must return a sane, fresh
    /// answer before it is accepted.
    #[allow(clippy::too_many_arguments)]
    pub fn set_oracle(
        &self,
        caller: Address,
        asset: Address,
        source: Arc<dyn OracleSource>,
        provider_type: ProviderType,
        timeout_seconds: u64,
        is_eth_indexed: bool,
        is_fallback: bool,
    ) -> Result<()> {
        let has_primary = self.primaries.read().map_err(|_| Error::Lock)?.contains_key(&asset);
        let slot_taken = if is_fallback {
            self.fallbacks.read().map_err(|_| Error::Lock)?.contains_key(&asset)
        } else {
            has_primary
        };
        if slot_taken {
            self.roles.require_timelock(caller)?;
        }
        if is_fallback && !has_primary {
            return Err(Error::InvalidOracleConfig {
                asset,
                reason: "fallback registered without a primary oracle".into(),
            });
        }
        if timeout_seconds == 0 {
            return Err(Error::InvalidOracleConfig {
                asset,
                reason: "timeout must be positive".into(),
            });
        }
        if is_eth_indexed && asset == ETH_INDEX_ASSET {
            return Err(Error::InvalidOracleConfig {
                asset,
                reason: "the ETH/USD oracle cannot itself be ETH-indexed".into(),
            });
        }

        let decimals = match provider_type {
            ProviderType::Chainlink => source.decimals().map_err(|e| invalid(asset, e))?,
            ProviderType::Api3 => API3_DECIMALS,
        };
        if decimals == 0 {
            return Err(invalid(asset, "oracle reports zero decimals"));
        }

        let record = OracleRecord {
            source,
            provider_type,
            decimals,
            timeout_seconds,
            is_eth_indexed,
            is_fallback,
        };
        let price = self
            .read_scaled_price(asset, &record)
            .map_err(|e| invalid(asset, e))?;

        let target = if is_fallback { &self.fallbacks } else { &self.primaries };
        target.write().map_err(|_| Error::Lock)?.insert(asset, record);

        info!(
            %asset,
            %provider_type,
            decimals,
            timeout_seconds,
            is_eth_indexed,
            is_fallback,
            price = %format_wad(price),
            "oracle registered"
        );
        self.events
            .write()
            .map_err(|_| Error::Lock)?
            .push(ProtocolEvent::OracleRegistered {
                asset,
                decimals,
                timeout_seconds,
                is_eth_indexed,
                is_fallback,
            });
        Ok(())
    }

    /// Install or clear the L2 sequencer uptime feed (owner or timelock)
    pub fn set_sequencer_uptime_feed(
        &self,
        caller: Address,
        feed: Option<Arc<dyn OracleSource>>,
    ) -> Result<()> {
        self.roles.require_one_of(
            caller,
            &[self.roles.owner, self.roles.timelock],
            "owner or Timelock",
        )?;
        *self.sequencer.write().map_err(|_| Error::Lock)? = feed;
        Ok(())
    }

    /// Registered primary oracle
    pub fn primary(&self, asset: &Address) -> Result<Option<OracleRecord>> {
        Ok(self.primaries.read().map_err(|_| Error::Lock)?.get(asset).cloned())
    }

    /// Registered fallback oracle
    pub fn fallback(&self, asset: &Address) -> Result<Option<OracleRecord>> {
        Ok(self.fallbacks.read().map_err(|_| Error::Lock)?.get(asset).cloned())
    }

    /// Drain recorded events
    pub fn take_events(&self) -> Result<EventLog> {
        let mut events = self.events.write().map_err(|_| Error::Lock)?;
        Ok(std::mem::take(&mut *events))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // PRICE RESOLUTION
    // ═══════════════════════════════════════════════════════════════════════════

    fn check_sequencer(&self, caller: &Address) -> Result<()> {
        let feed = match self.sequencer.read().map_err(|_| Error::Lock)?.clone() {
            Some(feed) => feed,
            None => return Ok(()),
        };
        let status = feed.latest_round()?;
        if status.answer != 0 {
            warn!(answer = status.answer, "sequencer reported down");
            return Err(Error::SequencerDown);
        }

        let required = if *caller == self.roles.vessel_manager_operations {
            SEQUENCER_LIQUIDATION_DELAY_SECONDS
        } else {
            SEQUENCER_BORROWING_DELAY_SECONDS
        };
        let up_for = self.clock.now().saturating_sub(status.updated_at);
        if up_for <= required {
            warn!(up_for, required, %caller, "sequencer grace period not over");
            return Err(Error::SequencerGracePeriod { up_for, required });
        }
        Ok(())
    }

    fn read_scaled_price(&self, asset: Address, record: &OracleRecord) -> Result<u128> {
        let now = self.clock.now();
        let response = record.source.latest_round()?;

        if response.answer <= 0 {
            return Err(invalid(asset, "non-positive answer"));
        }
        if response.updated_at == 0 {
            return Err(invalid(asset, "missing update timestamp"));
        }
        if response.updated_at > now {
            return Err(invalid(asset, "update timestamp in the future"));
        }
        if record.provider_type.has_rounds() {
            if response.round_id == 0 {
                return Err(invalid(asset, "zero round id"));
            }
            if response.answered_in_round < response.round_id {
                return Err(invalid(asset, "answer carried over from an older round"));
            }
        }

        let age = now - response.updated_at;
        if age > record.timeout_seconds {
            return Err(Error::StaleOracle {
                asset,
                age,
                timeout: record.timeout_seconds,
            });
        }
        let price = scale_price_by_digits(response.answer as u128, record.decimals as u32)?;
        if price == 0 {
            return Err(invalid(asset, "answer scales to a zero price"));
        }
        Ok(price)
    }

    fn resolve(&self, asset: &Address) -> Result<u128> {
        let primary = self.primary(asset)?.ok_or(Error::UnknownAsset(*asset))?;

        let (price, record) = match self.read_scaled_price(*asset, &primary) {
            Ok(price) => (price, primary),
            Err(primary_err) => match self.fallback(asset)? {
                Some(fallback) => {
                    warn!(%asset, error = %primary_err, "primary oracle failed, using fallback");
                    let price = self.read_scaled_price(*asset, &fallback)?;
                    (price, fallback)
                }
                None => return Err(primary_err),
            },
        };

        if record.is_eth_indexed {
            let eth_usd = self.resolve(&ETH_INDEX_ASSET)?;
            return mul_div(price, eth_usd, DECIMAL_PRECISION);
        }
        Ok(price)
    }
}

impl PriceSource for PriceFeed {
    fn fetch_price(&self, asset: &Address, caller: &Address) -> Result<u128> {
        self.check_sequencer(caller)?;
        self.resolve(asset)
    }
}

fn invalid(asset: Address, reason: impl ToString) -> Error {
    Error::InvalidOracleResponse {
        asset,
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::oracle::sources::{ManualOracle, OracleResponse};

    const E18: u128 = DECIMAL_PRECISION;
    const NOW: u64 = 1_700_000_000;
    const TIMEOUT: u64 = 3_600;

    fn steth() -> Address {
        Address::repeat_byte(0x57)
    }

    fn setup() -> (PriceFeed, Arc<ManualClock>, ProtocolRoles) {
        let roles = ProtocolRoles::default();
        let clock = Arc::new(ManualClock::new(NOW));
        (PriceFeed::new(roles, clock.clone()), clock, roles)
    }

    fn anyone() -> Address {
        Address::repeat_byte(0x99)
    }

    #[test]
    fn test_scales_decimals() {
        let (feed, _, _) = setup();
        let oracle = Arc::new(ManualOracle::new(2_000_00000000, 8, NOW));
        feed.set_oracle(anyone(), steth(), oracle, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();
        assert_eq!(feed.fetch_price(&steth(), &anyone()).unwrap(), 2_000 * E18);
        assert_eq!(feed.take_events().unwrap().len(), 1);
    }

    #[test]
    fn test_unknown_asset() {
        let (feed, _, _) = setup();
        assert_eq!(
            feed.fetch_price(&steth(), &anyone()).unwrap_err(),
            Error::UnknownAsset(steth())
        );
    }

    #[test]
    fn test_replacement_requires_timelock() {
        let (feed, _, roles) = setup();
        let first = Arc::new(ManualOracle::new(2_000_00000000, 8, NOW));
        feed.set_oracle(anyone(), steth(), first, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();

        let second = Arc::new(ManualOracle::new(2_345 * E18 as i128, 18, NOW));
        let err = feed
            .set_oracle(anyone(), steth(), second.clone(), ProviderType::Api3, TIMEOUT, false, false)
            .unwrap_err();
        assert!(matches!(err, Error::Unauthorized { .. }));

        feed.set_oracle(roles.timelock, steth(), second, ProviderType::Api3, TIMEOUT, false, false)
            .unwrap();
        assert_eq!(feed.fetch_price(&steth(), &anyone()).unwrap(), 2_345 * E18);
    }

    #[test]
    fn test_fallback_requires_primary() {
        let (feed, _, _) = setup();
        let oracle = Arc::new(ManualOracle::new(1, 8, NOW));
        let err = feed
            .set_oracle(anyone(), steth(), oracle, ProviderType::Chainlink, TIMEOUT, false, true)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOracleConfig { .. }));
    }

    #[test]
    fn test_broken_oracle_rejected() {
        let (feed, _, _) = setup();
        let oracle = Arc::new(ManualOracle::new(2_000_00000000, 8, NOW));
        oracle
            .set_response(OracleResponse {
                round_id: 0,
                answer: 2_000_00000000,
                updated_at: NOW,
                answered_in_round: 0,
            })
            .unwrap();
        let err = feed
            .set_oracle(anyone(), steth(), oracle, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOracleResponse { .. }));

        let negative = Arc::new(ManualOracle::new(-5, 8, NOW));
        assert!(feed
            .set_oracle(anyone(), steth(), negative, ProviderType::Chainlink, TIMEOUT, false, false)
            .is_err());
    }

    #[test]
    fn test_zero_scaled_price_rejected() {
        let (feed, clock, _) = setup();
        // 99 at 20 decimals truncates to nothing
        let dust = Arc::new(ManualOracle::new(99, 20, NOW));
        let err = feed
            .set_oracle(anyone(), steth(), dust, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidOracleResponse { .. }));

        let oracle = Arc::new(ManualOracle::new(2_000 * E18 as i128 * 100, 20, NOW));
        feed.set_oracle(anyone(), steth(), oracle.clone(), ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();
        assert_eq!(feed.fetch_price(&steth(), &anyone()).unwrap(), 2_000 * E18);

        clock.advance(60);
        oracle.set_price(99, NOW + 60).unwrap();
        let err = feed.fetch_price(&steth(), &anyone()).unwrap_err();
        assert!(matches!(err, Error::InvalidOracleResponse { .. }));
    }

    #[test]
    fn test_stale_primary_uses_fallback() {
        let (feed, clock, _) = setup();
        let primary = Arc::new(ManualOracle::new(2_000_00000000, 8, NOW));
        let fallback = Arc::new(ManualOracle::new(1_990 * E18 as i128, 18, NOW));
        feed.set_oracle(anyone(), steth(), primary, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();

        clock.advance(TIMEOUT + 1);
        assert!(matches!(
            feed.fetch_price(&steth(), &anyone()),
            Err(Error::StaleOracle { .. })
        ));

        fallback.set_price(1_990 * E18 as i128, clock.now()).unwrap();
        feed.set_oracle(anyone(), steth(), fallback, ProviderType::Api3, TIMEOUT, false, true)
            .unwrap();
        assert_eq!(feed.fetch_price(&steth(), &anyone()).unwrap(), 1_990 * E18);
    }

    #[test]
    fn test_eth_indexed_price() {
        let (feed, _, _) = setup();
        let eth_usd = Arc::new(ManualOracle::new(1_600 * E18 as i128, 18, NOW));
        let steth_eth = Arc::new(ManualOracle::new(11 * E18 as i128 / 10, 18, NOW));
        feed.set_oracle(anyone(), ETH_INDEX_ASSET, eth_usd, ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();
        feed.set_oracle(anyone(), steth(), steth_eth, ProviderType::Chainlink, TIMEOUT, true, false)
            .unwrap();
        assert_eq!(feed.fetch_price(&steth(), &anyone()).unwrap(), 1_760 * E18);
    }

    #[test]
    fn test_sequencer_gating() {
        let (feed, clock, roles) = setup();
        let oracle = Arc::new(ManualOracle::new(2_000_00000000, 8, NOW));
        feed.set_oracle(anyone(), steth(), oracle.clone(), ProviderType::Chainlink, TIMEOUT, false, false)
            .unwrap();

        // Sequencer came back up 30 minutes ago
        let sequencer = Arc::new(ManualOracle::new(0, 0, NOW - 1_800));
        feed.set_sequencer_uptime_feed(roles.owner, Some(sequencer.clone() as Arc<dyn OracleSource>))
            .unwrap();
        assert!(matches!(
            feed.fetch_price(&steth(), &anyone()),
            Err(Error::SequencerGracePeriod { required: 3_600, .. })
        ));

        // 90 minutes: general reads pass, liquidations still wait
        clock.advance(3_600);
        oracle.set_price(2_000_00000000, clock.now()).unwrap();
        assert!(feed.fetch_price(&steth(), &anyone()).is_ok());
        assert!(matches!(
            feed.fetch_price(&steth(), &roles.vessel_manager_operations),
            Err(Error::SequencerGracePeriod { required: 7_200, .. })
        ));

        sequencer.set_price(1, clock.now()).unwrap();
        assert_eq!(
            feed.fetch_price(&steth(), &anyone()).unwrap_err(),
            Error::SequencerDown
        );
        assert!(feed.set_sequencer_uptime_feed(anyone(), None).is_err());
    }
}
