//! Per-collateral protocol parameters.
//!
//! The accounting core only ever reads these values. Governance changes go
//! through the timelock outside this crate; here they are plain data that
//! can be built in code or loaded from JSON.

use std::collections::BTreeMap;

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::utils::constants::*;

// ═══════════════════════════════════════════════════════════════════════════════
// COLLATERAL PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters for one collateral asset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollateralParams {
    /// Token decimals of the collateral
    pub decimals: u8,
    /// Whether new debt may be opened against this asset
    pub active: bool,
    /// Minimum collateral ratio (1e18 = 100%)
    pub mcr: u128,
    /// Critical collateral ratio for Recovery Mode
    pub ccr: u128,
    /// One-off borrowing fee (1e18 = 100%)
    pub borrowing_fee: u128,
    /// Debt tokens reserved per vessel to pay liquidators
    pub debt_token_gas_compensation: u128,
    /// Minimum debt excluding gas compensation
    pub min_net_debt: u128,
    /// Maximum total debt for this asset
    pub mint_cap: u128,
    /// Collateral gas compensation divisor (coll / divisor)
    pub percent_divisor: u128,
    /// Redemption fee floor (1e18 = 100%)
    pub redemption_fee_floor: u128,
    /// Unix time before which redemptions are refused
    pub redemption_block_timestamp: u64,
}

impl Default for CollateralParams {
    fn default() -> Self {
        Self {
            decimals: 18,
            active: true,
            mcr: DEFAULT_MCR,
            ccr: DEFAULT_CCR,
            borrowing_fee: DEFAULT_BORROWING_FEE,
            debt_token_gas_compensation: DEFAULT_GAS_COMPENSATION,
            min_net_debt: DEFAULT_MIN_NET_DEBT,
            mint_cap: DEFAULT_MINT_CAP,
            percent_divisor: DEFAULT_PERCENT_DIVISOR,
            redemption_fee_floor: DEFAULT_REDEMPTION_FEE_FLOOR,
            redemption_block_timestamp: 0,
        }
    }
}

impl CollateralParams {
    /// Override MCR and CCR
    pub fn with_ratios(mut self, mcr: u128, ccr: u128) -> Self {
        self.mcr = mcr;
        self.ccr = ccr;
        self
    }

    /// Override gas compensation and minimum net debt
    pub fn with_debt_limits(mut self, gas_compensation: u128, min_net_debt: u128) -> Self {
        self.debt_token_gas_compensation = gas_compensation;
        self.min_net_debt = min_net_debt;
        self
    }

    /// Override the borrowing fee
    pub fn with_borrowing_fee(mut self, fee: u128) -> Self {
        self.borrowing_fee = fee;
        self
    }

    /// Override the mint cap
    pub fn with_mint_cap(mut self, cap: u128) -> Self {
        self.mint_cap = cap;
        self
    }

    /// Delay redemptions until `timestamp`
    pub fn with_redemption_start(mut self, timestamp: u64) -> Self {
        self.redemption_block_timestamp = timestamp;
        self
    }

    /// Validate safety bounds
    pub fn validate(&self) -> Result<()> {
        if self.mcr <= ONE_HUNDRED_PCT || self.mcr >= self.ccr {
            return Err(invalid("mcr", "must satisfy 100% < MCR < CCR"));
        }
        if self.percent_divisor < PERCENT_DIVISOR_BOUNDS.0
            || self.percent_divisor > PERCENT_DIVISOR_BOUNDS.1
        {
            return Err(invalid("percent_divisor", "outside safety bounds"));
        }
        if self.redemption_fee_floor < REDEMPTION_FEE_FLOOR_BOUNDS.0
            || self.redemption_fee_floor > REDEMPTION_FEE_FLOOR_BOUNDS.1
        {
            return Err(invalid("redemption_fee_floor", "outside safety bounds"));
        }
        if self.borrowing_fee > BORROWING_FEE_BOUNDS.1 {
            return Err(invalid("borrowing_fee", "outside safety bounds"));
        }
        if self.min_net_debt == 0 {
            return Err(invalid("min_net_debt", "must be positive"));
        }
        Ok(())
    }
}

fn invalid(name: &str, reason: &str) -> Error {
    Error::InvalidParameter {
        name: name.into(),
        reason: reason.into(),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// ADMIN CONFIG
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only configuration for every supported collateral
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdminConfig {
    /// Parameters keyed by collateral asset
    collaterals: BTreeMap<Address, CollateralParams>,
    /// Share of the oracle value a redeemer receives, in basis points
    redemption_softening: Option<u128>,
}

impl AdminConfig {
    /// Create an empty configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Register collateral parameters (builder style)
    pub fn with_collateral(mut self, asset: Address, params: CollateralParams) -> Self {
        self.collaterals.insert(asset, params);
        self
    }

    /// Register or replace collateral parameters after validation
    pub fn add_collateral(&mut self, asset: Address, params: CollateralParams) -> Result<()> {
        params.validate()?;
        self.collaterals.insert(asset, params);
        Ok(())
    }

    /// Parse from a JSON document
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| Error::Deserialization(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Render as pretty JSON
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| Error::Serialization(e.to_string()))
    }

    /// Validate every collateral and the softening parameter
    pub fn validate(&self) -> Result<()> {
        for params in self.collaterals.values() {
            params.validate()?;
        }
        let softening = self.redemption_softening();
        if !(MIN_REDEMPTION_SOFTENING..=PERCENTAGE_PRECISION).contains(&softening) {
            return Err(invalid("redemption_softening", "must be within [9600, 10000]"));
        }
        Ok(())
    }

    /// Parameters for an asset
    pub fn params(&self, asset: &Address) -> Result<&CollateralParams> {
        self.collaterals
            .get(asset)
            .ok_or(Error::UnknownAsset(*asset))
    }

    /// Parameters for an asset that must accept new debt
    pub fn active_params(&self, asset: &Address) -> Result<&CollateralParams> {
        let params = self.params(asset)?;
        if !params.active {
            return Err(Error::CollateralNotActive(*asset));
        }
        Ok(params)
    }

    /// All configured assets
    pub fn assets(&self) -> impl Iterator<Item = &Address> {
        self.collaterals.keys()
    }

    /// Redemption softening in basis points
    pub fn redemption_softening(&self) -> u128 {
        self.redemption_softening
            .unwrap_or(DEFAULT_REDEMPTION_SOFTENING)
    }

    /// Replace the redemption softening parameter
    pub(crate) fn set_redemption_softening(&mut self, value: u128) -> Result<()> {
        if !(MIN_REDEMPTION_SOFTENING..=PERCENTAGE_PRECISION).contains(&value) {
            return Err(invalid("redemption_softening", "must be within [9600, 10000]"));
        }
        self.redemption_softening = Some(value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_params_valid() {
        assert!(CollateralParams::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_ratios_rejected() {
        let params = CollateralParams::default().with_ratios(DEFAULT_CCR, DEFAULT_MCR);
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_unknown_and_inactive_asset() {
        let asset = Address::repeat_byte(0xaa);
        let mut inactive = CollateralParams::default();
        inactive.active = false;
        let config = AdminConfig::new().with_collateral(asset, inactive);

        assert!(config.params(&asset).is_ok());
        assert_eq!(
            config.active_params(&asset).unwrap_err(),
            Error::CollateralNotActive(asset)
        );
        assert_eq!(
            config.params(&Address::ZERO).unwrap_err(),
            Error::UnknownAsset(Address::ZERO)
        );
    }

    #[test]
    fn test_json_round_trip() {
        let asset = Address::repeat_byte(0x01);
        let config = AdminConfig::new().with_collateral(asset, CollateralParams::default());
        let json = config.to_json().unwrap();
        let parsed = AdminConfig::from_json(&json).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_softening_bounds() {
        let mut config = AdminConfig::new();
        assert_eq!(config.redemption_softening(), DEFAULT_REDEMPTION_SOFTENING);
        assert!(config.set_redemption_softening(9_500).is_err());
        assert!(config.set_redemption_softening(10_001).is_err());
        config.set_redemption_softening(9_975).unwrap();
        assert_eq!(config.redemption_softening(), 9_975);
    }
}
