//! Gas limit and gas price parsing for legacy-priced transactions

use super::units::{format_base_units, to_base_units};
use crate::error::{ComposerError, ComposerResult};

use ethers::types::U256;
use ethers::utils::Units;

/// Gas parameters as entered on the form, resolved to base units
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GasSettings {
    pub limit: u64,
    /// Price per gas in wei
    pub price: U256,
}

impl GasSettings {
    /// Parse a whole-number gas limit and a gwei-denominated gas price
    pub fn parse(gas_limit: &str, gas_price_gwei: &str) -> ComposerResult<Self> {
        let limit = parse_gas_limit(gas_limit)?;
        let price = to_base_units(gas_price_gwei, Units::Gwei)
            .map_err(|e| ComposerError::validation("gasPrice", e.to_string()))?;

        Ok(Self { limit, price })
    }

    /// Upper bound on the fee in wei
    pub fn max_cost(&self) -> U256 {
        U256::from(self.limit) * self.price
    }

    /// Gas price rendered back in gwei
    pub fn price_gwei(&self) -> String {
        format_base_units(self.price, Units::Gwei)
    }
}

fn parse_gas_limit(raw: &str) -> ComposerResult<u64> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ComposerError::validation("gasLimit", "is required"));
    }

    raw.parse::<u64>().map_err(|_| {
        ComposerError::validation("gasLimit", format!("{:?} is not a whole number", raw))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_form_sample() {
        let gas = GasSettings::parse("23000", "0.08").unwrap();
        assert_eq!(gas.limit, 23_000);
        assert_eq!(gas.price, U256::from(80_000_000u64));
        assert_eq!(gas.price_gwei(), "0.08");
        assert_eq!(gas.max_cost(), U256::from(23_000u64 * 80_000_000u64));
    }

    #[test]
    fn test_rejects_bad_values_naming_the_field() {
        let err = GasSettings::parse("", "1").unwrap_err();
        assert_eq!(err.field(), Some("gasLimit"));

        let err = GasSettings::parse("21000.5", "1").unwrap_err();
        assert_eq!(err.field(), Some("gasLimit"));

        let err = GasSettings::parse("21000", "cheap").unwrap_err();
        assert_eq!(err.field(), Some("gasPrice"));
    }
}
