//! Decimal amount conversion between display units and base units
//!
//! Amounts are converted with string arithmetic so that inputs like `0.1`
//! map to exact integers. Digits finer than one base unit are truncated.

use ethers::types::U256;
use ethers::utils::Units;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UnitError {
    #[error("amount is empty")]
    Empty,

    #[error("unexpected character {0:?} in amount")]
    InvalidCharacter(char),

    #[error("amount has more than one decimal point")]
    MultiplePoints,

    #[error("amount does not fit in 256 bits")]
    Overflow,
}

/// Convert a decimal string denominated in `unit` into base units
pub fn to_base_units(amount: &str, unit: Units) -> Result<U256, UnitError> {
    let amount = amount.trim();
    let decimals = unit.as_num() as usize;

    let (whole, fraction) = amount.split_once('.').unwrap_or((amount, ""));
    if fraction.contains('.') {
        return Err(UnitError::MultiplePoints);
    }
    if whole.is_empty() && fraction.is_empty() {
        return Err(UnitError::Empty);
    }
    if let Some(c) = whole.chars().chain(fraction.chars()).find(|c| !c.is_ascii_digit()) {
        return Err(UnitError::InvalidCharacter(c));
    }

    let fraction = &fraction[..fraction.len().min(decimals)];
    let mut digits = String::with_capacity(whole.len() + decimals);
    digits.push_str(whole);
    digits.push_str(fraction);
    digits.extend(std::iter::repeat('0').take(decimals - fraction.len()));

    let digits = digits.trim_start_matches('0');
    if digits.is_empty() {
        return Ok(U256::zero());
    }

    U256::from_dec_str(digits).map_err(|_| UnitError::Overflow)
}

/// Render base units as a decimal string in `unit`, without trailing zeros
pub fn format_base_units(amount: U256, unit: Units) -> String {
    let decimals = unit.as_num() as usize;
    let digits = amount.to_string();
    if decimals == 0 {
        return digits;
    }

    let padded = format!("{:0>width$}", digits, width = decimals + 1);
    let (whole, fraction) = padded.split_at(padded.len() - decimals);
    let fraction = fraction.trim_end_matches('0');

    if fraction.is_empty() {
        whole.to_string()
    } else {
        format!("{}.{}", whole, fraction)
    }
}

/// Minimal `0x`-prefixed hex quantity as used by JSON-RPC
pub fn hex_quantity(value: U256) -> String {
    if value.is_zero() {
        "0x0".to_string()
    } else {
        format!("0x{:x}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ether_and_gwei_conversion() {
        assert_eq!(
            to_base_units("0.1", Units::Ether).unwrap(),
            U256::from(100_000_000_000_000_000u64)
        );
        assert_eq!(
            to_base_units("0.08", Units::Gwei).unwrap(),
            U256::from(80_000_000u64)
        );
        assert_eq!(to_base_units("21", Units::Gwei).unwrap(), U256::from(21_000_000_000u64));
        assert_eq!(to_base_units(".5", Units::Ether).unwrap(), U256::exp10(17) * 5);
        assert_eq!(to_base_units("3.", Units::Ether).unwrap(), U256::exp10(18) * 3);
        assert_eq!(to_base_units("000", Units::Ether).unwrap(), U256::zero());
    }

    #[test]
    fn test_sub_base_unit_digits_are_truncated() {
        assert_eq!(
            to_base_units("0.0000000009", Units::Gwei).unwrap(),
            U256::zero()
        );
        assert_eq!(
            to_base_units("0.0000000019", Units::Gwei).unwrap(),
            U256::one()
        );
        assert_eq!(
            to_base_units("1.0000000000000000019", Units::Ether).unwrap(),
            U256::exp10(18) + 1
        );
    }

    #[test]
    fn test_rejects_malformed_amounts() {
        assert_eq!(to_base_units("", Units::Ether), Err(UnitError::Empty));
        assert_eq!(to_base_units(".", Units::Ether), Err(UnitError::Empty));
        assert_eq!(to_base_units("1.2.3", Units::Ether), Err(UnitError::MultiplePoints));
        assert_eq!(to_base_units("-1", Units::Ether), Err(UnitError::InvalidCharacter('-')));
        assert_eq!(to_base_units("1e18", Units::Wei), Err(UnitError::InvalidCharacter('e')));

        let huge = "9".repeat(90);
        assert_eq!(to_base_units(&huge, Units::Ether), Err(UnitError::Overflow));
    }

    #[test]
    fn test_round_trip_stays_within_one_base_unit() {
        let samples = [
            ("0.1", Units::Ether),
            ("1.23456789", Units::Ether),
            ("0.000000000000000001", Units::Ether),
            ("0.0000000000000000015", Units::Ether),
            ("42", Units::Gwei),
            ("0.08", Units::Gwei),
            ("7.123456789123", Units::Gwei),
        ];

        for (input, unit) in samples {
            let base = to_base_units(input, unit).unwrap();
            let rendered = format_base_units(base, unit);
            let again = to_base_units(&rendered, unit).unwrap();
            let diff = if again > base { again - base } else { base - again };
            assert!(diff <= U256::one(), "{} drifted by {}", input, diff);
        }
    }

    #[test]
    fn test_format_and_hex() {
        assert_eq!(format_base_units(U256::exp10(17), Units::Ether), "0.1");
        assert_eq!(format_base_units(U256::exp10(18) * 2, Units::Ether), "2");
        assert_eq!(format_base_units(U256::from(5), Units::Wei), "5");
        assert_eq!(hex_quantity(U256::from(23_000)), "0x59d8");
        assert_eq!(hex_quantity(U256::zero()), "0x0");
    }
}
