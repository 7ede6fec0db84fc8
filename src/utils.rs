use lazy_static::lazy_static;
use regex::Regex;
use rust_decimal::Decimal;

use crate::entity::MonitorError;

// Validate EVM address (0x + 40 hex chars)
pub fn is_evm_address(address: &str) -> bool {
    lazy_static! {
        static ref RE: Regex = Regex::new(r"^0x[0-9a-fA-F]{40}$").expect("valid address regex");
    }

    RE.is_match(address)
}

/// Convert a base-unit amount into an integer string of atomic units
/// (`1.5` with 6 decimals is `"1500000"`). Fractions below one atomic unit
/// are truncated.
pub fn to_atomic_units(amount: Decimal, decimals: u32) -> Result<String, MonitorError> {
    if amount <= Decimal::ZERO {
        return Err(MonitorError::InvalidOrder(format!(
            "amount must be positive, got {}",
            amount
        )));
    }

    let scale = 10u64
        .checked_pow(decimals)
        .map(Decimal::from)
        .ok_or_else(|| MonitorError::InvalidOrder(format!("unsupported decimals {}", decimals)))?;

    let atomic = amount
        .checked_mul(scale)
        .ok_or_else(|| MonitorError::InvalidOrder(format!("amount {} overflows", amount)))?
        .trunc();

    if atomic.is_zero() {
        return Err(MonitorError::InvalidOrder(format!(
            "amount {} is below one atomic unit",
            amount
        )));
    }

    Ok(atomic.normalize().to_string())
}

// Shorten address for display
pub fn shorten_address(address: &str) -> String {
    let chars: Vec<char> = address.chars().collect();
    if chars.len() <= 12 {
        return address.to_string();
    }

    let start: String = chars[..6].iter().collect();
    let end: String = chars[chars.len() - 4..].iter().collect();

    format!("{}...{}", start, end)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_evm_address_validation() {
        assert!(is_evm_address("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"));
        assert!(!is_evm_address("833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"));
        assert!(!is_evm_address("0x833589"));
        assert!(!is_evm_address("0xZZ3589fCD6eDb6E08f4c7C32D4f71b54bdA02913"));
    }

    #[test]
    fn test_atomic_units() {
        assert_eq!(to_atomic_units(dec!(1.5), 6).unwrap(), "1500000");
        assert_eq!(to_atomic_units(dec!(10), 6).unwrap(), "10000000");
        assert_eq!(to_atomic_units(dec!(0.0000019), 6).unwrap(), "1");
        assert_eq!(to_atomic_units(dec!(2), 18).unwrap(), "2000000000000000000");
        assert!(to_atomic_units(dec!(0), 6).is_err());
        assert!(to_atomic_units(dec!(0.0000001), 6).is_err());
    }

    #[test]
    fn test_shorten_address() {
        assert_eq!(
            shorten_address("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"),
            "0x8335...2913"
        );
        assert_eq!(shorten_address("0xabc"), "0xabc");
    }

    #[test]
    fn test_shorten_address_keeps_multibyte_chars_whole() {
        assert_eq!(shorten_address("0xé1234567890ü"), "0xé123...890ü");
        assert_eq!(shorten_address("ααααααααααααααα"), "αααααα...αααα");
        assert_eq!(shorten_address("0xé"), "0xé");
    }
}
