use crate::Error;
use commonware_utils::{from_hex, hex};
use std::{fmt, str::FromStr};

/// Parse `0x` followed by exactly `2 * N` hexadecimal digits.
fn parse<const N: usize>(value: &str) -> Option<[u8; N]> {
    let digits = value.strip_prefix("0x")?;
    if digits.len() != N * 2 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    from_hex(digits)?.try_into().ok()
}

/// A 32-byte account or contract address.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address([u8; Self::LENGTH]);

impl Address {
    /// Length of the address in bytes.
    pub const LENGTH: usize = 32;

    /// The zero address, used by the ledger for fields it did not populate.
    pub const ZERO: Self = Self([0; Self::LENGTH]);

    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn is_zero(&self) -> bool {
        self == &Self::ZERO
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl FromStr for Address {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse(value)
            .map(Self)
            .ok_or_else(|| Error::InvalidAddress(value.to_string()))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

/// A 20-byte address on the bridged EVM chain (token contracts and transfer recipients).
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EthAddress([u8; Self::LENGTH]);

impl EthAddress {
    /// Length of the address in bytes.
    pub const LENGTH: usize = 20;

    pub const fn new(bytes: [u8; Self::LENGTH]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; Self::LENGTH] {
        &self.0
    }
}

impl FromStr for EthAddress {
    type Err = Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse(value)
            .map(Self)
            .ok_or_else(|| Error::InvalidEthAddress(value.to_string()))
    }
}

impl fmt::Display for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex(&self.0))
    }
}

impl fmt::Debug for EthAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_parse_display() {
        let text = format!("0x{}", "ab".repeat(32));
        let address: Address = text.parse().unwrap();
        assert_eq!(address, Address::new([0xab; 32]));
        assert_eq!(address.to_string(), text);

        // Upper case digits are accepted, display is lower case
        let upper = format!("0x{}", "AB".repeat(32));
        let address: Address = upper.parse().unwrap();
        assert_eq!(address.to_string(), text);
    }

    #[test]
    fn test_address_invalid() {
        // Missing prefix
        assert!("ab".repeat(32).parse::<Address>().is_err());

        // Wrong length
        let short = format!("0x{}", "ab".repeat(31));
        assert_eq!(
            short.parse::<Address>(),
            Err(Error::InvalidAddress(short.clone()))
        );

        // Non-hex digit
        let bad = format!("0x{}g", "a".repeat(63));
        assert!(bad.parse::<Address>().is_err());

        // Sign characters are not digits
        let signed = format!("0x+f{}", "a".repeat(62));
        assert!(signed.parse::<Address>().is_err());

        // An ethereum address is not an account address
        let eth = format!("0x{}", "ab".repeat(20));
        assert!(eth.parse::<Address>().is_err());
    }

    #[test]
    fn test_eth_address() {
        let text = format!("0x{}", "01".repeat(20));
        let address: EthAddress = text.parse().unwrap();
        assert_eq!(address, EthAddress::new([0x01; 20]));
        assert_eq!(address.to_string(), text);

        let long = format!("0x{}", "01".repeat(32));
        assert_eq!(
            long.parse::<EthAddress>(),
            Err(Error::InvalidEthAddress(long.clone()))
        );
    }

    #[test]
    fn test_zero() {
        assert!(Address::ZERO.is_zero());
        assert!(Address::default().is_zero());
        assert!(!Address::new([1; 32]).is_zero());
    }
}
