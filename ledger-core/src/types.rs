//! Identity types shared by every component

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Account or contract address (`0x` + 40 hex digits, stored lower-case)
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Parse and validate an address
    pub fn parse(s: &str) -> Result<Self> {
        if !is_valid_address(s) {
            return Err(Error::InvalidAddress(s.to_string()));
        }
        Ok(Self(s.to_ascii_lowercase()))
    }

    /// Address whose last 20 bytes are `seed`, big-endian. Handy for
    /// fixtures and derived contract addresses.
    pub fn from_seed(seed: u64) -> Self {
        Self(format!("0x{:040x}", seed))
    }

    /// Deterministic address for a derived entity (e.g. a pool keyed by
    /// its token pair): last 20 bytes of `blake3(domain || parts)`.
    pub fn derive(domain: &str, parts: &[&str]) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(domain.as_bytes());
        for part in parts {
            hasher.update(&[0u8]);
            hasher.update(part.as_bytes());
        }
        let digest = hasher.finalize();
        Self(format!("0x{}", hex::encode(&digest.as_bytes()[12..])))
    }

    /// The zero address
    pub fn zero() -> Self {
        Self::from_seed(0)
    }

    /// Lower-case string form
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form (`0x1234...abcd`) for log lines
    pub fn short(&self) -> String {
        format!("{}...{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Address {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        Address::parse(&value)
    }
}

impl From<Address> for String {
    fn from(value: Address) -> Self {
        value.0
    }
}

/// `^0x[a-fA-F0-9]{40}$`
pub fn is_valid_address(s: &str) -> bool {
    s.len() == 42
        && s.starts_with("0x")
        && s[2..].bytes().all(|b| b.is_ascii_hexdigit())
}

/// New time-ordered record id
pub fn new_record_id() -> Uuid {
    Uuid::now_v7()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_validation() {
        assert!(is_valid_address("0x52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("52908400098527886E0F7030069857D2E4169EE7"));
        assert!(!is_valid_address("0x52908400098527886E0F7030069857D2E4169EE"));
        assert!(!is_valid_address("0xZZ908400098527886E0F7030069857D2E4169EE7"));
    }

    #[test]
    fn test_address_is_lowercased() {
        let a = Address::parse("0x52908400098527886E0F7030069857D2E4169EE7").unwrap();
        let b = Address::parse("0x52908400098527886e0f7030069857d2e4169ee7").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.short(), "0x5290...9ee7");
    }

    #[test]
    fn test_from_seed() {
        let a = Address::from_seed(0xabc);
        assert!(is_valid_address(a.as_str()));
        assert!(a.as_str().ends_with("abc"));
    }

    #[test]
    fn test_derive_is_deterministic() {
        let a = Address::derive("pool", &["0xaa", "0xbb"]);
        let b = Address::derive("pool", &["0xaa", "0xbb"]);
        let c = Address::derive("pool", &["0xbb", "0xaa"]);
        assert_eq!(a, b);
        assert_ne!(a, c);
        assert!(is_valid_address(a.as_str()));
    }

    #[test]
    fn test_serde_validates() {
        assert!(serde_json::from_str::<Address>("\"0x1234\"").is_err());
        let a: Address =
            serde_json::from_str("\"0x0000000000000000000000000000000000000001\"").unwrap();
        assert_eq!(a, Address::from_seed(1));
    }

    #[test]
    fn test_record_ids_are_v7() {
        let a = new_record_id();
        let b = new_record_id();
        assert_ne!(a, b);
        assert_eq!(a.get_version_num(), 7);
    }
}
